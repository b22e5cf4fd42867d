//! Line-oriented group chat server with a single coordinator role.
//!
//! Clients speak newline-delimited UTF-8 text over TCP. Each module owns one concern:
//!
//! - [`server`] accepts connections, assigns session ids, and bounds concurrency.
//! - [`session`] runs one connection: registration, the ordered read loop, and teardown.
//! - [`command`] turns a client line into a [`command::Command`].
//! - [`router`] executes commands and produces unicast or broadcast lines.
//! - [`registry`] is the shared session table and the fan-out path.
//! - [`election`] decides who holds the coordinator role.
//! - [`protocol`] renders server lines and frames reads and writes.
//! - [`config`] and [`cli`] describe runtime settings; [`client`] is a terminal client.
//!
//! Unit tests live next to each module; `tests/` exercises the server over real sockets.

pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod election;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
