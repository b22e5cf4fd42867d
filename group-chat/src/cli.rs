use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the group chat server, accepting TCP connections.
    Server(ServerArgs),
    /// Connect to a server and chat from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address the server should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:59898")]
    pub listen: SocketAddr,

    /// Maximum number of sessions served concurrently.
    #[arg(long, default_value_t = 20)]
    pub max_sessions: usize,

    /// Lines queued per session before deliveries to that session are skipped.
    #[arg(long, default_value_t = 64)]
    pub outbound_capacity: usize,

    /// Milliseconds a single line write may take before the session is dropped.
    #[arg(long, default_value_t = 5000)]
    pub write_timeout_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the server to connect to.
    #[arg(long, default_value = "127.0.0.1:59898")]
    pub server: SocketAddr,

    /// Name sent with JOIN right after connecting.
    #[arg(long)]
    pub username: Option<String>,
}
