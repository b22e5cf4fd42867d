use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use crate::cli::ServerArgs;

pub const DEFAULT_PORT: u16 = 59898;
pub const DEFAULT_MAX_SESSIONS: usize = 20;
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub fn default_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))
}

/// Runtime settings for the chat server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Sessions served at once; further connections wait in the accept loop.
    pub max_sessions: usize,
    /// Lines buffered per session before new deliveries to it are skipped.
    pub outbound_capacity: usize,
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_addr(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl From<&ServerArgs> for ServerConfig {
    fn from(args: &ServerArgs) -> Self {
        Self {
            listen: args.listen,
            // Zero would stall the accept loop and tokio rejects zero-capacity channels.
            max_sessions: args.max_sessions.max(1),
            outbound_capacity: args.outbound_capacity.max(1),
            write_timeout: Duration::from_millis(args.write_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Command};

    fn server_args(argv: &[&str]) -> ServerArgs {
        match Cli::parse_from(argv).command {
            Command::Server(args) => args,
            other => panic!("expected server command, got {other:?}"),
        }
    }

    #[test]
    fn cli_defaults_match_config_defaults() {
        let args = server_args(&["group_chat", "server"]);
        assert_eq!(ServerConfig::from(&args), ServerConfig::default());
    }

    #[test]
    fn zero_limits_are_clamped() {
        let args = server_args(&[
            "group_chat",
            "server",
            "--listen",
            "127.0.0.1:0",
            "--max-sessions",
            "0",
            "--outbound-capacity",
            "0",
            "--write-timeout-ms",
            "250",
        ]);
        let config = ServerConfig::from(&args);
        assert_eq!(config.max_sessions, 1);
        assert_eq!(config.outbound_capacity, 1);
        assert_eq!(config.write_timeout, Duration::from_millis(250));
        assert_eq!(config.listen.port(), 0);
    }
}
