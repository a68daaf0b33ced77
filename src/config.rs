use clap::Parser;
use std::time::Duration;

use crate::codegen;

/// Port used when none (or garbage) is given on the command line.
pub const DEFAULT_PORT: u16 = 5555;
pub const DEFAULT_HOST: &str = "localhost";

/// Falls back to `DEFAULT_PORT` on anything that is not a port number.
pub fn port_or_default(arg: Option<&str>) -> u16 {
    arg.and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

#[derive(Parser, Debug)]
#[command(name = "relay", about = "Chat relay server with an operator console")]
pub struct ServerArgs {
    /// Port to listen on
    #[arg(allow_hyphen_values = true)]
    pub port: Option<String>,

    /// Address to bind the listener to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Seconds `#close` waits for clients to hang up
    #[arg(long, default_value_t = 5)]
    pub close_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub close_timeout: Duration,
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        Self {
            port: port_or_default(args.port.as_deref()),
            host: args.host,
            close_timeout: Duration::from_secs(args.close_timeout),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            close_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "chat-client", about = "Console client for the chat relay")]
pub struct ClientArgs {
    /// Name to log in with (a guest name is generated if omitted)
    pub username: Option<String>,

    /// Server host
    #[arg(default_value = DEFAULT_HOST)]
    pub host: String,

    /// Server port
    #[arg(allow_hyphen_values = true)]
    pub port: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub username: String,
    pub host: String,
    pub port: u16,
}

impl From<ClientArgs> for ClientConfig {
    fn from(args: ClientArgs) -> Self {
        Self {
            username: args
                .username
                .unwrap_or_else(|| codegen::guest_name(codegen::GUEST_CODE_LEN)),
            port: port_or_default(args.port.as_deref()),
            host: args.host,
        }
    }
}
