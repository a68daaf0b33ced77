use crate::error::{RelayError, Result};

pub const COMMAND_MARKER: char = '#';

pub const USERNAME_ALREADY_SET: &str = "Your username has already been set!";
pub const LOGIN_REQUIRED: &str = "Please set a username before messaging the server!";

/// Splits a `#`-prefixed line into its command word and arguments.
/// Returns `None` for plain text.
pub fn split_command(line: &str) -> Option<(&str, Vec<&str>)> {
    let rest = line.strip_prefix(COMMAND_MARKER)?;
    let mut parts = rest.split_whitespace();
    let cmd = parts.next().unwrap_or("");

    Some((cmd, parts.collect()))
}

fn parse_port(args: &[&str], usage: &'static str) -> Result<u16> {
    args.first()
        .and_then(|arg| arg.parse().ok())
        .ok_or(RelayError::Usage(usage))
}

/// Operator console commands on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Quit,
    Stop,
    Close,
    SetPort(u16),
    Start,
    GetPort,
}

impl ServerCommand {
    /// `None` when the line is not a command at all.
    pub fn parse(line: &str) -> Option<Result<Self>> {
        let (cmd, args) = split_command(line)?;

        let parsed = match cmd {
            "quit" => Ok(Self::Quit),
            "stop" => Ok(Self::Stop),
            "close" => Ok(Self::Close),
            "setport" => parse_port(&args, "#setport <port>").map(Self::SetPort),
            "start" => Ok(Self::Start),
            "getport" => Ok(Self::GetPort),
            _ => Err(RelayError::InvalidCommand(format!("{COMMAND_MARKER}{cmd}"))),
        };

        Some(parsed)
    }
}

/// Commands a connected client may send to the server. Anything the server
/// does not understand is `Ignored` rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    Login(String),
    Ignored,
}

impl ClientRequest {
    pub fn parse(line: &str) -> Option<Self> {
        let (cmd, args) = split_command(line)?;

        let request = match args.first() {
            Some(name) if cmd.eq_ignore_ascii_case("login") => Self::Login(name.to_string()),
            _ => Self::Ignored,
        };

        Some(request)
    }
}

/// Commands typed into the client's own console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Quit,
    Logoff,
    SetHost(String),
    SetPort(u16),
    Login,
    GetHost,
    GetPort,
}

impl ClientCommand {
    pub fn parse(line: &str) -> Option<Result<Self>> {
        let (cmd, args) = split_command(line)?;

        let parsed = match cmd {
            "quit" => Ok(Self::Quit),
            "logoff" => Ok(Self::Logoff),
            "sethost" => args
                .first()
                .map(|host| Self::SetHost(host.to_string()))
                .ok_or(RelayError::Usage("#sethost <host>")),
            "setport" => parse_port(&args, "#setport <port>").map(Self::SetPort),
            "login" => Ok(Self::Login),
            "gethost" => Ok(Self::GetHost),
            "getport" => Ok(Self::GetPort),
            _ => Err(RelayError::InvalidCommand(format!("{COMMAND_MARKER}{cmd}"))),
        };

        Some(parsed)
    }
}
