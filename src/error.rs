use std::io;

use crate::session::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A session without a username tried to chat.
    #[error("connection {0} sent a message before logging in")]
    ProtocolViolation(ConnectionId),

    #[error("Invalid command: '{0}'")]
    InvalidCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("{0}")]
    PreconditionFailed(&'static str),

    #[error("no such connection: {0}")]
    NotFound(ConnectionId),

    #[error("Your username has already been set!")]
    UsernameAlreadySet,

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("outbound queue full, peer is not reading")]
    QueueFull,

    #[error("{remaining} connection(s) still open after close")]
    CloseTimedOut { remaining: usize },

    #[error(transparent)]
    Transport(#[from] io::Error),

    #[error("malformed payload: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
