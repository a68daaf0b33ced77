use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use crate::error::{RelayError, Result};
use crate::message::Message;

/// Registry key for one live transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outbound half of a connection as the core sees it.
///
/// `send` must not block: the TCP implementation queues onto the
/// connection's worker task. `close` asks the worker to hang up once the
/// messages queued before it are written.
pub trait ConnectionSink: Send + Sync {
    fn send(&self, message: &Message) -> Result<()>;
    fn close(&self);
}

pub struct Session {
    id: ConnectionId,
    peer: SocketAddr,
    username: OnceLock<String>,
    sink: Arc<dyn ConnectionSink>,
}

impl Session {
    pub fn new(id: ConnectionId, peer: SocketAddr, sink: Arc<dyn ConnectionSink>) -> Self {
        Self {
            id,
            peer,
            username: OnceLock::new(),
            sink,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn username(&self) -> Option<&str> {
        self.username.get().map(String::as_str)
    }

    /// Sets the username. A name, once set, never changes.
    pub fn set_username(&self, name: &str) -> Result<()> {
        self.username
            .set(name.to_string())
            .map_err(|_| RelayError::UsernameAlreadySet)
    }

    /// Username if logged in, otherwise the peer's IP.
    pub fn display_name(&self) -> String {
        match self.username() {
            Some(name) => name.to_string(),
            None => self.peer.ip().to_string(),
        }
    }

    pub fn send(&self, message: &Message) -> Result<()> {
        self.sink.send(message)
    }

    pub fn close(&self) {
        self.sink.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("username", &self.username.get())
            .finish()
    }
}
