//! Routing for everything a client connection raises: connect, inbound
//! payload, disconnect and transport error.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::broadcast::{Delivery, broadcast};
use crate::error::{RelayError, Result};
use crate::message::Message;
use crate::protocol::{ClientRequest, LOGIN_REQUIRED, USERNAME_ALREADY_SET};
use crate::registry::{ConnectionSource, Registry};
use crate::session::{ConnectionId, ConnectionSink, Session};

#[derive(Default)]
pub struct Relay {
    registry: Registry,
    /// Set once by `disconnect_all`; sessions registering afterwards are
    /// hung up on arrival.
    closing: AtomicBool,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn client_count(&self) -> usize {
        self.registry.client_count()
    }

    pub fn on_connect(&self, peer: SocketAddr, sink: Arc<dyn ConnectionSink>) -> Arc<Session> {
        let session = self.registry.add(peer, sink);
        if self.closing.load(Ordering::SeqCst) {
            debug!(connection = %session.id(), "relay closing, hanging up");
            session.close();
            return session;
        }
        let notice = format!("Welcome client at {} !!", peer.ip());

        info!(connection = %session.id(), "{notice}");
        self.announce(notice);

        session
    }

    /// Handles one payload from a client.
    ///
    /// Chat from a session that never logged in gets a notice, the
    /// connection is closed and `ProtocolViolation` is returned.
    pub fn on_receive(&self, id: ConnectionId, payload: &str) -> Result<()> {
        let session = match self.registry.find(id) {
            Ok(session) => session,
            Err(err) => {
                debug!("dropping payload: {err}");
                return Ok(());
            }
        };

        match ClientRequest::parse(payload) {
            Some(ClientRequest::Login(name)) => self.login(&session, &name),
            Some(ClientRequest::Ignored) => {
                debug!(connection = %id, "ignoring client command {payload:?}");
                Ok(())
            }
            None => self.chat(&session, payload),
        }
    }

    fn login(&self, session: &Session, name: &str) -> Result<()> {
        match session.set_username(name) {
            Ok(()) => {
                info!(connection = %session.id(), "logged in as {name}");
                Ok(())
            }
            Err(RelayError::UsernameAlreadySet) => {
                session.send(&Message::server(USERNAME_ALREADY_SET))?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn chat(&self, session: &Session, body: &str) -> Result<()> {
        let Some(username) = session.username() else {
            if let Err(err) = session.send(&Message::server(LOGIN_REQUIRED)) {
                warn!(connection = %session.id(), "could not send login notice: {err}");
            }
            session.close();
            return Err(RelayError::ProtocolViolation(session.id()));
        };

        info!("Message received: {body} from {username}");
        broadcast(&self.registry, &Message::chat(username, body));
        Ok(())
    }

    /// Drops the session and tells everyone it left. Returns `false` when the
    /// session was already gone, in which case nothing is announced.
    pub fn on_disconnect(&self, id: ConnectionId) -> bool {
        let Some(session) = self.registry.remove(id) else {
            return false;
        };
        let notice = format!("{} has logged off!", session.display_name());

        info!(connection = %id, "{notice}");
        self.announce(notice);
        true
    }

    pub fn on_error(&self, id: ConnectionId, cause: impl Display) -> bool {
        warn!(connection = %id, "connection error: {cause}");
        self.on_disconnect(id)
    }

    /// Server-origin broadcast to every session.
    pub fn announce<S: Into<String>>(&self, body: S) -> Delivery {
        broadcast(&self.registry, &Message::server(body))
    }

    /// Asks every live connection to hang up, including any that registers
    /// later. Each worker raises its own disconnect, so the registry empties
    /// asynchronously.
    pub fn disconnect_all(&self) -> usize {
        self.closing.store(true, Ordering::SeqCst);
        let mut closed = 0;
        self.registry.for_each(|session| {
            session.close();
            closed += 1;
        });
        closed
    }
}
