//! Listening-socket lifecycle and the operator console.
//!
//! `Stopped` -> `Listening` on `start`, back to `Stopped` on `stop`.
//! `close` and `quit` move to `Closed` from either state, which stops the
//! listener for good and disconnects every session.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::{RelayError, Result};
use crate::protocol::ServerCommand;
use crate::relay::Relay;

const ALREADY_LISTENING: &str = "We are already started and listening for clients!.";
const NOT_LISTENING: &str = "Server is not listening.";
const SERVER_CLOSED: &str = "Server is closed.";
const PORT_BUSY: &str = "Can't do that now. Server is connected.";

/// What the console should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Notice(String),
    Quiet,
    Shutdown(Shutdown),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Clean,
    /// Resources could not be released.
    Failed,
}

impl Shutdown {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Shutdown::Clean => ExitCode::SUCCESS,
            Shutdown::Failed => ExitCode::FAILURE,
        }
    }
}

struct Listener {
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

enum Phase {
    Stopped,
    Listening(Listener),
    Closed,
}

struct Lifecycle {
    port: u16,
    phase: Phase,
}

pub struct Server {
    relay: Arc<Relay>,
    config: ServerConfig,
    lifecycle: Mutex<Lifecycle>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            relay: Arc::new(Relay::new()),
            lifecycle: Mutex::new(Lifecycle {
                port: config.port,
                phase: Phase::Stopped,
            }),
            config,
        }
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    pub async fn port(&self) -> u16 {
        self.lifecycle.lock().await.port
    }

    pub async fn is_listening(&self) -> bool {
        matches!(self.lifecycle.lock().await.phase, Phase::Listening(_))
    }

    /// Address actually bound, while listening.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &self.lifecycle.lock().await.phase {
            Phase::Listening(listener) => Some(listener.local_addr),
            _ => None,
        }
    }

    pub async fn start(&self) -> Result<String> {
        let mut lifecycle = self.lifecycle.lock().await;
        match lifecycle.phase {
            Phase::Listening(_) => return Err(RelayError::PreconditionFailed(ALREADY_LISTENING)),
            Phase::Closed => return Err(RelayError::PreconditionFailed(SERVER_CLOSED)),
            Phase::Stopped => {}
        }

        let listener = TcpListener::bind((self.config.host.as_str(), lifecycle.port)).await?;
        let local_addr = listener.local_addr()?;
        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(listener, self.relay.clone(), stop_rx));

        lifecycle.phase = Phase::Listening(Listener {
            local_addr,
            stop,
            task,
        });

        let notice = format!("Server listening for connections on port {}", local_addr.port());
        info!("{notice}");
        Ok(notice)
    }

    /// Stops accepting. Existing sessions stay connected.
    pub async fn stop(&self) -> Result<String> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !matches!(lifecycle.phase, Phase::Listening(_)) {
            return Err(RelayError::PreconditionFailed(NOT_LISTENING));
        }

        stop_listening(&mut lifecycle.phase, Phase::Stopped).await;
        Ok(stopped_notice())
    }

    /// Stops listening for good and disconnects every session, waiting up to
    /// the configured timeout for all of them to hang up.
    pub async fn close(&self) -> Result<String> {
        {
            let mut lifecycle = self.lifecycle.lock().await;
            stop_listening(&mut lifecycle.phase, Phase::Closed).await;
        }

        let closing = self.relay.disconnect_all();
        info!("closing {closing} connection(s)");

        let drained = self.relay.registry().wait_empty();
        if tokio::time::timeout(self.config.close_timeout, drained)
            .await
            .is_err()
        {
            return Err(RelayError::CloseTimedOut {
                remaining: self.relay.client_count(),
            });
        }

        Ok(format!("Server closed, {closing} client(s) disconnected."))
    }

    /// Legal only while not listening and with nobody connected.
    pub async fn set_port(&self, port: u16) -> Result<String> {
        let mut lifecycle = self.lifecycle.lock().await;
        if matches!(lifecycle.phase, Phase::Listening(_)) || self.relay.client_count() > 0 {
            return Err(RelayError::PreconditionFailed(PORT_BUSY));
        }

        lifecycle.port = port;
        Ok(format!("Port set to {port}"))
    }

    pub async fn execute(&self, command: ServerCommand) -> Result<Outcome> {
        let outcome = match command {
            ServerCommand::Quit => Outcome::Shutdown(self.quit().await),
            ServerCommand::Stop => Outcome::Notice(self.stop().await?),
            ServerCommand::Close => match self.close().await {
                Ok(notice) => Outcome::Notice(notice),
                Err(err) => {
                    error!("close failed: {err}");
                    Outcome::Notice(format!("Error closing server: {err}"))
                }
            },
            ServerCommand::SetPort(port) => Outcome::Notice(self.set_port(port).await?),
            ServerCommand::Start => Outcome::Notice(self.start().await?),
            ServerCommand::GetPort => Outcome::Notice(format!("Current port is {}", self.port().await)),
        };
        Ok(outcome)
    }

    /// Closes everything. Only a failed close makes the shutdown unclean.
    pub async fn quit(&self) -> Shutdown {
        match self.close().await {
            Ok(_) => Shutdown::Clean,
            Err(err) => {
                error!("could not release resources: {err}");
                Shutdown::Failed
            }
        }
    }

    /// One line of operator input. Commands run; anything else is broadcast
    /// to every client as a server message. Refusals come back as notices.
    pub async fn handle_console_line(&self, line: &str) -> Outcome {
        let command = match ServerCommand::parse(line) {
            None => {
                self.relay.announce(line);
                return Outcome::Quiet;
            }
            Some(Ok(command)) => command,
            Some(Err(err)) => return Outcome::Notice(err.to_string()),
        };

        match self.execute(command).await {
            Ok(outcome) => outcome,
            Err(err) => Outcome::Notice(err.to_string()),
        }
    }
}

fn stopped_notice() -> String {
    "Server has stopped listening for connections.".to_string()
}

/// Leaves `Listening` (if in it) for `next`, waiting for the accept loop to
/// drop its socket.
async fn stop_listening(phase: &mut Phase, next: Phase) {
    if let Phase::Listening(listener) = std::mem::replace(phase, next) {
        let _ = listener.stop.send(());
        if let Err(err) = listener.task.await {
            warn!("accept loop ended abnormally: {err}");
        }
        info!("{}", stopped_notice());
    }
}

async fn accept_loop(listener: TcpListener, relay: Arc<Relay>, mut stop: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut stop => break,

            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        tokio::spawn(crate::conn::handle(relay.clone(), socket, peer));
                    }
                    Err(err) => warn!("accept failed: {err}"),
                }
            }
        }
    }
}
