use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::error::RelayError;
use crate::message::Message;
use crate::relay::Relay;
use crate::session::{ConnectionId, ConnectionSink};

/// Messages a worker holds for a peer that is not keeping up. A full queue
/// hangs the peer up.
pub const OUTBOUND_CAPACITY: usize = 1024;

/// How long a hang-up may spend writing messages queued before it.
const FLUSH_GRACE: Duration = Duration::from_millis(500);

/// Sink backed by the worker's bounded queue. Never blocks the caller.
struct ChannelSink {
    tx: mpsc::Sender<Message>,
    hangup: Arc<Notify>,
}

impl ChannelSink {
    fn new(capacity: usize) -> (Self, mpsc::Receiver<Message>, Arc<Notify>) {
        let (tx, rx) = mpsc::channel(capacity);
        let hangup = Arc::new(Notify::new());
        let sink = Self {
            tx,
            hangup: hangup.clone(),
        };
        (sink, rx, hangup)
    }
}

impl ConnectionSink for ChannelSink {
    fn send(&self, message: &Message) -> crate::error::Result<()> {
        match self.tx.try_send(message.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.hangup.notify_one();
                Err(RelayError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(RelayError::ConnectionClosed),
        }
    }

    /// Takes effect even while the worker is stuck writing to the socket.
    fn close(&self) {
        self.hangup.notify_one();
    }
}

/// Worker for one client connection. Runs until the peer hangs up, the
/// session is closed from our side, or the socket fails; then raises the
/// matching disconnect on the relay.
pub async fn handle(relay: Arc<Relay>, socket: TcpStream, peer: SocketAddr) {
    let (sink, mut rx, hangup) = ChannelSink::new(OUTBOUND_CAPACITY);
    let id = relay.on_connect(peer, Arc::new(sink)).id();

    match pump(&relay, id, socket, &mut rx, &hangup).await {
        Ok(()) => {
            relay.on_disconnect(id);
        }
        Err(err) => {
            relay.on_error(id, format!("{err:#}"));
        }
    }
}

async fn pump(
    relay: &Relay,
    id: ConnectionId,
    socket: TcpStream,
    rx: &mut mpsc::Receiver<Message>,
    hangup: &Notify,
) -> Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            biased;

            _ = hangup.notified() => {
                debug!(connection = %id, "closing from server side");
                if tokio::time::timeout(FLUSH_GRACE, flush(&mut writer, rx)).await.is_err() {
                    debug!(connection = %id, "peer not reading, dropping queued messages");
                }
                return Ok(());
            }

            outbound = rx.recv() => {
                let Some(msg) = outbound else {
                    return Ok(());
                };
                tokio::select! {
                    biased;

                    // a half-written line cannot be finished, so nothing more is sent
                    _ = hangup.notified() => {
                        debug!(connection = %id, "closing mid-write");
                        return Ok(());
                    }
                    written = write_message(&mut writer, &msg) => written?,
                }
            }

            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if let Err(err) = relay.on_receive(id, &line) {
                            debug!(connection = %id, "{err}");
                        }
                    }
                    // Client disconnected (EOF)
                    None => return Ok(()),
                }
            }
        }
    }
}

/// Writes whatever is already queued, then shuts the write side.
async fn flush(writer: &mut OwnedWriteHalf, rx: &mut mpsc::Receiver<Message>) -> Result<()> {
    while let Ok(msg) = rx.try_recv() {
        write_message(writer, &msg).await?;
    }
    writer.shutdown().await?;
    Ok(())
}

async fn write_message(writer: &mut OwnedWriteHalf, msg: &Message) -> Result<()> {
    writer.write_all(msg.encode_line()?.as_bytes()).await?;
    Ok(())
}
