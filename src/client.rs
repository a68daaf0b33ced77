//! Client side: one optional link to the server plus the local console
//! commands that manage it.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{RelayError, Result};
use crate::message::{Message, Origin};
use crate::protocol::{COMMAND_MARKER, ClientCommand};

const ALREADY_CONNECTED: &str = "Can't do that now. Already connected.";
pub const CONNECTION_CLOSED: &str = "Connection Closed to Server.";
pub const SEND_FAILED: &str = "Could not send message to server.  Terminating client.";
pub const SERVER_GONE: &str =
    "WARNING - The server has stopped listening for connections\nSERVER SHUTTING DOWN! DISCONNECTING!";

/// Where the client shows things to its user.
pub trait ChatDisplay {
    fn display(&mut self, body: &str, origin: Origin);

    /// Local status line that did not come from the server.
    fn notice(&mut self, text: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// What a link's reader task reports. `link` is the generation of the link
/// that produced the event, so events from a dropped link can be ignored.
#[derive(Debug)]
pub enum ClientEvent {
    Received { link: u64, message: Message },
    Raw { link: u64, line: String },
    Closed { link: u64 },
    Failed { link: u64, error: String },
}

struct Link {
    generation: u64,
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

pub struct ChatClient<D> {
    config: ClientConfig,
    display: D,
    link: Option<Link>,
    generation: u64,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl<D: ChatDisplay> ChatClient<D> {
    pub fn new(config: ClientConfig, display: D) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let client = Self {
            config,
            display,
            link: None,
            generation: 0,
            events,
        };
        (client, rx)
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Opens the link and logs in with the configured username.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(RelayError::PreconditionFailed(ALREADY_CONNECTED));
        }

        let socket = TcpStream::connect((self.config.host.as_str(), self.config.port)).await?;
        let (reader, writer) = socket.into_split();
        self.generation += 1;
        let generation = self.generation;
        let reader = tokio::spawn(read_loop(reader, generation, self.events.clone()));

        self.link = Some(Link {
            generation,
            writer,
            reader,
        });
        info!("connected to {}:{}", self.config.host, self.config.port);

        let login = format!("{COMMAND_MARKER}login {}", self.config.username);
        self.send_line(&login).await
    }

    /// Drops the link if there is one. Errors while hanging up are
    /// discarded.
    pub async fn disconnect(&mut self) -> bool {
        let Some(mut link) = self.link.take() else {
            return false;
        };
        link.reader.abort();
        let _ = link.writer.shutdown().await;
        true
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        let link = self.link.as_mut().ok_or(RelayError::ConnectionClosed)?;
        link.writer.write_all(format!("{line}\n").as_bytes()).await?;
        Ok(())
    }

    /// Best-effort hang up, then ask the caller to exit.
    pub async fn quit(&mut self) -> Flow {
        self.disconnect().await;
        Flow::Quit
    }

    pub async fn handle_console_line(&mut self, line: &str) -> Flow {
        match ClientCommand::parse(line) {
            None => self.send_chat(line).await,
            Some(Ok(command)) => self.execute(command).await,
            Some(Err(err)) => {
                self.display.notice(&err.to_string());
                Flow::Continue
            }
        }
    }

    async fn send_chat(&mut self, line: &str) -> Flow {
        match self.send_line(line).await {
            Ok(()) => Flow::Continue,
            Err(err) => {
                debug!("send failed: {err}");
                self.display.display(SEND_FAILED, Origin::Client);
                self.quit().await
            }
        }
    }

    pub async fn execute(&mut self, command: ClientCommand) -> Flow {
        match command {
            ClientCommand::Quit => return self.quit().await,
            ClientCommand::Logoff => {
                if self.disconnect().await {
                    self.display.notice(CONNECTION_CLOSED);
                }
            }
            ClientCommand::SetHost(host) => {
                if self.is_connected() {
                    self.display.notice(ALREADY_CONNECTED);
                } else {
                    self.display.notice(&format!("Host set to {host}"));
                    self.config.host = host;
                }
            }
            ClientCommand::SetPort(port) => {
                if self.is_connected() {
                    self.display.notice(ALREADY_CONNECTED);
                } else {
                    self.config.port = port;
                    self.display.notice(&format!("Port set to {port}"));
                }
            }
            ClientCommand::Login => match self.connect().await {
                Ok(()) => {}
                Err(RelayError::PreconditionFailed(text)) => self.display.notice(text),
                Err(err) => {
                    debug!("connect failed: {err}");
                    self.disconnect().await;
                    self.display.notice(
                        "Error opening connection to server. Perhaps the server is not running!",
                    );
                }
            },
            ClientCommand::GetHost => {
                let text = format!("Current host is {}", self.config.host);
                self.display.notice(&text);
            }
            ClientCommand::GetPort => {
                let text = format!("Current port is {}", self.config.port);
                self.display.notice(&text);
            }
        }
        Flow::Continue
    }

    /// Applies an event from a reader task.
    pub async fn handle_event(&mut self, event: ClientEvent) -> Flow {
        let current = self.link.as_ref().map(|link| link.generation);
        let link = match &event {
            ClientEvent::Received { link, .. }
            | ClientEvent::Raw { link, .. }
            | ClientEvent::Closed { link }
            | ClientEvent::Failed { link, .. } => *link,
        };
        if current != Some(link) {
            debug!("ignoring event from old link {link}");
            return Flow::Continue;
        }

        match event {
            ClientEvent::Received { message, .. } => {
                self.display.display(&message.body, message.origin);
            }
            ClientEvent::Raw { line, .. } => {
                self.display.notice(&format!("RAW MSG> {line}"));
            }
            ClientEvent::Closed { .. } => {
                self.link = None;
                self.display.notice(CONNECTION_CLOSED);
            }
            ClientEvent::Failed { error, .. } => {
                debug!("link failed: {error}");
                self.display.notice(SERVER_GONE);
                return self.quit().await;
            }
        }
        Flow::Continue
    }
}

async fn read_loop(reader: OwnedReadHalf, link: u64, events: mpsc::UnboundedSender<ClientEvent>) {
    let mut lines = BufReader::new(reader).lines();

    let last = loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let event = match Message::decode_line(&line) {
                    Ok(message) => ClientEvent::Received { link, message },
                    Err(_) => ClientEvent::Raw { link, line },
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            Ok(None) => break ClientEvent::Closed { link },
            Err(err) => {
                break ClientEvent::Failed {
                    link,
                    error: err.to_string(),
                };
            }
        }
    };

    let _ = events.send(last);
}

/// Writes to stdout, tagging server messages.
#[derive(Debug, Default)]
pub struct ConsoleDisplay;

impl ChatDisplay for ConsoleDisplay {
    fn display(&mut self, body: &str, origin: Origin) {
        match origin {
            Origin::Server => println!("SERVER MSG> {body}"),
            Origin::Client => println!("{body}"),
        }
    }

    fn notice(&mut self, text: &str) {
        println!("{text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Screen {
        lines: Vec<String>,
    }

    impl ChatDisplay for Screen {
        fn display(&mut self, body: &str, origin: Origin) {
            self.lines.push(format!("{origin:?}: {body}"));
        }

        fn notice(&mut self, text: &str) {
            self.lines.push(text.to_string());
        }
    }

    fn client(port: u16) -> ChatClient<Screen> {
        let config = ClientConfig {
            username: "alice".into(),
            host: "127.0.0.1".into(),
            port,
        };
        ChatClient::new(config, Screen::default()).0
    }

    #[tokio::test]
    async fn settings_change_only_while_disconnected() {
        let mut client = client(5555);

        assert_eq!(client.handle_console_line("#sethost example.org").await, Flow::Continue);
        assert_eq!(client.handle_console_line("#setport 6001").await, Flow::Continue);
        client.handle_console_line("#gethost").await;
        client.handle_console_line("#getport").await;

        assert_eq!(client.config().host, "example.org");
        assert_eq!(client.config().port, 6001);
        assert!(client.display().lines.contains(&"Current host is example.org".to_string()));
        assert!(client.display().lines.contains(&"Current port is 6001".to_string()));
    }

    #[tokio::test]
    async fn invalid_command_is_reported() {
        let mut client = client(5555);
        assert_eq!(client.handle_console_line("#fly").await, Flow::Continue);
        assert_eq!(client.display().lines, vec!["Invalid command: '#fly'"]);
    }

    #[tokio::test]
    async fn chat_while_disconnected_terminates() {
        let mut client = client(5555);
        assert_eq!(client.handle_console_line("hello").await, Flow::Quit);
        assert_eq!(client.display().lines, vec![format!("Client: {SEND_FAILED}")]);
    }

    #[tokio::test]
    async fn quit_while_disconnected_is_quiet() {
        let mut client = client(5555);
        assert_eq!(client.handle_console_line("#quit").await, Flow::Quit);
        assert!(client.display().lines.is_empty());
    }

    #[tokio::test]
    async fn login_against_nothing_reports_and_stays_disconnected() {
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let mut client = client(port);

        assert_eq!(client.handle_console_line("#login").await, Flow::Continue);
        assert!(!client.is_connected());
        assert_eq!(client.display().lines.len(), 1);
        assert!(client.display().lines[0].starts_with("Error opening connection"));
    }

    async fn connected_client() -> (ChatClient<Screen>, tokio::net::TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = client(listener.local_addr().unwrap().port());

        client.connect().await.unwrap();
        let (server_side, _) = listener.accept().await.unwrap();
        (client, server_side)
    }

    #[tokio::test]
    async fn quit_while_connected_hangs_up_after_login() {
        use tokio::io::AsyncReadExt;

        let (mut client, mut server_side) = connected_client().await;
        assert!(client.is_connected());

        assert_eq!(client.handle_console_line("#quit").await, Flow::Quit);
        assert!(!client.is_connected());

        let mut received = String::new();
        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            server_side.read_to_string(&mut received),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(received, "#login alice\n");
    }

    #[tokio::test]
    async fn read_failure_on_current_link_quits() {
        let (mut client, _server_side) = connected_client().await;

        let flow = client
            .handle_event(ClientEvent::Failed {
                link: 1,
                error: "connection reset by peer".into(),
            })
            .await;

        assert_eq!(flow, Flow::Quit);
        assert!(!client.is_connected());
        assert_eq!(client.display().lines, vec![SERVER_GONE]);
    }

    #[tokio::test]
    async fn stale_link_events_are_ignored() {
        let mut client = client(5555);
        let flow = client
            .handle_event(ClientEvent::Failed {
                link: 7,
                error: "reset".into(),
            })
            .await;

        assert_eq!(flow, Flow::Continue);
        assert!(client.display().lines.is_empty());
    }
}
