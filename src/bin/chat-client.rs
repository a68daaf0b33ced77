use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use chat_relay::client::{ChatClient, ConsoleDisplay, Flow};
use chat_relay::config::{ClientArgs, ClientConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = ClientConfig::from(ClientArgs::parse());
    let (mut client, mut events) = ChatClient::new(config, ConsoleDisplay);

    if let Err(err) = client.connect().await {
        client.disconnect().await;
        println!("Error: Can't setup connection! ({err}) Type #login to retry.");
    }

    let mut console = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let flow = tokio::select! {
            line = console.next_line() => match line? {
                Some(line) => client.handle_console_line(&line).await,
                None => client.quit().await,
            },

            Some(event) = events.recv() => client.handle_event(event).await,
        };

        if flow == Flow::Quit {
            return Ok(());
        }
    }
}
