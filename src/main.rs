use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use chat_relay::config::{ServerArgs, ServerConfig};
use chat_relay::server::{Outcome, Server};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = ServerConfig::from(ServerArgs::parse());
    let server = Server::new(config);

    match server.start().await {
        Ok(notice) => println!("{notice}"),
        Err(err) => {
            error!("listen failed: {err}");
            println!("ERROR - Could not listen for clients!");
        }
    }

    let mut console = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = console.next_line().await? {
        match server.handle_console_line(&line).await {
            Outcome::Notice(text) => println!("{text}"),
            Outcome::Quiet => {}
            Outcome::Shutdown(shutdown) => return Ok(shutdown.exit_code()),
        }
    }

    // Console closed (EOF): shut down as if the operator typed #quit.
    Ok(server.quit().await.exit_code())
}
