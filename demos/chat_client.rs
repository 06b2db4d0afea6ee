//! Interactive terminal chat client.
//!
//! Run with `cargo run --example chat_client -- demos/client_config.toml`.
//! Set `RUST_LOG=ws_session=debug` to see session lifecycle logs.

use std::error::Error;
use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use ws_session::config::ClientConfig;
use ws_session::console::LineFormatter;
use ws_session::retry::{connect_with_retry, RetryPolicy};
use ws_session::{InboundEvent, SessionManager};

const DEFAULT_CONFIG_PATH: &str = "demos/client_config.toml";

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = ClientConfig::load(&path)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let manager = SessionManager::new(config.transport()?);
        let formatter = LineFormatter::new(config.settings.display_current_time);
        let mut events = manager.event_stream();

        connect_with_retry(&manager, &config.endpoint_str(), &RetryPolicy::reconnect()).await?;
        prompt();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) if line.trim().is_empty() => prompt(),
                    Some(line) => {
                        manager.send(line)?;
                        prompt();
                    }
                    None => break,
                },
                event = events.recv() => match event {
                    Some(InboundEvent::MessageReceived { payload }) => {
                        println!("\r{}", formatter.format(&payload));
                        prompt();
                    }
                    Some(InboundEvent::Opened) => {}
                    Some(InboundEvent::Error { description }) => {
                        eprintln!("\rconnection error: {description}");
                    }
                    Some(InboundEvent::Closed { code, reason }) => {
                        eprintln!("\rconnection closed ({code}) {reason}");
                        return Ok(());
                    }
                    None => return Ok(()),
                },
            }
        }

        manager.close();
        while let Some(event) = events.recv().await {
            if matches!(event, InboundEvent::Closed { .. }) {
                break;
            }
        }
        Ok::<(), Box<dyn Error>>(())
    })
}
