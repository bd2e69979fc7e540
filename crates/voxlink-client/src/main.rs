//! voxlink console client
//!
//! - Loads `voxlink.yaml` (or the path given as first argument)
//! - Negotiates, connects and waits for `welcome`
//! - Optionally starts a chat with the character id given as second argument
//! - Streams `replyChunk` text to stdout and relays stdin lines as user messages
//!
//! The engine never reconnects by itself; this binary exits when the hub closes.

use std::io::Write as _;
use std::process::ExitCode;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use voxlink_client::{config, CancellationToken, ConnectionState, HubClient};
use voxlink_core::Result;

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "voxlink.yaml".to_string());
    let character = args.next();

    match run(&path, character.as_deref()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.code().as_str(), error = %e, "voxlink stopped");
            ExitCode::FAILURE
        }
    }
}

fn text_of(payload: &Value) -> &str {
    payload.get("text").and_then(Value::as_str).unwrap_or("")
}

async fn run(path: &str, character: Option<&str>) -> Result<()> {
    let cfg = config::load_from_file(path)?;
    let client = HubClient::new(cfg)?;

    client.on("replyChunk", |ev| async move {
        print!("{}", text_of(&ev.payload));
        std::io::stdout().flush()?;
        Ok(())
    });
    client.on("replyEnd", |_| async {
        println!();
        Ok(())
    });
    client.on("chatStarted", |ev| async move {
        tracing::info!(chat_id = ?ev.payload.get("chatId"), "chat started; type a message");
        Ok(())
    });
    client.on("error", |ev| async move {
        tracing::warn!(payload = %ev.payload, "server error");
        Ok(())
    });
    client.on("callback_error", |ev| async move {
        tracing::warn!(payload = %ev.payload, "subscriber failed");
        Ok(())
    });

    let cancel = CancellationToken::new();
    let negotiation = client.negotiate(&cancel).await?;
    client.connect(&negotiation, &cancel).await?;

    if let Some(character_id) = character {
        client.start_chat(character_id, Vec::new()).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut state = client.watch_state();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            changed = state.changed() => {
                if changed.is_err() || !state.borrow().is_open() {
                    tracing::info!(state = %*state.borrow(), "hub connection ended");
                    return Ok(());
                }
            }

            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "/quit" {
                    break;
                }
                if let Err(e) = client.send_message(line, None).await {
                    tracing::warn!(code = e.code().as_str(), error = %e, "message not sent");
                }
            }
        }
    }

    if client.state() != ConnectionState::Closed {
        client.close(&cancel).await?;
    }
    Ok(())
}
