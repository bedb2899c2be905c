use crate::server::command::Command;
use anyhow::{Context, Result, anyhow};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Sends one message to a running server. For exchange commands, waits up to
/// `timeout` for the first reply (the broadcast log or an error) and returns it.
pub async fn send_message(url: &str, message: &str, timeout: Duration) -> Result<Option<String>> {
    let (mut ws, _) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    debug!(%url, "Connected");

    ws.send(Message::text(message))
        .await
        .context("Failed to send message")?;

    let expects_reply = matches!(Command::parse(message), Ok(Command::Exchange { .. }) | Err(_));
    if !expects_reply {
        let _ = ws.close(None).await;
        return Ok(None);
    }

    let reply = tokio::time::timeout(timeout, async {
        while let Some(frame) = ws.next().await {
            match frame.context("Failed to read reply")? {
                Message::Text(text) => return Ok(text.to_string()),
                Message::Close(_) => break,
                _ => continue,
            }
        }
        Err(anyhow!("Server closed the connection without replying"))
    })
    .await
    .context("Timed out waiting for a reply")??;

    let _ = ws.close(None).await;
    Ok(Some(reply))
}

pub async fn run(url: &str, message: &str) -> Result<()> {
    if let Some(reply) = send_message(url, message, Duration::from_secs(60)).await? {
        println!("{reply}");
    }
    Ok(())
}
