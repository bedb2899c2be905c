//! Per-connection state machine.

use super::command::CommandDispatcher;
use crate::core::{ClientHandle, Outbox};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info};

#[derive(Debug)]
enum ConnectionState {
    Connected,
    AwaitMessage,
    Processing(String),
    Closed,
}

/// Drives one connection until it closes. Messages are processed one at a
/// time in arrival order; text that arrives while a command is running is
/// queued. A close during processing cancels a fetch that is still running;
/// results already fetched are logged and broadcast regardless.
pub async fn serve_connection<W, R>(sink: W, mut stream: R, dispatcher: Arc<CommandDispatcher>)
where
    W: Sink<Message, Error = WsError> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let (handle, outbox) = ClientHandle::channel();
    let id = handle.id();
    let writer = tokio::spawn(write_loop(sink, outbox));
    let registry = dispatcher.registry();

    let mut backlog: VecDeque<String> = VecDeque::new();
    let mut state = ConnectionState::Connected;
    loop {
        debug!(client = %id, ?state, "Connection state");
        state = match state {
            ConnectionState::Connected => {
                registry.register(handle.clone()).await;
                info!(client = %id, "Client connected");
                ConnectionState::AwaitMessage
            }
            ConnectionState::AwaitMessage => match backlog.pop_front() {
                Some(text) => ConnectionState::Processing(text),
                None => match next_text(&mut stream).await {
                    Some(text) => ConnectionState::Processing(text),
                    None => ConnectionState::Closed,
                },
            },
            ConnectionState::Processing(text) => {
                let work = dispatcher.handle(&handle, &text);
                tokio::pin!(work);
                loop {
                    tokio::select! {
                        biased;
                        outcome = &mut work => {
                            debug!(client = %id, ?outcome, "Command processed");
                            break ConnectionState::AwaitMessage;
                        }
                        frame = next_text(&mut stream) => match frame {
                            Some(text) => backlog.push_back(text),
                            None => {
                                info!(client = %id, "Connection closed while processing, dropping command");
                                break ConnectionState::Closed;
                            }
                        },
                    }
                }
            }
            ConnectionState::Closed => {
                registry.unregister(id).await;
                info!(client = %id, "Client disconnected");
                break;
            }
        };
    }

    // With the registry's copy gone this closes the outbox and lets the
    // writer finish what is queued.
    drop(handle);
    if let Err(e) = writer.await {
        debug!(client = %id, error = %e, "Writer task failed");
    }
}

/// Next text frame, skipping control and binary frames. `None` once the peer
/// closes or the stream errors.
async fn next_text<R>(stream: &mut R) -> Option<String>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(text.to_string()),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "Read failed");
                return None;
            }
        }
    }
    None
}

async fn write_loop<W>(mut sink: W, mut outbox: Outbox)
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(payload) = outbox.recv().await {
        if let Err(e) = sink.send(Message::text(payload)).await {
            debug!(error = %e, "Write failed, stopping writer");
            return;
        }
    }
    let _ = sink.close().await;
}
