//! Connected client abstractions

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::warn;

use super::error::ClientError;

/// Queue depth at which a client is reported as falling behind, and the step
/// between repeated reports.
pub const OUTBOX_WARN_DEPTH: usize = 64;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn next() -> Self {
        ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outbound side of one connection. Messages are queued for the connection's
/// writer task; delivery fails once that task has gone away.
///
/// The queue is unbounded so a broadcast never waits on a slow reader. Its
/// depth is tracked and logged as it grows.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    outbox: mpsc::UnboundedSender<String>,
    pending: Arc<AtomicUsize>,
}

impl ClientHandle {
    /// Creates a handle together with the receiving end of its outbox.
    pub fn channel() -> (Self, Outbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let handle = Self {
            id: ClientId::next(),
            outbox: tx,
            pending: Arc::clone(&pending),
        };
        (handle, Outbox { rx, pending })
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Messages queued but not yet taken by the writer.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    pub fn deliver(&self, payload: &str) -> Result<(), ClientError> {
        let depth = self.pending.fetch_add(1, Ordering::Relaxed) + 1;
        if self.outbox.send(payload.to_string()).is_err() {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            return Err(ClientError::ConnectionLost(self.id));
        }
        if depth % OUTBOX_WARN_DEPTH == 0 {
            warn!(client = %self.id, depth, "Client is not keeping up with broadcasts");
        }
        Ok(())
    }
}

/// Receiving end of a [`ClientHandle`], owned by the connection's writer.
#[derive(Debug)]
pub struct Outbox {
    rx: mpsc::UnboundedReceiver<String>,
    pending: Arc<AtomicUsize>,
}

impl Outbox {
    pub async fn recv(&mut self) -> Option<String> {
        let message = self.rx.recv().await?;
        self.pending.fetch_sub(1, Ordering::Relaxed);
        Some(message)
    }

    pub fn try_recv(&mut self) -> Result<String, TryRecvError> {
        let message = self.rx.try_recv()?;
        self.pending.fetch_sub(1, Ordering::Relaxed);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let (a, _rx_a) = ClientHandle::channel();
        let (b, _rx_b) = ClientHandle::channel();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_deliver_fails_after_receiver_dropped() {
        let (handle, mut rx) = ClientHandle::channel();
        handle.deliver("hello").unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));

        drop(rx);
        assert_eq!(
            handle.deliver("again"),
            Err(ClientError::ConnectionLost(handle.id()))
        );
        assert_eq!(handle.pending(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_pending_tracks_unread_messages() {
        let (handle, mut rx) = ClientHandle::channel();
        for n in 0..OUTBOX_WARN_DEPTH + 1 {
            handle.deliver(&format!("snapshot {n}")).unwrap();
        }
        assert_eq!(handle.pending(), OUTBOX_WARN_DEPTH + 1);

        assert_eq!(rx.recv().await.as_deref(), Some("snapshot 0"));
        assert_eq!(rx.try_recv().as_deref(), Ok("snapshot 1"));
        assert_eq!(handle.pending(), OUTBOX_WARN_DEPTH - 1);
    }
}
