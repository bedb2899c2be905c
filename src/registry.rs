//! Set of live client connections.

use crate::core::{ClientHandle, ClientId};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, ClientHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handle: ClientHandle) {
        let mut clients = self.clients.lock().await;
        debug!(client = %handle.id(), total = clients.len() + 1, "Client registered");
        clients.insert(handle.id(), handle);
    }

    /// Removes the client. Returns `false` if it was already gone.
    pub async fn unregister(&self, id: ClientId) -> bool {
        let mut clients = self.clients.lock().await;
        let removed = clients.remove(&id).is_some();
        if removed {
            debug!(client = %id, total = clients.len(), "Client unregistered");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }

    /// Delivers `payload` to a point-in-time copy of the registered clients.
    /// Clients that fail delivery are unregistered and do not affect the rest.
    pub async fn broadcast(&self, payload: &str) -> BroadcastReport {
        let recipients: Vec<ClientHandle> = self.clients.lock().await.values().cloned().collect();

        let mut report = BroadcastReport::default();
        for handle in recipients {
            match handle.deliver(payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(error = %e, "Dropping client after failed delivery");
                    self.unregister(handle.id()).await;
                    report.dropped += 1;
                }
            }
        }

        debug!(
            delivered = report.delivered,
            dropped = report.dropped,
            "Broadcast complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_unregister_is_idempotent() {
        let registry = ClientRegistry::new();
        let (handle, _rx) = ClientHandle::channel();
        let id = handle.id();

        registry.register(handle).await;
        assert_eq!(registry.len().await, 1);

        assert!(registry.unregister(id).await);
        assert!(!registry.unregister(id).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let registry = ClientRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (handle, rx) = ClientHandle::channel();
            registry.register(handle).await;
            receivers.push(rx);
        }

        let report = registry.broadcast("snapshot").await;
        assert_eq!(report, BroadcastReport { delivered: 3, dropped: 0 });
        for rx in receivers.iter_mut() {
            assert_eq!(rx.recv().await.as_deref(), Some("snapshot"));
        }
    }

    #[tokio::test]
    async fn test_broadcast_survives_dead_client() {
        let registry = ClientRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..4 {
            let (handle, rx) = ClientHandle::channel();
            registry.register(handle).await;
            receivers.push(rx);
        }

        // Kill one connection's writer
        drop(receivers.remove(1));

        let report = registry.broadcast("snapshot").await;
        assert_eq!(report, BroadcastReport { delivered: 3, dropped: 1 });
        assert_eq!(registry.len().await, 3);
        for rx in receivers.iter_mut() {
            assert_eq!(rx.recv().await.as_deref(), Some("snapshot"));
        }

        // The dead client is gone, later broadcasts are clean
        let report = registry.broadcast("again").await;
        assert_eq!(report, BroadcastReport { delivered: 3, dropped: 0 });
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_registry() {
        let registry = ClientRegistry::new();
        assert_eq!(registry.broadcast("nobody").await, BroadcastReport::default());
    }
}
