//! Book-keeping of open client connections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use tokio::sync::Notify;

/// Identifier of a registered connection.
pub type ConnectionId = u64;

struct Entry {
    peer: SocketAddr,
    closed: Arc<Notify>,
}

/// The set of currently open connections.
///
/// Admission control reads its size, the accept loop adds to it and
/// connections leave it when their [`Registration`] is dropped. The server
/// can also force every connection closed during shutdown.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Entry>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. It stays registered until the returned guard drops.
    pub fn register(self: &Arc<Self>, peer: SocketAddr) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let closed = Arc::new(Notify::new());
        self.lock().insert(
            id,
            Entry {
                peer,
                closed: closed.clone(),
            },
        );
        Registration {
            id,
            registry: self.clone(),
            closed,
        }
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `id` is still registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Remove every connection and tell each one to close.
    ///
    /// Returns how many connections were signalled.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Entry> = self.lock().drain().map(|(_, entry)| entry).collect();
        for entry in &drained {
            debug!("Closing connection from {peer}", peer = entry.peer);
            // notify_one keeps a permit if the connection is not waiting yet
            entry.closed.notify_one();
        }
        drained.len()
    }

    fn remove(&self, id: ConnectionId) {
        if let Some(entry) = self.lock().remove(&id) {
            debug!("Connection from {peer} finished", peer = entry.peer);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Entry>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of membership in a [`ConnectionRegistry`].
///
/// Dropping it reports the connection as finished.
pub struct Registration {
    id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
    closed: Arc<Notify>,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Resolves once the server asks this connection to close.
    pub async fn closed(&self) {
        self.closed.notified().await;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_register_and_drop() {
        let registry = Arc::new(ConnectionRegistry::new());
        let first = registry.register(peer(1));
        let second = registry.register(peer(2));
        assert_eq!(registry.len(), 2);
        assert_ne!(first.id(), second.id());

        drop(first);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(second.id()));

        drop(second);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_close_all_signals_and_empties() {
        let registry = Arc::new(ConnectionRegistry::new());
        let registrations: Vec<Registration> = (0..3).map(|i| registry.register(peer(i))).collect();

        assert_eq!(registry.close_all(), 3);
        assert!(registry.is_empty());

        for registration in &registrations {
            tokio::time::timeout(Duration::from_secs(1), registration.closed())
                .await
                .expect("connection was not signalled");
        }

        // Late drops after close_all are harmless
        drop(registrations);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unsignalled_connection_stays_open() {
        let registry = Arc::new(ConnectionRegistry::new());
        let registration = registry.register(peer(9));
        let waited = tokio::time::timeout(Duration::from_millis(20), registration.closed()).await;
        assert!(waited.is_err());
        assert_eq!(registry.len(), 1);
    }
}
