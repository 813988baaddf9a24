//! Registry of live connections.
//!
//! Every accepted socket is registered before its task starts and holds a
//! [`Registration`] for as long as it runs. Dropping the registration removes
//! the entry, so an entry can never outlive its connection task, whether the
//! task returns normally, fails, or is cancelled at shutdown.

use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metadata about one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: u64,
    pub peer: SocketAddr,
    pub connected_at: Instant,
}

impl ConnectionInfo {
    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Connection registry shared by the accept loop and connection tasks.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<u64, ConnectionInfo>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a connection and returns the guard that owns its entry.
    pub fn register(self: &Arc<Self>, peer: SocketAddr) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(
            id,
            ConnectionInfo {
                id,
                peer,
                connected_at: Instant::now(),
            },
        );
        Registration {
            id,
            registry: Arc::clone(self),
        }
    }

    /// Returns the number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<ConnectionInfo> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Returns a snapshot of all live connections, oldest first.
    pub fn list(&self) -> Vec<ConnectionInfo> {
        let mut list: Vec<_> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        list.sort_by_key(|info| info.id);
        list
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Ownership of one registry entry; removes it on drop.
#[derive(Debug)]
pub struct Registration {
    id: u64,
    registry: Arc<ConnectionRegistry>,
}

impl Registration {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.connections.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_register_and_drop() {
        let registry = Arc::new(ConnectionRegistry::new());
        let first = registry.register(addr(1000));
        let second = registry.register(addr(1001));

        assert_eq!(registry.len(), 2);
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.get(first.id()).unwrap().peer, addr(1000));

        drop(first);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list()[0].peer, addr(1001));

        drop(second);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_are_not_reused() {
        let registry = Arc::new(ConnectionRegistry::new());
        let id = registry.register(addr(1)).id();
        let next = registry.register(addr(1));
        assert!(next.id() > id);
    }
}
