//! Connection pool: all registered connections indexed by id.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{Connection, ConnectionId};

/// Thread-safe map of live connections.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    by_id: DashMap<ConnectionId, Arc<Connection>>,
}

impl ConnectionPool {
    /// Creates a new empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a connection. Returns `false` if the id is already taken.
    pub fn add(&self, connection: Arc<Connection>) -> bool {
        match self.by_id.entry(connection.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(connection);
                true
            }
        }
    }

    /// Removes a connection.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.by_id.remove(id).map(|(_, conn)| conn)
    }

    /// Removes a connection and closes its transport.
    ///
    /// Returns `None` if it was already gone.
    pub fn evict(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let conn = self.remove(id)?;
        conn.close();
        Some(conn)
    }

    /// Removes a connection only if `predicate` holds, atomically with
    /// respect to other pool mutations on the same id.
    pub fn remove_if(
        &self,
        id: &ConnectionId,
        predicate: impl FnOnce(&Connection) -> bool,
    ) -> Option<Arc<Connection>> {
        self.by_id
            .remove_if(id, |_, conn| predicate(conn))
            .map(|(_, conn)| conn)
    }

    /// Looks up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.by_id.get(id).map(|entry| entry.value().clone())
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    /// Snapshot of every connection.
    ///
    /// Callers iterate the snapshot, never the map, so evictions during
    /// iteration cannot deadlock a shard.
    pub fn all_connections(&self) -> Vec<Arc<Connection>> {
        self.by_id.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Snapshot of every connection id.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.by_id.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of connections per subscribed topic.
    pub fn subscription_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for conn in self.all_connections() {
            for topic in conn.subscriptions() {
                *counts.entry(topic).or_insert(0) += 1;
            }
        }
        counts
    }
}
