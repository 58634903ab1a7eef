use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

/// Identity of one live gateway connection. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An event serialized once and shared by every connection it goes to.
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    pub name: &'static str,
    pub json: Arc<str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection buffer is full")]
    Full,
    #[error("connection is closed")]
    Closed,
}

/// The write side of a live connection.
///
/// `try_deliver` must return immediately. A stalled connection reports
/// `Full` instead of holding up the caller.
pub trait ConnectionSink: Send + Sync {
    fn try_deliver(&self, event: OutboundEvent) -> Result<(), DeliveryError>;
}

impl ConnectionSink for mpsc::Sender<OutboundEvent> {
    fn try_deliver(&self, event: OutboundEvent) -> Result<(), DeliveryError> {
        self.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

struct Entry {
    user_id: Uuid,
    sink: Arc<dyn ConnectionSink>,
}

#[derive(Default)]
struct RegistryState {
    /// user_id -> live connection ids. Empty sets are pruned.
    by_user: HashMap<Uuid, HashSet<ConnectionId>>,
    /// conn_id -> owner and sink. Source of truth for ownership.
    connections: HashMap<ConnectionId, Entry>,
}

/// Tracks which live connections belong to which user.
///
/// Cheap to clone; clones share state. Absence is never an error: unknown
/// users have no connections and unknown connections deregister as a no-op.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `conn_id` to `user_id`.
    ///
    /// Registering the same pair again changes nothing (the original sink is
    /// kept). A connection id held by another user moves to `user_id`.
    pub async fn register(&self, user_id: Uuid, conn_id: ConnectionId, sink: Arc<dyn ConnectionSink>) {
        let mut state = self.state.write().await;

        match state.connections.get(&conn_id).map(|e| e.user_id) {
            Some(owner) if owner == user_id => return,
            Some(owner) => {
                debug!("Connection {} moved from {} to {}", conn_id, owner, user_id);
                detach(&mut state.by_user, owner, conn_id);
            }
            None => {}
        }

        state.connections.insert(conn_id, Entry { user_id, sink });
        state.by_user.entry(user_id).or_default().insert(conn_id);
    }

    /// Remove a connection from whichever user owns it.
    /// Returns the former owner, or `None` if the id was unknown.
    pub async fn deregister(&self, conn_id: ConnectionId) -> Option<Uuid> {
        let mut state = self.state.write().await;
        let entry = state.connections.remove(&conn_id)?;
        detach(&mut state.by_user, entry.user_id, conn_id);
        Some(entry.user_id)
    }

    /// Snapshot of the user's connection ids, sorted.
    pub async fn connections_of(&self, user_id: Uuid) -> Vec<ConnectionId> {
        let state = self.state.read().await;
        let mut ids: Vec<ConnectionId> = state
            .by_user
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.state.read().await.by_user.contains_key(&user_id)
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.state.read().await.by_user.keys().copied().collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Sinks of every connection of `user_ids`, taken under one read lock.
    pub(crate) async fn sinks_for(&self, user_ids: &[Uuid]) -> Vec<(Uuid, ConnectionId, Arc<dyn ConnectionSink>)> {
        let state = self.state.read().await;
        let mut out = Vec::new();
        for user_id in user_ids {
            let Some(conns) = state.by_user.get(user_id) else {
                continue;
            };
            for conn_id in conns {
                if let Some(entry) = state.connections.get(conn_id) {
                    out.push((*user_id, *conn_id, entry.sink.clone()));
                }
            }
        }
        out
    }
}

fn detach(by_user: &mut HashMap<Uuid, HashSet<ConnectionId>>, user_id: Uuid, conn_id: ConnectionId) {
    if let Some(set) = by_user.get_mut(&user_id) {
        set.remove(&conn_id);
        if set.is_empty() {
            by_user.remove(&user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> Arc<dyn ConnectionSink> {
        let (tx, _rx) = mpsc::channel::<OutboundEvent>(1);
        Arc::new(tx)
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let conn = ConnectionId::new();

        registry.register(user, conn, sink()).await;
        registry.register(user, conn, sink()).await;

        assert_eq!(registry.connections_of(user).await, vec![conn]);
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn deregister_removes_regardless_of_repeat_registers() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let keep = ConnectionId::new();
        let stale = ConnectionId::new();

        registry.register(user, keep, sink()).await;
        for _ in 0..3 {
            registry.register(user, stale, sink()).await;
        }

        assert_eq!(registry.deregister(stale).await, Some(user));
        assert_eq!(registry.connections_of(user).await, vec![keep]);

        assert_eq!(registry.deregister(keep).await, Some(user));
        assert!(registry.connections_of(user).await.is_empty());
        assert!(!registry.is_online(user).await);
    }

    #[tokio::test]
    async fn unknown_ids_are_silent() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.deregister(ConnectionId::new()).await, None);
        assert!(registry.connections_of(Uuid::new_v4()).await.is_empty());
        assert!(registry.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn connection_has_a_single_owner() {
        let registry = ConnectionRegistry::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let conn = ConnectionId::new();

        registry.register(alice, conn, sink()).await;
        registry.register(bob, conn, sink()).await;

        assert!(registry.connections_of(alice).await.is_empty());
        assert_eq!(registry.connections_of(bob).await, vec![conn]);

        // Keyed by connection id, not by a possibly stale user.
        assert_eq!(registry.deregister(conn).await, Some(bob));
        assert!(registry.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_later_changes() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let conn = ConnectionId::new();
        registry.register(user, conn, sink()).await;

        let snapshot = registry.connections_of(user).await;
        registry.deregister(conn).await;

        assert_eq!(snapshot, vec![conn]);
        assert!(registry.connections_of(user).await.is_empty());
    }
}
