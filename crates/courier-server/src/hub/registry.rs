//! Presence registry: which users currently hold a live connection.
//!
//! The map is mutated only by the hub actor. Everyone else gets read-only
//! access through [`Registry`], which may be queried concurrently with the
//! actor loop.

use courier_core::UserId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Hub-scoped identifier of one physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sending half of a connection's bounded outbound queue. Each item is one
/// encoded frame.
pub type Mailbox = mpsc::Sender<Arc<str>>;

/// A live connection as held by the hub.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub display_name: String,
    pub mailbox: Mailbox,
}

/// The user → connection map. At most one connection per user.
pub(crate) type ConnectionMap = HashMap<UserId, Connection>;

/// Read-only view of a hub's connections.
#[derive(Clone, Default)]
pub struct Registry {
    pub(crate) inner: Arc<RwLock<ConnectionMap>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether `user` currently has a live connection.
    pub async fn is_online(&self, user: UserId) -> bool {
        self.inner.read().await.contains_key(&user)
    }

    /// Snapshot of every online user.
    pub async fn online_users(&self) -> HashSet<UserId> {
        self.inner.read().await.keys().copied().collect()
    }

    /// Number of live connections.
    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// The connection currently registered for `user`, if any.
    pub async fn connection_id(&self, user: UserId) -> Option<ConnectionId> {
        self.inner.read().await.get(&user).map(|c| c.id)
    }
}
