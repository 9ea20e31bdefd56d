//! Connection hub: a single-owner actor mapping online users to their live
//! connection and fanning payloads out to their mailboxes.
//!
//! All mutation of the connection map happens inside [`Hub::run`], which
//! serially drains three bounded intake channels (register, unregister,
//! deliver). Presence queries read the same map through [`Registry`].
//!
//! Delivery never blocks the loop: each frame is offered to a mailbox with
//! `try_send`, and a full mailbox gets its connection evicted.

pub mod registry;
pub mod router;

pub use registry::{Connection, ConnectionId, Mailbox, Registry};
pub use router::Router;

use courier_core::{codec, CourierError, CourierResult, Frame, NotificationEvent, UserId};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A payload type a hub can route.
pub trait Payload: Serialize + Send + Sync + fmt::Debug + 'static {
    /// Short name used in logs.
    fn label(&self) -> &'static str;
}

impl Payload for Frame {
    fn label(&self) -> &'static str {
        self.kind()
    }
}

impl Payload for NotificationEvent {
    fn label(&self) -> &'static str {
        "notification"
    }
}

/// Who a delivery is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every listed user that is online.
    Users(Vec<UserId>),
    /// One specific connection; skipped if the user has since reconnected.
    Connection { user_id: UserId, id: ConnectionId },
}

impl Target {
    pub fn user(user_id: UserId) -> Self {
        Target::Users(vec![user_id])
    }
}

/// Outcome of one delivery, per recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Enqueued onto a live mailbox.
    pub delivered: Vec<UserId>,
    /// No live connection.
    pub offline: Vec<UserId>,
    /// Mailbox was full; the connection was dropped instead.
    pub evicted: Vec<UserId>,
}

impl DeliveryReport {
    /// Recipients that did not get the payload.
    pub fn undelivered(&self) -> impl Iterator<Item = UserId> + '_ {
        self.offline.iter().chain(self.evicted.iter()).copied()
    }

    pub fn was_delivered(&self, user: UserId) -> bool {
        self.delivered.contains(&user)
    }
}

/// A payload submitted to the hub.
pub struct Delivery<P> {
    pub target: Target,
    pub payload: P,
    pub reply: Option<oneshot::Sender<DeliveryReport>>,
}

struct Unregister {
    user_id: UserId,
    id: ConnectionId,
}

/// Capacities of a hub's channels.
#[derive(Debug, Clone, Copy)]
pub struct HubSettings {
    pub intake_capacity: usize,
    pub mailbox_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            intake_capacity: 256,
            mailbox_capacity: 256,
        }
    }
}

/// The hub actor. Constructed and started with [`Hub::spawn`].
pub struct Hub<P> {
    name: &'static str,
    registry: Registry,
    register_rx: mpsc::Receiver<Connection>,
    unregister_rx: mpsc::Receiver<Unregister>,
    deliver_rx: mpsc::Receiver<Delivery<P>>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl<P: Payload> Hub<P> {
    /// Start a hub task. It stops when `shutdown` fires or every handle is
    /// dropped.
    pub fn spawn(
        name: &'static str,
        settings: HubSettings,
        shutdown: broadcast::Receiver<()>,
    ) -> (HubHandle<P>, JoinHandle<()>) {
        let (register_tx, register_rx) = mpsc::channel(settings.intake_capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(settings.intake_capacity);
        let (deliver_tx, deliver_rx) = mpsc::channel(settings.intake_capacity);
        let registry = Registry::new();

        let hub = Hub {
            name,
            registry: registry.clone(),
            register_rx,
            unregister_rx,
            deliver_rx,
            shutdown_rx: shutdown,
        };
        let task = tokio::spawn(hub.run());

        let handle = HubHandle {
            name,
            register_tx,
            unregister_tx,
            deliver_tx,
            registry,
            next_id: Arc::new(AtomicU64::new(1)),
            mailbox_capacity: settings.mailbox_capacity,
        };
        (handle, task)
    }

    async fn run(mut self) {
        info!(hub = self.name, "hub started");
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!(hub = self.name, "hub shutting down");
                    break;
                }
                Some(conn) = self.register_rx.recv() => self.register(conn).await,
                Some(req) = self.unregister_rx.recv() => self.unregister(req).await,
                Some(delivery) = self.deliver_rx.recv() => self.deliver(delivery).await,
                else => break,
            }
        }

        // Dropping every entry drops the only sender of each mailbox.
        let mut map = self.registry.inner.write().await;
        let closed = map.len();
        map.clear();
        info!(hub = self.name, closed, "hub stopped");
    }

    async fn register(&mut self, conn: Connection) {
        let mut map = self.registry.inner.write().await;
        if let Some(previous) = map.remove(&conn.user_id) {
            info!(
                hub = self.name,
                user_id = %previous.user_id,
                conn_id = %previous.id,
                "superseded connection evicted"
            );
            drop(previous);
        }
        info!(
            hub = self.name,
            user_id = %conn.user_id,
            name = %conn.display_name,
            conn_id = %conn.id,
            online = map.len() + 1,
            "connection registered"
        );
        map.insert(conn.user_id, conn);
    }

    async fn unregister(&mut self, req: Unregister) {
        let mut map = self.registry.inner.write().await;
        match map.get(&req.user_id) {
            Some(current) if current.id == req.id => {
                map.remove(&req.user_id);
                info!(
                    hub = self.name,
                    user_id = %req.user_id,
                    conn_id = %req.id,
                    online = map.len(),
                    "connection unregistered"
                );
            }
            _ => {
                debug!(
                    hub = self.name,
                    user_id = %req.user_id,
                    conn_id = %req.id,
                    "unregister for inactive connection ignored"
                );
            }
        }
    }

    async fn deliver(&mut self, delivery: Delivery<P>) {
        let Delivery {
            target,
            payload,
            reply,
        } = delivery;

        let encoded: Arc<str> = match codec::encode(&payload) {
            Ok(text) => text.into(),
            Err(e) => {
                error!(hub = self.name, kind = payload.label(), error = %e, "failed to encode payload");
                if let Some(reply) = reply {
                    let _ = reply.send(DeliveryReport::default());
                }
                return;
            }
        };

        let mut report = DeliveryReport::default();
        let mut dead: Vec<(UserId, ConnectionId)> = Vec::new();
        {
            let map = self.registry.inner.read().await;
            let mut offer = |user: UserId, only: Option<ConnectionId>| {
                let conn = match map.get(&user) {
                    Some(conn) if only.map_or(true, |id| id == conn.id) => conn,
                    _ => {
                        report.offline.push(user);
                        return;
                    }
                };
                match conn.mailbox.try_send(encoded.clone()) {
                    Ok(()) => report.delivered.push(user),
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            hub = self.name,
                            user_id = %user,
                            conn_id = %conn.id,
                            "mailbox full, evicting slow connection"
                        );
                        report.evicted.push(user);
                        dead.push((user, conn.id));
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(hub = self.name, user_id = %user, conn_id = %conn.id, "mailbox closed");
                        report.offline.push(user);
                        dead.push((user, conn.id));
                    }
                }
            };
            match target {
                Target::Users(users) => {
                    for user in users {
                        offer(user, None);
                    }
                }
                Target::Connection { user_id, id } => offer(user_id, Some(id)),
            }
        }

        if !dead.is_empty() {
            let mut map = self.registry.inner.write().await;
            for (user, id) in dead {
                if map.get(&user).is_some_and(|c| c.id == id) {
                    map.remove(&user);
                }
            }
        }

        debug!(
            hub = self.name,
            kind = payload.label(),
            delivered = report.delivered.len(),
            offline = report.offline.len(),
            evicted = report.evicted.len(),
            "payload routed"
        );
        if let Some(reply) = reply {
            let _ = reply.send(report);
        }
    }
}

/// A registered connection's receiving side.
pub struct Attached {
    pub id: ConnectionId,
    pub outbound: mpsc::Receiver<Arc<str>>,
}

/// Cloneable handle for submitting work to a hub.
pub struct HubHandle<P> {
    name: &'static str,
    register_tx: mpsc::Sender<Connection>,
    unregister_tx: mpsc::Sender<Unregister>,
    deliver_tx: mpsc::Sender<Delivery<P>>,
    registry: Registry,
    next_id: Arc<AtomicU64>,
    mailbox_capacity: usize,
}

impl<P> Clone for HubHandle<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            register_tx: self.register_tx.clone(),
            unregister_tx: self.unregister_tx.clone(),
            deliver_tx: self.deliver_tx.clone(),
            registry: self.registry.clone(),
            next_id: self.next_id.clone(),
            mailbox_capacity: self.mailbox_capacity,
        }
    }
}

impl<P: Payload> HubHandle<P> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Read-only presence view.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Allocate a connection id unique within this hub.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a mailbox, register it for `user_id` and return the receiving
    /// side. Any previous connection of the same user is evicted.
    pub async fn attach(&self, user_id: UserId, display_name: &str) -> CourierResult<Attached> {
        let id = self.next_connection_id();
        let (mailbox, outbound) = mpsc::channel(self.mailbox_capacity);
        let conn = Connection {
            id,
            user_id,
            display_name: display_name.to_string(),
            mailbox,
        };
        self.register_tx
            .send(conn)
            .await
            .map_err(|_| CourierError::HubClosed)?;
        Ok(Attached { id, outbound })
    }

    /// Remove `id` if it is still the user's active connection.
    pub async fn unregister(&self, user_id: UserId, id: ConnectionId) -> CourierResult<()> {
        self.unregister_tx
            .send(Unregister { user_id, id })
            .await
            .map_err(|_| CourierError::HubClosed)
    }

    /// Submit a payload without waiting for the outcome.
    pub async fn push(&self, target: Target, payload: P) -> CourierResult<()> {
        self.deliver_tx
            .send(Delivery {
                target,
                payload,
                reply: None,
            })
            .await
            .map_err(|_| CourierError::HubClosed)
    }

    /// Submit a payload and wait until the hub has offered it to every
    /// recipient.
    pub async fn deliver(&self, target: Target, payload: P) -> CourierResult<DeliveryReport> {
        let (reply, outcome) = oneshot::channel();
        self.deliver_tx
            .send(Delivery {
                target,
                payload,
                reply: Some(reply),
            })
            .await
            .map_err(|_| CourierError::HubClosed)?;
        outcome.await.map_err(|_| CourierError::HubClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{DirectMessage, GroupId, Typing};
    use std::time::Duration;

    fn hub(mailbox_capacity: usize) -> (HubHandle<Frame>, JoinHandle<()>, broadcast::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let settings = HubSettings {
            intake_capacity: 16,
            mailbox_capacity,
        };
        let (handle, task) = Hub::spawn("test", settings, shutdown_rx);
        (handle, task, shutdown_tx)
    }

    fn direct(to: i64, content: &str) -> Frame {
        Frame::Direct(DirectMessage {
            sender_id: UserId(1),
            receiver_id: UserId(to),
            content: content.to_string(),
            ..Default::default()
        })
    }

    /// Waits until every previously submitted intake item was processed.
    async fn settle(handle: &HubHandle<Frame>) {
        handle.deliver(Target::Users(vec![]), Frame::Ping).await.unwrap();
    }

    #[tokio::test]
    async fn test_delivers_to_online_user() {
        let (handle, _task, _shutdown) = hub(8);
        let mut bob = handle.attach(UserId(2), "bob").await.unwrap();

        let report = handle.deliver(Target::user(UserId(2)), direct(2, "hi")).await.unwrap();
        assert_eq!(report.delivered, vec![UserId(2)]);

        let text = bob.outbound.recv().await.unwrap();
        let frame: Frame = serde_json::from_str(&text).unwrap();
        assert_eq!(frame, direct(2, "hi"));
        assert!(handle.registry().is_online(UserId(2)).await);
    }

    #[tokio::test]
    async fn test_second_connection_evicts_first() {
        let (handle, _task, _shutdown) = hub(8);
        let mut first = handle.attach(UserId(2), "bob").await.unwrap();
        let mut second = handle.attach(UserId(2), "bob").await.unwrap();
        settle(&handle).await;

        // the evicted mailbox is closed
        assert!(first.outbound.recv().await.is_none());
        assert_eq!(handle.registry().connection_id(UserId(2)).await, Some(second.id));

        handle.push(Target::user(UserId(2)), direct(2, "after")).await.unwrap();
        assert!(second.outbound.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let (handle, _task, _shutdown) = hub(8);
        let mut conn = handle.attach(UserId(3), "carol").await.unwrap();
        handle.unregister(UserId(3), conn.id).await.unwrap();
        handle.unregister(UserId(3), conn.id).await.unwrap();
        settle(&handle).await;

        assert!(!handle.registry().is_online(UserId(3)).await);
        assert!(conn.outbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stale_unregister_keeps_newer_connection() {
        let (handle, _task, _shutdown) = hub(8);
        let old = handle.attach(UserId(4), "dave").await.unwrap();
        let new = handle.attach(UserId(4), "dave").await.unwrap();
        handle.unregister(UserId(4), old.id).await.unwrap();
        settle(&handle).await;

        assert_eq!(handle.registry().connection_id(UserId(4)).await, Some(new.id));
    }

    #[tokio::test]
    async fn test_full_mailbox_evicts_connection() {
        let (handle, _task, _shutdown) = hub(1);
        let mut slow = handle.attach(UserId(5), "slow").await.unwrap();

        let first = handle.deliver(Target::user(UserId(5)), direct(5, "one")).await.unwrap();
        assert_eq!(first.delivered, vec![UserId(5)]);
        let second = handle.deliver(Target::user(UserId(5)), direct(5, "two")).await.unwrap();
        assert_eq!(second.evicted, vec![UserId(5)]);
        assert_eq!(second.undelivered().collect::<Vec<_>>(), vec![UserId(5)]);

        assert!(!handle.registry().is_online(UserId(5)).await);
        // the queued frame drains, then the mailbox reports closed
        assert!(slow.outbound.recv().await.is_some());
        assert!(slow.outbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_offline_recipient_is_reported() {
        let (handle, _task, _shutdown) = hub(8);
        let report = handle.deliver(Target::user(UserId(9)), direct(9, "anyone?")).await.unwrap();
        assert!(report.delivered.is_empty());
        assert_eq!(report.offline, vec![UserId(9)]);
    }

    #[tokio::test]
    async fn test_connection_target_skips_replaced_connection() {
        let (handle, _task, _shutdown) = hub(8);
        let old = handle.attach(UserId(6), "erin").await.unwrap();
        let _new = handle.attach(UserId(6), "erin").await.unwrap();
        let report = handle
            .deliver(
                Target::Connection {
                    user_id: UserId(6),
                    id: old.id,
                },
                Frame::error("late reply"),
            )
            .await
            .unwrap();
        assert_eq!(report.offline, vec![UserId(6)]);
    }

    #[tokio::test]
    async fn test_per_recipient_order_is_preserved() {
        let (handle, _task, _shutdown) = hub(64);
        let mut conn = handle.attach(UserId(7), "frank").await.unwrap();
        for i in 0..20 {
            handle
                .push(Target::user(UserId(7)), direct(7, &format!("m{i}")))
                .await
                .unwrap();
        }
        for i in 0..20 {
            let text = conn.outbound.recv().await.unwrap();
            let frame: Frame = serde_json::from_str(&text).unwrap();
            assert_eq!(frame, direct(7, &format!("m{i}")));
        }
    }

    #[tokio::test]
    async fn test_group_fanout_encodes_once_for_all() {
        let (handle, _task, _shutdown) = hub(8);
        let mut a = handle.attach(UserId(1), "a").await.unwrap();
        let mut b = handle.attach(UserId(2), "b").await.unwrap();
        let typing = Frame::Typing(Typing {
            sender_id: UserId(3),
            group_id: Some(GroupId(1)),
            ..Default::default()
        });
        let report = handle
            .deliver(Target::Users(vec![UserId(1), UserId(2), UserId(3)]), typing)
            .await
            .unwrap();
        assert_eq!(report.delivered, vec![UserId(1), UserId(2)]);
        assert_eq!(report.offline, vec![UserId(3)]);

        let from_a = a.outbound.recv().await.unwrap();
        let from_b = b.outbound.recv().await.unwrap();
        assert!(Arc::ptr_eq(&from_a, &from_b));
    }

    #[tokio::test]
    async fn test_shutdown_closes_every_mailbox() {
        let (handle, task, shutdown) = hub(8);
        let mut a = handle.attach(UserId(1), "a").await.unwrap();
        let mut b = handle.attach(UserId(2), "b").await.unwrap();
        settle(&handle).await;

        shutdown.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert!(a.outbound.recv().await.is_none());
        assert!(b.outbound.recv().await.is_none());
        assert!(matches!(
            handle.push(Target::user(UserId(1)), Frame::Ping).await,
            Err(CourierError::HubClosed)
        ));
    }
}
