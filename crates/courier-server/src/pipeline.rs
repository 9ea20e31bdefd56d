//! Inbound chat frame handling.
//!
//! One function per frame type, each following the same order: validate,
//! check permission, persist, route, notify. A failure at any step ends the
//! frame with a [`Rejection`] sent back to the originating connection; a
//! frame that was not persisted is never routed.

use crate::connection::{InboundHandler, Origin};
use crate::hub::Router;
use crate::notify::{self, NotificationRequest, Notifier};
use crate::policy::PermissionEvaluator;
use crate::store::{MessageStore, NewMessage};
use async_trait::async_trait;
use chrono::Utc;
use courier_core::{
    codec, validate_content, validate_image_path, ContactList, CourierError, DirectMessage, Frame,
    GroupId, GroupMessage, ReadReceipt, Typing, UserId,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Client-visible reason a frame was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection(pub String);

impl Rejection {
    fn new(reason: &str) -> Self {
        Rejection(reason.to_string())
    }
}

impl From<CourierError> for Rejection {
    fn from(e: CourierError) -> Self {
        Rejection(e.client_message())
    }
}

/// Processes chat frames from authenticated connections.
pub struct ChatPipeline {
    router: Router,
    store: Arc<dyn MessageStore>,
    policy: PermissionEvaluator,
    notifier: Arc<dyn Notifier>,
    max_frame_bytes: usize,
}

impl ChatPipeline {
    pub fn new(
        router: Router,
        store: Arc<dyn MessageStore>,
        policy: PermissionEvaluator,
        notifier: Arc<dyn Notifier>,
        max_frame_bytes: usize,
    ) -> Self {
        Self {
            router,
            store,
            policy,
            notifier,
            max_frame_bytes,
        }
    }

    /// Dispatch one decoded frame by type.
    pub async fn handle(&self, origin: &Origin, frame: Frame) -> Result<(), Rejection> {
        match frame {
            Frame::Direct(msg) => self.direct_message(origin, msg).await,
            Frame::Group(msg) => self.group_message(origin, msg).await,
            Frame::Typing(typing) => {
                self.typing(origin, typing).await;
                Ok(())
            }
            Frame::Read(receipt) => self.read_receipt(origin, receipt).await,
            Frame::Contacts(request) if request.contacts.is_empty() => self.contacts(origin).await,
            Frame::Ping => Ok(()),
            other => Err(Rejection(format!(
                "Unsupported frame type: {}",
                other.kind()
            ))),
        }
    }

    async fn direct_message(&self, origin: &Origin, msg: DirectMessage) -> Result<(), Rejection> {
        let sender = origin.user_id;
        let receiver = msg.receiver_id;
        if receiver == sender {
            return Err(CourierError::PermissionDenied(
                "You cannot send messages to yourself".into(),
            )
            .into());
        }

        let image_path = msg.image_path.filter(|p| !p.is_empty());
        if let Some(path) = &image_path {
            validate_image_path(path)?;
        }
        let content = validate_content(&msg.content, image_path.is_some())?;

        match self.policy.can_deliver(sender, receiver).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(sender = %sender, receiver = %receiver, "direct message denied");
                return Err(CourierError::PermissionDenied(
                    "You cannot send messages to this user".into(),
                )
                .into());
            }
            Err(e) => {
                warn!(sender = %sender, receiver = %receiver, error = %e, "permission check failed");
                return Err(Rejection::new("Failed to check chat permissions"));
            }
        }

        let message_id = self
            .store
            .save_message(NewMessage {
                sender,
                receiver,
                content: content.clone(),
                image_path: image_path.clone(),
            })
            .await
            .map_err(|e| {
                warn!(sender = %sender, receiver = %receiver, error = %e, "failed to save message");
                Rejection::new("Failed to save message")
            })?;

        let mut frame = Frame::Direct(DirectMessage {
            message_id: Some(message_id),
            sender_id: sender,
            receiver_id: receiver,
            content,
            image_path,
            timestamp: None,
        });
        frame.stamp(sender, Utc::now());

        let delivered = match self.router.direct(receiver, frame.clone()).await {
            Ok(report) => report.was_delivered(receiver),
            Err(e) => {
                warn!(receiver = %receiver, error = %e, "direct routing failed");
                false
            }
        };
        if !delivered {
            notify::dispatch(
                &self.notifier,
                NotificationRequest::new_message(receiver, message_id, &origin.display_name),
            );
        }

        debug!(sender = %sender, receiver = %receiver, message_id = %message_id, delivered, "direct message stored");
        self.confirm(origin, frame).await;
        Ok(())
    }

    async fn group_message(&self, origin: &Origin, msg: GroupMessage) -> Result<(), Rejection> {
        let sender = origin.user_id;
        let group = msg.group_id;
        let image_path = msg.image_path.filter(|p| !p.is_empty());
        if let Some(path) = &image_path {
            validate_image_path(path)?;
        }
        let content = validate_content(&msg.content, image_path.is_some())?;

        match self.store.is_group_member(group, sender).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(CourierError::PermissionDenied(
                    "You are not a member of this group".into(),
                )
                .into())
            }
            Err(e) => {
                warn!(sender = %sender, group_id = %group, error = %e, "membership check failed");
                return Err(Rejection::new("Failed to verify group membership"));
            }
        }

        let message_id = self
            .store
            .save_group_message(group, sender, &content)
            .await
            .map_err(|e| {
                warn!(sender = %sender, group_id = %group, error = %e, "failed to save group message");
                Rejection::new("Failed to save message")
            })?;

        let mut frame = Frame::Group(GroupMessage {
            message_id: Some(message_id),
            sender_id: sender,
            group_id: group,
            content,
            image_path,
            timestamp: None,
        });
        frame.stamp(sender, Utc::now());

        if let Err(e) = self
            .router
            .group(sender, &origin.display_name, group, frame)
            .await
        {
            warn!(group_id = %group, message_id = %message_id, error = %e, "group routing failed");
        }
        Ok(())
    }

    /// Typing indicators are best-effort: any refusal is dropped silently.
    async fn typing(&self, origin: &Origin, typing: Typing) {
        let sender = origin.user_id;
        match (typing.receiver_id, typing.group_id) {
            (Some(receiver), None) if receiver != sender => {
                if !matches!(self.policy.can_deliver(sender, receiver).await, Ok(true)) {
                    debug!(sender = %sender, receiver = %receiver, "typing indicator dropped");
                    return;
                }
                let mut frame = Frame::Typing(Typing {
                    receiver_id: Some(receiver),
                    ..Default::default()
                });
                frame.stamp(sender, Utc::now());
                if let Err(e) = self.router.direct(receiver, frame).await {
                    debug!(error = %e, "typing indicator not routed");
                }
            }
            (None, Some(group)) => self.group_typing(origin, group).await,
            _ => debug!(sender = %sender, "typing indicator without a single target dropped"),
        }
    }

    async fn group_typing(&self, origin: &Origin, group: GroupId) {
        let sender = origin.user_id;
        if !matches!(self.store.is_group_member(group, sender).await, Ok(true)) {
            debug!(sender = %sender, group_id = %group, "group typing indicator dropped");
            return;
        }
        let mut frame = Frame::Typing(Typing {
            group_id: Some(group),
            ..Default::default()
        });
        frame.stamp(sender, Utc::now());
        if let Err(e) = self
            .router
            .group(sender, &origin.display_name, group, frame)
            .await
        {
            debug!(error = %e, "group typing indicator not routed");
        }
    }

    /// `receipt.receiver_id` is the peer whose messages the reader has seen.
    async fn read_receipt(&self, origin: &Origin, receipt: ReadReceipt) -> Result<(), Rejection> {
        let reader = origin.user_id;
        let peer: UserId = receipt.receiver_id;
        if peer == reader {
            return Ok(());
        }

        let marked = self.store.mark_read(peer, reader).await.map_err(|e| {
            warn!(reader = %reader, peer = %peer, error = %e, "failed to mark messages read");
            Rejection::new("Failed to mark messages as read")
        })?;

        debug!(reader = %reader, peer = %peer, marked, "messages marked read");
        if marked == 0 {
            return Ok(());
        }

        let mut frame = Frame::Read(ReadReceipt {
            receiver_id: peer,
            ..Default::default()
        });
        frame.stamp(reader, Utc::now());
        if let Err(e) = self.router.direct(peer, frame).await {
            debug!(error = %e, "read receipt not routed");
        }
        Ok(())
    }

    async fn contacts(&self, origin: &Origin) -> Result<(), Rejection> {
        let online = self.router.hub().registry().online_users().await;
        let contacts = self
            .policy
            .list_eligible_contacts(origin.user_id, &online)
            .await
            .map_err(|e| {
                warn!(user_id = %origin.user_id, error = %e, "failed to list contacts");
                Rejection::new("Failed to load contacts")
            })?;
        let mut frame = Frame::Contacts(ContactList {
            contacts,
            timestamp: None,
        });
        frame.stamp(origin.user_id, Utc::now());
        self.confirm(origin, frame).await;
        Ok(())
    }

    /// Send a frame back to the originating connection only.
    async fn confirm(&self, origin: &Origin, frame: Frame) {
        if let Err(e) = self
            .router
            .reply(origin.user_id, origin.connection, frame)
            .await
        {
            debug!(conn_id = %origin.connection, error = %e, "reply not sent");
        }
    }
}

#[async_trait]
impl InboundHandler for ChatPipeline {
    async fn on_text(&self, origin: &Origin, text: &str) {
        let frame = match codec::decode_frame(text, self.max_frame_bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(user_id = %origin.user_id, conn_id = %origin.connection, error = %e, "malformed frame skipped");
                return;
            }
        };
        let kind = frame.kind();
        if let Err(Rejection(reason)) = self.handle(origin, frame).await {
            warn!(user_id = %origin.user_id, kind, reason = %reason, "frame rejected");
            self.confirm(origin, Frame::error(reason)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{Attached, Hub, HubHandle, HubSettings, Target};
    use crate::store::{FollowStatus, MembershipStatus, MemoryStore, Visibility};
    use courier_core::CourierResult;
    use std::time::Duration;
    use tokio::sync::{broadcast, mpsc};

    struct Recorder(mpsc::UnboundedSender<NotificationRequest>);

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, request: NotificationRequest) -> CourierResult<()> {
            let _ = self.0.send(request);
            Ok(())
        }
    }

    struct Fixture {
        pipeline: ChatPipeline,
        hub: HubHandle<Frame>,
        store: Arc<MemoryStore>,
        notified: mpsc::UnboundedReceiver<NotificationRequest>,
        _shutdown: broadcast::Sender<()>,
    }

    async fn fixture() -> Fixture {
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let (hub, _) = Hub::<Frame>::spawn("chat", HubSettings::default(), shutdown_rx);
        let store = Arc::new(MemoryStore::new());
        store.add_user(UserId(1), "alice", Some("Alice"), Visibility::Public).await;
        store.add_user(UserId(2), "bob", None, Visibility::Public).await;
        store.add_user(UserId(3), "carol", None, Visibility::Private).await;
        store.add_user(UserId(4), "dave", None, Visibility::Public).await;

        let (tx, notified) = mpsc::unbounded_channel();
        let notifier: Arc<dyn Notifier> = Arc::new(Recorder(tx));
        let router = Router::new(hub.clone(), store.clone(), notifier.clone());
        let policy = PermissionEvaluator::new(store.clone(), chrono::Duration::days(30));
        let pipeline = ChatPipeline::new(router, store.clone(), policy, notifier, 64 * 1024);
        Fixture {
            pipeline,
            hub,
            store,
            notified,
            _shutdown: shutdown,
        }
    }

    impl Fixture {
        async fn connect(&self, user: i64, name: &str) -> (Origin, Attached) {
            let attached = self.hub.attach(UserId(user), name).await.unwrap();
            let origin = Origin {
                user_id: UserId(user),
                display_name: name.to_string(),
                connection: attached.id,
            };
            (origin, attached)
        }

        async fn send(&self, origin: &Origin, text: &str) {
            self.pipeline.on_text(origin, text).await;
            self.hub.deliver(Target::Users(vec![]), Frame::Ping).await.unwrap();
        }

        async fn next_notification(&mut self) -> Option<NotificationRequest> {
            tokio::time::timeout(Duration::from_millis(200), self.notified.recv())
                .await
                .ok()
                .flatten()
        }
    }

    fn next_frame(conn: &mut Attached) -> Option<Frame> {
        conn.outbound
            .try_recv()
            .ok()
            .map(|text| serde_json::from_str(&text).unwrap())
    }

    fn error_text(frame: Option<Frame>) -> String {
        match frame {
            Some(Frame::Error(e)) => e.error,
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_follower_messages_public_profile() {
        let f = fixture().await;
        f.store.follow(UserId(2), UserId(1), FollowStatus::Accepted).await;
        let (bob, mut bob_conn) = f.connect(2, "bob").await;
        let (_alice, mut alice_conn) = f.connect(1, "alice").await;

        f.send(&bob, r#"{"type":"message","receiver_id":1,"sender_id":99,"content":"hi"}"#)
            .await;

        let stored = f.store.messages().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sender, UserId(2));

        let received = next_frame(&mut alice_conn).unwrap();
        let confirmation = next_frame(&mut bob_conn).unwrap();
        assert_eq!(received, confirmation);
        match received {
            Frame::Direct(m) => {
                assert_eq!(m.message_id, Some(stored[0].id));
                assert_eq!(m.sender_id, UserId(2));
                assert_eq!(m.content, "hi");
                assert!(m.timestamp.is_some());
            }
            other => panic!("unexpected frame {other:?}"),
        }
        // no echo besides the confirmation
        assert!(next_frame(&mut bob_conn).is_none());
    }

    #[tokio::test]
    async fn test_one_way_follow_of_private_profile_is_refused() {
        let mut f = fixture().await;
        f.store.follow(UserId(4), UserId(3), FollowStatus::Accepted).await;
        let (dave, mut dave_conn) = f.connect(4, "dave").await;
        let (_carol, mut carol_conn) = f.connect(3, "carol").await;

        f.send(&dave, r#"{"type":"message","receiver_id":3,"content":"hey"}"#).await;

        assert_eq!(
            error_text(next_frame(&mut dave_conn)),
            "You cannot send messages to this user"
        );
        assert!(next_frame(&mut carol_conn).is_none());
        assert!(f.store.messages().await.is_empty());
        assert!(f.next_notification().await.is_none());
    }

    #[tokio::test]
    async fn test_overlong_content_is_rejected_before_permission() {
        let f = fixture().await;
        let (dave, mut dave_conn) = f.connect(4, "dave").await;
        let text = serde_json::json!({
            "type": "message",
            "receiver_id": 3,
            "content": "x".repeat(501),
        })
        .to_string();

        f.send(&dave, &text).await;

        assert_eq!(
            error_text(next_frame(&mut dave_conn)),
            "content: Message exceeds maximum length of 500 characters"
        );
        assert!(f.store.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_self_message_is_usage_error() {
        let f = fixture().await;
        let (alice, mut conn) = f.connect(1, "alice").await;
        f.send(&alice, r#"{"type":"message","receiver_id":1,"content":"me"}"#).await;
        assert_eq!(
            error_text(next_frame(&mut conn)),
            "You cannot send messages to yourself"
        );
    }

    #[tokio::test]
    async fn test_offline_recipient_gets_notification() {
        let mut f = fixture().await;
        f.store.follow(UserId(2), UserId(1), FollowStatus::Accepted).await;
        let (bob, mut bob_conn) = f.connect(2, "bob").await;

        f.send(&bob, r#"{"type":"message","receiver_id":1,"content":"are you there?"}"#)
            .await;

        assert!(matches!(next_frame(&mut bob_conn), Some(Frame::Direct(_))));
        let request = f.next_notification().await.unwrap();
        assert_eq!(request.user_id, UserId(1));
        assert_eq!(request.content, "New message from bob");
        assert_eq!(request.related_id, f.store.messages().await[0].id.0);
    }

    #[tokio::test]
    async fn test_store_failure_blocks_routing() {
        let mut f = fixture().await;
        f.store.follow(UserId(2), UserId(1), FollowStatus::Accepted).await;
        f.store.set_fail_writes(true);
        let (bob, mut bob_conn) = f.connect(2, "bob").await;
        let (_alice, mut alice_conn) = f.connect(1, "alice").await;

        f.send(&bob, r#"{"type":"message","receiver_id":1,"content":"lost"}"#).await;

        assert_eq!(error_text(next_frame(&mut bob_conn)), "Failed to save message");
        assert!(next_frame(&mut alice_conn).is_none());
        assert!(f.next_notification().await.is_none());
    }

    #[tokio::test]
    async fn test_image_only_message() {
        let f = fixture().await;
        f.store.follow(UserId(2), UserId(1), FollowStatus::Accepted).await;
        let (bob, mut bob_conn) = f.connect(2, "bob").await;

        f.send(
            &bob,
            r#"{"type":"message","receiver_id":1,"content":"  ","image_path":"/uploads/cat.png"}"#,
        )
        .await;

        match next_frame(&mut bob_conn) {
            Some(Frame::Direct(m)) => {
                assert_eq!(m.content, "");
                assert_eq!(m.image_path.as_deref(), Some("/uploads/cat.png"));
            }
            other => panic!("unexpected frame {other:?}"),
        }

        f.send(
            &bob,
            r#"{"type":"message","receiver_id":1,"content":"x","image_path":"../secret"}"#,
        )
        .await;
        assert_eq!(
            error_text(next_frame(&mut bob_conn)),
            "image_path: Invalid image path"
        );
    }

    #[tokio::test]
    async fn test_group_message_scenario() {
        let mut f = fixture().await;
        for member in [1, 2, 3] {
            f.store
                .add_group_member(GroupId(5), UserId(member), MembershipStatus::Accepted)
                .await;
        }
        let (alice, mut alice_conn) = f.connect(1, "alice").await;
        let (_bob, mut bob_conn) = f.connect(2, "bob").await;

        f.send(&alice, r#"{"type":"group_message","group_id":5,"content":"standup?"}"#)
            .await;

        assert_eq!(f.store.group_messages().await.len(), 1);
        assert!(matches!(next_frame(&mut bob_conn), Some(Frame::Group(_))));
        assert!(matches!(next_frame(&mut alice_conn), Some(Frame::Group(_))));

        let request = f.next_notification().await.unwrap();
        assert_eq!(request.user_id, UserId(3));
        assert_eq!(request.content, "alice sent a message in group chat");
        assert!(f.next_notification().await.is_none());
    }

    #[tokio::test]
    async fn test_non_member_cannot_post_to_group() {
        let f = fixture().await;
        f.store
            .add_group_member(GroupId(5), UserId(4), MembershipStatus::Invited)
            .await;
        let (dave, mut conn) = f.connect(4, "dave").await;
        f.send(&dave, r#"{"type":"group_message","group_id":5,"content":"let me in"}"#)
            .await;
        assert_eq!(
            error_text(next_frame(&mut conn)),
            "You are not a member of this group"
        );
        assert!(f.store.group_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_typing_is_forwarded_or_dropped_silently() {
        let f = fixture().await;
        f.store.follow(UserId(2), UserId(1), FollowStatus::Accepted).await;
        let (bob, mut bob_conn) = f.connect(2, "bob").await;
        let (alice, mut alice_conn) = f.connect(1, "alice").await;

        f.send(&bob, r#"{"type":"typing","receiver_id":1}"#).await;
        match next_frame(&mut alice_conn) {
            Some(Frame::Typing(t)) => assert_eq!(t.sender_id, UserId(2)),
            other => panic!("unexpected frame {other:?}"),
        }

        // alice does not follow bob and they have no history
        f.send(&alice, r#"{"type":"typing","receiver_id":2}"#).await;
        assert!(next_frame(&mut bob_conn).is_none());
        assert!(next_frame(&mut alice_conn).is_none());
    }

    #[tokio::test]
    async fn test_read_receipt_marks_and_forwards() {
        let f = fixture().await;
        f.store
            .insert_message_at(UserId(2), UserId(1), "hello", Utc::now())
            .await;
        let (alice, _alice_conn) = f.connect(1, "alice").await;
        let (_bob, mut bob_conn) = f.connect(2, "bob").await;

        f.send(&alice, r#"{"type":"read","receiver_id":2}"#).await;

        assert!(f.store.messages().await.iter().all(|m| m.is_read));
        match next_frame(&mut bob_conn) {
            Some(Frame::Read(r)) => {
                assert_eq!(r.sender_id, UserId(1));
                assert_eq!(r.receiver_id, UserId(2));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_receipt_without_unread_messages_is_not_forwarded() {
        let f = fixture().await;
        let (dave, _dave_conn) = f.connect(4, "dave").await;
        let (_carol, mut carol_conn) = f.connect(3, "carol").await;

        // no conversation between dave and carol
        f.send(&dave, r#"{"type":"read","receiver_id":3}"#).await;
        assert!(next_frame(&mut carol_conn).is_none());

        // a second receipt after everything is read stays local as well
        f.store
            .insert_message_at(UserId(3), UserId(4), "hi", Utc::now())
            .await;
        f.send(&dave, r#"{"type":"read","receiver_id":3}"#).await;
        assert!(matches!(next_frame(&mut carol_conn), Some(Frame::Read(_))));
        f.send(&dave, r#"{"type":"read","receiver_id":3}"#).await;
        assert!(next_frame(&mut carol_conn).is_none());
    }

    #[tokio::test]
    async fn test_image_only_group_message() {
        let f = fixture().await;
        for member in [1, 2] {
            f.store
                .add_group_member(GroupId(5), UserId(member), MembershipStatus::Accepted)
                .await;
        }
        let (alice, mut alice_conn) = f.connect(1, "alice").await;
        let (_bob, mut bob_conn) = f.connect(2, "bob").await;

        f.send(
            &alice,
            r#"{"type":"group_message","group_id":5,"content":"","image_path":"/uploads/board.png"}"#,
        )
        .await;
        match next_frame(&mut bob_conn) {
            Some(Frame::Group(m)) => {
                assert_eq!(m.content, "");
                assert_eq!(m.image_path.as_deref(), Some("/uploads/board.png"));
            }
            other => panic!("unexpected frame {other:?}"),
        }
        assert!(matches!(next_frame(&mut alice_conn), Some(Frame::Group(_))));
        assert_eq!(f.store.group_messages().await.len(), 1);

        // without an image, empty content is still refused
        f.send(&alice, r#"{"type":"group_message","group_id":5,"content":""}"#)
            .await;
        assert!(error_text(next_frame(&mut alice_conn)).starts_with("content: "));
        assert_eq!(f.store.group_messages().await.len(), 1);
    }

    #[tokio::test]
    async fn test_contacts_reply_includes_presence() {
        let f = fixture().await;
        f.store.follow(UserId(1), UserId(2), FollowStatus::Accepted).await;
        f.store
            .insert_message_at(UserId(4), UserId(1), "hi alice", Utc::now())
            .await;
        let (alice, mut alice_conn) = f.connect(1, "alice").await;
        let (_bob, _bob_conn) = f.connect(2, "bob").await;

        f.send(&alice, r#"{"type":"contacts"}"#).await;

        match next_frame(&mut alice_conn) {
            Some(Frame::Contacts(list)) => {
                let summary: Vec<_> = list
                    .contacts
                    .iter()
                    .map(|c| (c.username.as_str(), c.is_online, c.is_message_request))
                    .collect();
                assert_eq!(summary, vec![("dave", false, true), ("bob", true, false)]);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        let f = fixture().await;
        let (alice, mut conn) = f.connect(1, "alice").await;
        f.send(&alice, "not json").await;
        f.send(&alice, r#"{"type":"presence"}"#).await;
        f.send(&alice, r#"{"type":"ping"}"#).await;
        assert!(next_frame(&mut conn).is_none());
    }

    #[tokio::test]
    async fn test_clients_cannot_send_error_frames() {
        let f = fixture().await;
        let (alice, mut conn) = f.connect(1, "alice").await;
        f.send(&alice, r#"{"type":"error","error":"spoof"}"#).await;
        assert_eq!(
            error_text(next_frame(&mut conn)),
            "Unsupported frame type: error"
        );
    }

    #[test]
    fn test_rejection_masks_internal_errors() {
        let r = Rejection::from(CourierError::Store("constraint failed".into()));
        assert_eq!(r, Rejection::new("Internal server error"));
    }
}
