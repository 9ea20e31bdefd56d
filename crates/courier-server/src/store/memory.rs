//! In-memory message store.
//!
//! Thread-safe and process-local. Backs the binary when no external store is
//! wired in, and every test in this crate.

use super::{ContactCandidate, FollowStatus, MembershipStatus, MessageStore, NewMessage, Visibility};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::{
    CourierError, CourierResult, GroupId, MessageId, Notification, NotificationId,
    NotificationKind, UserId,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone)]
struct UserRecord {
    username: String,
    display_name: Option<String>,
    visibility: Visibility,
}

/// A persisted direct message.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: MessageId,
    pub sender: UserId,
    pub receiver: UserId,
    pub content: String,
    pub image_path: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A persisted group message.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredGroupMessage {
    pub id: MessageId,
    pub group: GroupId,
    pub sender: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    users: HashMap<UserId, UserRecord>,
    follows: HashMap<(UserId, UserId), FollowStatus>,
    groups: HashMap<GroupId, BTreeMap<UserId, MembershipStatus>>,
    messages: Vec<StoredMessage>,
    group_messages: Vec<StoredGroupMessage>,
    notifications: Vec<Notification>,
    next_message_id: i64,
    next_group_message_id: i64,
    next_notification_id: i64,
}

impl State {
    fn follow_status(&self, follower: UserId, followee: UserId) -> FollowStatus {
        self.follows
            .get(&(follower, followee))
            .copied()
            .unwrap_or_default()
    }

    fn push_message(
        &mut self,
        sender: UserId,
        receiver: UserId,
        content: String,
        image_path: Option<String>,
        created_at: DateTime<Utc>,
    ) -> MessageId {
        self.next_message_id += 1;
        let id = MessageId(self.next_message_id);
        self.messages.push(StoredMessage {
            id,
            sender,
            receiver,
            content,
            image_path,
            is_read: false,
            created_at,
        });
        id
    }
}

/// Fixture loaded with `--seed`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub follows: Vec<SeedFollow>,
    #[serde(default)]
    pub groups: Vec<SeedGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedFollow {
    pub follower: UserId,
    pub followee: UserId,
    #[serde(default = "accepted")]
    pub status: FollowStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedGroup {
    pub id: GroupId,
    #[serde(default)]
    pub members: Vec<SeedMember>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedMember {
    pub user_id: UserId,
    #[serde(default)]
    pub status: MembershipStatus,
}

fn accepted() -> FollowStatus {
    FollowStatus::Accepted
}

impl Seed {
    /// Read a JSON fixture from disk.
    pub fn from_path(path: &Path) -> CourierResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| CourierError::Config(format!("seed parse error: {e}")))
    }
}

/// Process-local [`MessageStore`].
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated from a fixture.
    pub fn from_seed(seed: Seed) -> Self {
        let mut state = State::default();
        for user in seed.users {
            state.users.insert(
                user.id,
                UserRecord {
                    username: user.username,
                    display_name: user.display_name,
                    visibility: user.visibility,
                },
            );
        }
        for edge in seed.follows {
            state.follows.insert((edge.follower, edge.followee), edge.status);
        }
        for group in seed.groups {
            let members = state.groups.entry(group.id).or_default();
            for member in group.members {
                members.insert(member.user_id, member.status);
            }
        }
        info!(
            users = state.users.len(),
            follows = state.follows.len(),
            groups = state.groups.len(),
            "seeded in-memory store"
        );
        Self {
            state: RwLock::new(state),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub async fn add_user(
        &self,
        id: UserId,
        username: &str,
        display_name: Option<&str>,
        visibility: Visibility,
    ) {
        self.state.write().await.users.insert(
            id,
            UserRecord {
                username: username.to_string(),
                display_name: display_name.map(str::to_string),
                visibility,
            },
        );
    }

    pub async fn follow(&self, follower: UserId, followee: UserId, status: FollowStatus) {
        self.state
            .write()
            .await
            .follows
            .insert((follower, followee), status);
    }

    pub async fn add_group_member(&self, group: GroupId, user: UserId, status: MembershipStatus) {
        self.state
            .write()
            .await
            .groups
            .entry(group)
            .or_default()
            .insert(user, status);
    }

    /// Insert a direct message with an explicit creation time.
    pub async fn insert_message_at(
        &self,
        sender: UserId,
        receiver: UserId,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> MessageId {
        self.state
            .write()
            .await
            .push_message(sender, receiver, content.to_string(), None, created_at)
    }

    /// Make every subsequent write fail with a store error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn messages(&self) -> Vec<StoredMessage> {
        self.state.read().await.messages.clone()
    }

    pub async fn group_messages(&self) -> Vec<StoredGroupMessage> {
        self.state.read().await.group_messages.clone()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.read().await.notifications.clone()
    }

    fn check_writable(&self) -> CourierResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CourierError::Store("store is read-only".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn save_message(&self, message: NewMessage) -> CourierResult<MessageId> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        Ok(state.push_message(
            message.sender,
            message.receiver,
            message.content,
            message.image_path,
            Utc::now(),
        ))
    }

    async fn save_group_message(
        &self,
        group: GroupId,
        sender: UserId,
        content: &str,
    ) -> CourierResult<MessageId> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        state.next_group_message_id += 1;
        let id = MessageId(state.next_group_message_id);
        state.group_messages.push(StoredGroupMessage {
            id,
            group,
            sender,
            content: content.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn mark_read(&self, sender: UserId, receiver: UserId) -> CourierResult<u64> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        let mut changed = 0;
        for m in state
            .messages
            .iter_mut()
            .filter(|m| m.sender == sender && m.receiver == receiver && !m.is_read)
        {
            m.is_read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn group_members(&self, group: GroupId) -> CourierResult<Vec<UserId>> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .get(&group)
            .map(|members| {
                members
                    .iter()
                    .filter(|(_, status)| **status == MembershipStatus::Accepted)
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn is_group_member(&self, group: GroupId, user: UserId) -> CourierResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .get(&group)
            .and_then(|members| members.get(&user))
            .is_some_and(|status| *status == MembershipStatus::Accepted))
    }

    async fn has_history(&self, a: UserId, b: UserId) -> CourierResult<bool> {
        let state = self.state.read().await;
        Ok(state.messages.iter().any(|m| {
            (m.sender == a && m.receiver == b) || (m.sender == b && m.receiver == a)
        }))
    }

    async fn follow_status(
        &self,
        follower: UserId,
        followee: UserId,
    ) -> CourierResult<FollowStatus> {
        Ok(self.state.read().await.follow_status(follower, followee))
    }

    async fn is_public_profile(&self, user: UserId) -> CourierResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(&user)
            .is_some_and(|u| u.visibility == Visibility::Public))
    }

    async fn contact_candidates(&self, viewer: UserId) -> CourierResult<Vec<ContactCandidate>> {
        let state = self.state.read().await;
        let mut candidates = Vec::new();
        for (&id, user) in &state.users {
            if id == viewer {
                continue;
            }
            let viewer_follows = state.follow_status(viewer, id);
            let follows_viewer = state.follow_status(id, viewer);

            let mut last_message_at = None;
            let mut last_inbound_at = None;
            let mut unread_count = 0u32;
            for m in &state.messages {
                let inbound = m.sender == id && m.receiver == viewer;
                let outbound = m.sender == viewer && m.receiver == id;
                if !(inbound || outbound) {
                    continue;
                }
                last_message_at = last_message_at.max(Some(m.created_at));
                if inbound {
                    last_inbound_at = last_inbound_at.max(Some(m.created_at));
                    if !m.is_read {
                        unread_count += 1;
                    }
                }
            }

            let related = last_message_at.is_some()
                || viewer_follows != FollowStatus::None
                || follows_viewer != FollowStatus::None;
            if !related {
                continue;
            }
            candidates.push(ContactCandidate {
                user_id: id,
                username: user.username.clone(),
                display_name: user.display_name.clone(),
                visibility: user.visibility,
                viewer_follows,
                follows_viewer,
                last_message_at,
                last_inbound_at,
                unread_count,
            });
        }
        Ok(candidates)
    }

    async fn save_notification(
        &self,
        user: UserId,
        kind: NotificationKind,
        related_id: i64,
        content: &str,
    ) -> CourierResult<Notification> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        state.next_notification_id += 1;
        let notification = Notification {
            id: NotificationId(state.next_notification_id),
            user_id: user,
            kind,
            related_id,
            content: content.to_string(),
            is_read: false,
            created_at: Utc::now(),
        };
        state.notifications.push(notification.clone());
        Ok(notification)
    }
}
