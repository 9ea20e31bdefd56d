//! Message store collaborator.
//!
//! The delivery core never owns persistent state; it persists messages and
//! notifications and asks relationship questions through [`MessageStore`].

pub mod memory;

pub use memory::{MemoryStore, Seed};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::{CourierResult, GroupId, MessageId, Notification, NotificationKind, UserId};
use serde::{Deserialize, Serialize};

/// Status of a directed follow edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowStatus {
    #[default]
    None,
    Pending,
    Accepted,
}

impl FollowStatus {
    pub fn is_accepted(self) -> bool {
        self == FollowStatus::Accepted
    }
}

/// Profile visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// Status of a group membership row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Pending,
    Invited,
    #[default]
    Accepted,
}

/// A direct message to persist. `content` is already sanitised.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: UserId,
    pub receiver: UserId,
    pub content: String,
    pub image_path: Option<String>,
}

/// A user related to a contact-listing viewer, with the facts needed to
/// decide eligibility and ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactCandidate {
    pub user_id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub visibility: Visibility,
    /// Viewer → candidate.
    pub viewer_follows: FollowStatus,
    /// Candidate → viewer.
    pub follows_viewer: FollowStatus,
    /// Most recent message in either direction.
    pub last_message_at: Option<DateTime<Utc>>,
    /// Most recent message sent by the candidate to the viewer.
    pub last_inbound_at: Option<DateTime<Utc>>,
    /// Unread messages from the candidate to the viewer.
    pub unread_count: u32,
}

/// Persistence and relationship queries consumed by the delivery core.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Persist a direct message and return its identifier.
    async fn save_message(&self, message: NewMessage) -> CourierResult<MessageId>;

    /// Persist a group message and return its identifier.
    async fn save_group_message(
        &self,
        group: GroupId,
        sender: UserId,
        content: &str,
    ) -> CourierResult<MessageId>;

    /// Mark every unread message from `sender` to `receiver` as read.
    /// Returns how many messages changed state.
    async fn mark_read(&self, sender: UserId, receiver: UserId) -> CourierResult<u64>;

    /// Accepted members of `group`.
    async fn group_members(&self, group: GroupId) -> CourierResult<Vec<UserId>>;

    /// Whether `user` is an accepted member of `group`.
    async fn is_group_member(&self, group: GroupId, user: UserId) -> CourierResult<bool>;

    /// Whether any direct message exists between `a` and `b`, in either direction.
    async fn has_history(&self, a: UserId, b: UserId) -> CourierResult<bool>;

    /// Status of the follow edge `follower → followee`.
    async fn follow_status(&self, follower: UserId, followee: UserId)
        -> CourierResult<FollowStatus>;

    /// Whether `user` has a public profile. Unknown users are not public.
    async fn is_public_profile(&self, user: UserId) -> CourierResult<bool>;

    /// Every user related to `viewer` by a message or a follow edge.
    async fn contact_candidates(&self, viewer: UserId) -> CourierResult<Vec<ContactCandidate>>;

    /// Persist a notification record for `user`.
    async fn save_notification(
        &self,
        user: UserId,
        kind: NotificationKind,
        related_id: i64,
        content: &str,
    ) -> CourierResult<Notification>;
}
