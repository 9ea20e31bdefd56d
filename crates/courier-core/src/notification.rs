//! Notification payloads pushed over the notification surface.

use crate::ids::{NotificationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Follow,
    FollowRequest,
    GroupInvite,
    GroupRequest,
    GroupActivity,
    Event,
    Message,
    Comment,
    Post,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Follow => "follow",
            NotificationKind::FollowRequest => "follow_request",
            NotificationKind::GroupInvite => "group_invite",
            NotificationKind::GroupRequest => "group_request",
            NotificationKind::GroupActivity => "group_activity",
            NotificationKind::Event => "event",
            NotificationKind::Message => "message",
            NotificationKind::Comment => "comment",
            NotificationKind::Post => "post",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted notification record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub related_id: i64,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Frame sent to notification clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    Notification { notification: Notification },
}

impl NotificationEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            NotificationEvent::Notification { notification } => notification.user_id,
        }
    }
}
