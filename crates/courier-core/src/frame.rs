//! Chat wire frames.
//!
//! Every frame is a JSON object discriminated by its `type` field. Fields
//! that identify the sender or carry server time are always overwritten by
//! the server before a frame is routed; values supplied by a client are
//! never trusted.

use crate::ids::{GroupId, MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A one-to-one chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    /// Assigned by the store; present only once the message is persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A message posted to a group chat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub sender_id: UserId,
    pub group_id: GroupId,
    #[serde(default)]
    pub content: String,
    /// Relayed to members but not persisted with the group message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Typing indicator, addressed to one user or to a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Typing {
    #[serde(default)]
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Read receipt. Inbound, `receiver_id` names the peer whose messages were
/// read; outbound, it is forwarded to that peer with `sender_id` set to the
/// reader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    #[serde(default)]
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Error reported back to the client that caused it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One entry of a contact listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub user_id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub is_online: bool,
    pub unread_count: u32,
    pub has_chat_history: bool,
    /// The contact wrote to the viewer but the viewer does not follow them.
    pub is_message_request: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Contact listing request (empty) and response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactList {
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A single chat wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    #[serde(rename = "message")]
    Direct(DirectMessage),
    #[serde(rename = "group_message")]
    Group(GroupMessage),
    Typing(Typing),
    #[serde(rename = "read")]
    Read(ReadReceipt),
    Error(ErrorFrame),
    /// Application-level heartbeat sent by browser clients.
    Ping,
    Contacts(ContactList),
}

impl Frame {
    /// The wire name of this frame's `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Direct(_) => "message",
            Frame::Group(_) => "group_message",
            Frame::Typing(_) => "typing",
            Frame::Read(_) => "read",
            Frame::Error(_) => "error",
            Frame::Ping => "ping",
            Frame::Contacts(_) => "contacts",
        }
    }

    /// Build an `error` frame stamped with the current time.
    pub fn error(message: impl Into<String>) -> Self {
        Frame::Error(ErrorFrame {
            error: message.into(),
            timestamp: Some(Utc::now()),
        })
    }

    /// Overwrite the sender and timestamp with server-side values.
    pub fn stamp(&mut self, sender: UserId, now: DateTime<Utc>) {
        match self {
            Frame::Direct(m) => {
                m.sender_id = sender;
                m.timestamp = Some(now);
            }
            Frame::Group(m) => {
                m.sender_id = sender;
                m.timestamp = Some(now);
            }
            Frame::Typing(t) => {
                t.sender_id = sender;
                t.timestamp = Some(now);
            }
            Frame::Read(r) => {
                r.sender_id = sender;
                r.timestamp = Some(now);
            }
            Frame::Error(e) => e.timestamp = Some(now),
            Frame::Contacts(c) => c.timestamp = Some(now),
            Frame::Ping => {}
        }
    }
}
