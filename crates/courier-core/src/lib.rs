//! courier-core: Shared protocol library for the courier delivery core.
//!
//! Provides typed identifiers, the JSON chat frame union, notification
//! payloads, the text codec, content validation and the shared error type.

pub mod codec;
pub mod error;
pub mod frame;
pub mod ids;
pub mod notification;
pub mod validate;

// Re-export commonly used items at crate root.
pub use codec::{decode_frame, encode, MAX_FRAME_BYTES};
pub use error::{CourierError, CourierResult};
pub use frame::{
    Contact, ContactList, DirectMessage, ErrorFrame, Frame, GroupMessage, ReadReceipt, Typing,
};
pub use ids::{GroupId, MessageId, NotificationId, UserId};
pub use notification::{Notification, NotificationEvent, NotificationKind};
pub use validate::{validate_content, validate_image_path};
