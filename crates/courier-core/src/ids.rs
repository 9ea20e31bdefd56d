//! Strongly-typed identifiers shared by frames, the store and the hub.
//!
//! All identifiers are transparent integers on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }
    };
}

id_type!(
    /// A user account.
    UserId
);
id_type!(
    /// A chat group.
    GroupId
);
id_type!(
    /// A persisted direct or group message.
    MessageId
);
id_type!(
    /// A persisted notification.
    NotificationId
);
