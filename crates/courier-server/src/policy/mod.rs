//! Chat eligibility policy.
//!
//! The policy layer is split into two parts:
//!
//! - [`RelationshipFacts`]: a plain snapshot of the relationship between a
//!   sender and a recipient, with the pure decision [`RelationshipFacts::permits`].
//! - [`PermissionEvaluator`]: the runtime counterpart that gathers those
//!   facts from the [`MessageStore`] and answers `can_deliver` and contact
//!   listing queries.

pub mod contacts;

pub use contacts::rank_contacts;

use crate::store::{FollowStatus, MessageStore, Visibility};
use chrono::{Duration, Utc};
use courier_core::{Contact, CourierError, CourierResult, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Read-only facts about a sender → recipient pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipFacts {
    /// Any message exists between the pair, in either direction.
    pub has_history: bool,
    pub recipient_visibility: Visibility,
    /// Sender → recipient.
    pub sender_follows: FollowStatus,
    /// Recipient → sender.
    pub recipient_follows: FollowStatus,
}

impl RelationshipFacts {
    /// Decide whether the sender may deliver to the recipient.
    ///
    /// | History | Visibility | Required                          |
    /// |---------|------------|-----------------------------------|
    /// | yes     | any        | nothing                           |
    /// | no      | public     | sender follows (accepted)         |
    /// | no      | private    | both directions accepted          |
    pub fn permits(&self) -> bool {
        if self.has_history {
            return true;
        }
        match self.recipient_visibility {
            Visibility::Public => self.sender_follows.is_accepted(),
            Visibility::Private => {
                self.sender_follows.is_accepted() && self.recipient_follows.is_accepted()
            }
        }
    }
}

/// Evaluates chat eligibility against the store.
///
/// Holds no state besides its collaborators; every call reads fresh facts.
pub struct PermissionEvaluator {
    store: Arc<dyn MessageStore>,
    /// Inbound messages younger than this surface their sender as a contact.
    request_window: Duration,
}

impl PermissionEvaluator {
    pub fn new(store: Arc<dyn MessageStore>, request_window: Duration) -> Self {
        Self {
            store,
            request_window,
        }
    }

    /// Collect the relationship facts for `sender → recipient`.
    ///
    /// Follow edges are not looked up when history already permits delivery.
    pub async fn facts(&self, sender: UserId, recipient: UserId) -> CourierResult<RelationshipFacts> {
        if self.store.has_history(sender, recipient).await? {
            return Ok(RelationshipFacts {
                has_history: true,
                recipient_visibility: Visibility::Public,
                sender_follows: FollowStatus::None,
                recipient_follows: FollowStatus::None,
            });
        }

        let recipient_visibility = if self.store.is_public_profile(recipient).await? {
            Visibility::Public
        } else {
            Visibility::Private
        };
        let sender_follows = self.store.follow_status(sender, recipient).await?;
        let recipient_follows = match recipient_visibility {
            Visibility::Private if sender_follows.is_accepted() => {
                self.store.follow_status(recipient, sender).await?
            }
            _ => FollowStatus::None,
        };

        Ok(RelationshipFacts {
            has_history: false,
            recipient_visibility,
            sender_follows,
            recipient_follows,
        })
    }

    /// Whether `sender` may deliver a direct frame to `recipient`.
    pub async fn can_deliver(&self, sender: UserId, recipient: UserId) -> CourierResult<bool> {
        let facts = self.facts(sender, recipient).await?;
        let allowed = facts.permits();
        debug!(sender = %sender, recipient = %recipient, allowed, ?facts, "evaluated chat permission");
        Ok(allowed)
    }

    /// Contacts `viewer` may chat with, ordered for display.
    ///
    /// `online` is a presence snapshot used to fill `is_online`.
    pub async fn list_eligible_contacts(
        &self,
        viewer: UserId,
        online: &HashSet<UserId>,
    ) -> CourierResult<Vec<Contact>> {
        let candidates = self.store.contact_candidates(viewer).await?;
        let since = Utc::now()
            .checked_sub_signed(self.request_window)
            .ok_or_else(|| {
                CourierError::Config(format!(
                    "request window of {} days is out of range",
                    self.request_window.num_days()
                ))
            })?;
        Ok(rank_contacts(viewer, candidates, since, online))
    }
}
