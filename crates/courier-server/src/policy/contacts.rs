//! Contact discovery: which related users a viewer may chat with, and in
//! what order they are listed.

use crate::store::{ContactCandidate, Visibility};
use chrono::{DateTime, Utc};
use courier_core::{Contact, UserId};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Filter and order contact candidates for `viewer`.
///
/// A candidate is listed when it wrote to the viewer at or after `since`, or
/// when the viewer follows it (accepted) and it is either public or follows
/// the viewer back (accepted). Candidates with chat history come first, most
/// recent conversation first; the rest are ordered by username.
pub fn rank_contacts(
    viewer: UserId,
    candidates: Vec<ContactCandidate>,
    since: DateTime<Utc>,
    online: &HashSet<UserId>,
) -> Vec<Contact> {
    let mut contacts: Vec<Contact> = candidates
        .into_iter()
        .filter(|c| c.user_id != viewer && is_eligible(c, since))
        .map(|c| Contact {
            user_id: c.user_id,
            is_online: online.contains(&c.user_id),
            unread_count: c.unread_count,
            has_chat_history: c.last_message_at.is_some(),
            is_message_request: !c.viewer_follows.is_accepted(),
            last_message_at: c.last_message_at,
            username: c.username,
            display_name: c.display_name,
        })
        .collect();
    contacts.sort_by(display_order);
    contacts
}

fn is_eligible(c: &ContactCandidate, since: DateTime<Utc>) -> bool {
    let recent_inbound = c.last_inbound_at.is_some_and(|at| at >= since);
    let followed = c.viewer_follows.is_accepted()
        && (c.visibility == Visibility::Public || c.follows_viewer.is_accepted());
    recent_inbound || followed
}

fn display_order(a: &Contact, b: &Contact) -> Ordering {
    match (a.last_message_at, b.last_message_at) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.username.cmp(&b.username)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.username.cmp(&b.username),
    }
}
