//! Broadcast routing for chat frames: resolves recipients and submits them
//! to the chat hub.

use super::{ConnectionId, DeliveryReport, HubHandle, Target};
use crate::notify::{self, NotificationRequest, Notifier};
use crate::store::MessageStore;
use courier_core::{CourierResult, Frame, GroupId, UserId};
use std::sync::Arc;
use tracing::debug;

pub struct Router {
    hub: HubHandle<Frame>,
    store: Arc<dyn MessageStore>,
    notifier: Arc<dyn Notifier>,
}

impl Router {
    pub fn new(
        hub: HubHandle<Frame>,
        store: Arc<dyn MessageStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            hub,
            store,
            notifier,
        }
    }

    pub fn hub(&self) -> &HubHandle<Frame> {
        &self.hub
    }

    /// Deliver to one user. Offline recipients are reported, not notified;
    /// the sender never receives a copy.
    pub async fn direct(&self, recipient: UserId, frame: Frame) -> CourierResult<DeliveryReport> {
        self.hub.deliver(Target::user(recipient), frame).await
    }

    /// Deliver to the accepted members of `group`, read fresh from the store.
    ///
    /// Persisted group messages echo back to the sender and notify every
    /// member that did not get the frame, except the sender. Other frames
    /// (typing) skip the sender and never notify.
    pub async fn group(
        &self,
        sender: UserId,
        sender_name: &str,
        group: GroupId,
        frame: Frame,
    ) -> CourierResult<DeliveryReport> {
        let members = self.store.group_members(group).await?;
        let message_id = match &frame {
            Frame::Group(m) => m.message_id,
            _ => None,
        };

        let recipients: Vec<UserId> = match message_id {
            Some(_) => members,
            None => members.into_iter().filter(|m| *m != sender).collect(),
        };
        let report = self.hub.deliver(Target::Users(recipients), frame).await?;

        if let Some(message_id) = message_id {
            let mut notified = 0;
            for member in report.undelivered().filter(|m| *m != sender) {
                notify::dispatch(
                    &self.notifier,
                    NotificationRequest::new_group_message(member, message_id, sender_name),
                );
                notified += 1;
            }
            debug!(
                group_id = %group,
                delivered = report.delivered.len(),
                notified,
                "group message routed"
            );
        }
        Ok(report)
    }

    /// Send a frame to one specific connection only.
    pub async fn reply(
        &self,
        user_id: UserId,
        connection: ConnectionId,
        frame: Frame,
    ) -> CourierResult<()> {
        self.hub
            .push(
                Target::Connection {
                    user_id,
                    id: connection,
                },
                frame,
            )
            .await
    }
}
