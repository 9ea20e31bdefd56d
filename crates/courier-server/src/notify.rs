//! Offline notification dispatch.
//!
//! Two implementations of [`Notifier`]: [`LocalNotifier`] persists through
//! the store and pushes over this process's notification hub, [`HttpNotifier`]
//! hands the request to a remote notification service. Callers go through
//! [`dispatch`], which never waits and only logs failures.

use crate::hub::{HubHandle, Target};
use crate::store::MessageStore;
use async_trait::async_trait;
use courier_core::{
    CourierError, CourierResult, MessageId, NotificationEvent, NotificationKind, UserId,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One notification to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRequest {
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub related_id: i64,
    pub content: String,
}

impl NotificationRequest {
    /// Direct message waiting for an offline recipient.
    pub fn new_message(recipient: UserId, message: MessageId, sender_name: &str) -> Self {
        Self {
            user_id: recipient,
            kind: NotificationKind::Message,
            related_id: message.0,
            content: format!("New message from {sender_name}"),
        }
    }

    /// Group message waiting for an offline member.
    pub fn new_group_message(member: UserId, message: MessageId, sender_name: &str) -> Self {
        Self {
            user_id: member,
            kind: NotificationKind::Message,
            related_id: message.0,
            content: format!("{sender_name} sent a message in group chat"),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, request: NotificationRequest) -> CourierResult<()>;
}

/// Fire-and-forget: run `request` on its own task.
pub fn dispatch(notifier: &Arc<dyn Notifier>, request: NotificationRequest) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        let user_id = request.user_id;
        let kind = request.kind;
        match notifier.notify(request).await {
            Ok(()) => debug!(user_id = %user_id, kind = %kind, "notification dispatched"),
            Err(e) => warn!(user_id = %user_id, kind = %kind, error = %e, "notification dispatch failed"),
        }
    });
}

/// Persist, then push to the user's notification connection if online.
pub struct LocalNotifier {
    store: Arc<dyn MessageStore>,
    hub: HubHandle<NotificationEvent>,
}

impl LocalNotifier {
    pub fn new(store: Arc<dyn MessageStore>, hub: HubHandle<NotificationEvent>) -> Self {
        Self { store, hub }
    }
}

#[async_trait]
impl Notifier for LocalNotifier {
    async fn notify(&self, request: NotificationRequest) -> CourierResult<()> {
        let notification = self
            .store
            .save_notification(
                request.user_id,
                request.kind,
                request.related_id,
                &request.content,
            )
            .await?;
        let user_id = notification.user_id;
        self.hub
            .push(
                Target::user(user_id),
                NotificationEvent::Notification { notification },
            )
            .await
    }
}

/// Forward to a remote notification service: `POST <url>/notifications`.
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(base_url: &str, timeout: Duration) -> CourierResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CourierError::Config(format!("notification client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/notifications", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, request: NotificationRequest) -> CourierResult<()> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| CourierError::Notify(format!("request failed: {e}")))?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(CourierError::Notify(format!(
                "notification service returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
