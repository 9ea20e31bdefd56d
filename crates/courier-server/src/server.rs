//! Core server: wires the hubs, the chat pipeline and the listener, then
//! hands each admitted connection to its surface.
//!
//! Owns the shutdown broadcast. Firing it stops both hubs (closing every
//! mailbox), the accept loop and the maintenance task.

use crate::auth::Authenticator;
use crate::config::ServerConfig;
use crate::connection::{run_connection, IgnoreInbound, InboundHandler, Keepalive};
use crate::hub::{Hub, HubHandle, HubSettings, Router};
use crate::notify::{HttpNotifier, LocalNotifier, Notifier};
use crate::pipeline::ChatPipeline;
use crate::policy::PermissionEvaluator;
use crate::store::MessageStore;
use crate::transport::{self, AcceptedConnection, Surface};
use courier_core::{CourierResult, Frame, NotificationEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// The courier server instance.
pub struct CourierServer {
    config: ServerConfig,
    authenticator: Arc<dyn Authenticator>,
    chat: HubHandle<Frame>,
    notifications: HubHandle<NotificationEvent>,
    pipeline: Arc<ChatPipeline>,
    /// Broadcast sender for server shutdown.
    shutdown_tx: broadcast::Sender<()>,
    hub_tasks: Vec<JoinHandle<()>>,
}

impl CourierServer {
    /// Create a server and start its hubs. Must run inside a Tokio runtime.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn MessageStore>,
        authenticator: Arc<dyn Authenticator>,
    ) -> CourierResult<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let settings = HubSettings {
            intake_capacity: config.intake_capacity,
            mailbox_capacity: config.mailbox_capacity,
        };
        let (chat, chat_task) = Hub::<Frame>::spawn("chat", settings, shutdown_tx.subscribe());
        let (notifications, notification_task) =
            Hub::<NotificationEvent>::spawn("notifications", settings, shutdown_tx.subscribe());

        let notifier: Arc<dyn Notifier> = match &config.notification_url {
            Some(url) => {
                info!(url = %url, "forwarding notifications to remote service");
                Arc::new(HttpNotifier::new(url, config.notification_timeout)?)
            }
            None => Arc::new(LocalNotifier::new(store.clone(), notifications.clone())),
        };

        let router = Router::new(chat.clone(), store.clone(), notifier.clone());
        let policy = PermissionEvaluator::new(store.clone(), config.request_window);
        let pipeline = Arc::new(ChatPipeline::new(
            router,
            store,
            policy,
            notifier,
            config.max_frame_bytes,
        ));

        Ok(Self {
            config,
            authenticator,
            chat,
            notifications,
            pipeline,
            shutdown_tx,
            hub_tasks: vec![chat_task, notification_task],
        })
    }

    /// Bind the listener and start accepting connections.
    pub async fn start(self) -> CourierResult<ServerHandle> {
        let (local_addr, ws_rx) = transport::start_listener(
            self.config.bind_addr(),
            Arc::clone(&self.authenticator),
            self.config.max_frame_bytes,
        )
        .await?;

        let maintenance = tokio::spawn(maintenance(
            Arc::clone(&self.authenticator),
            self.chat.clone(),
            self.notifications.clone(),
            self.shutdown_tx.subscribe(),
        ));

        info!(
            addr = %local_addr,
            remote_auth = self.config.auth.url.is_some(),
            remote_notifications = self.config.notification_url.is_some(),
            "courier-server ready"
        );

        let accept = tokio::spawn(accept_loop(
            ws_rx,
            self.chat.clone(),
            self.notifications.clone(),
            Arc::clone(&self.pipeline),
            self.config.keepalive,
            self.shutdown_tx.subscribe(),
        ));

        let mut tasks = self.hub_tasks;
        tasks.push(maintenance);
        Ok(ServerHandle {
            local_addr,
            chat: self.chat,
            notifications: self.notifications,
            shutdown_tx: self.shutdown_tx,
            accept,
            tasks,
        })
    }
}

/// A running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    chat: HubHandle<Frame>,
    notifications: HubHandle<NotificationEvent>,
    shutdown_tx: broadcast::Sender<()>,
    accept: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn chat(&self) -> &HubHandle<Frame> {
        &self.chat
    }

    pub fn notifications(&self) -> &HubHandle<NotificationEvent> {
        &self.notifications
    }

    /// Resolves when the accept loop ends on its own.
    pub async fn closed(&mut self) {
        let _ = (&mut self.accept).await;
    }

    /// Stop the hubs, the accept loop and the maintenance task.
    pub async fn shutdown(self) {
        info!("broadcasting shutdown to connected clients");
        let _ = self.shutdown_tx.send(());
        let _ = self.accept.await;
        for task in self.tasks {
            let _ = task.await;
        }
        info!("courier-server stopped");
    }
}

async fn accept_loop(
    mut ws_rx: tokio::sync::mpsc::Receiver<AcceptedConnection>,
    chat: HubHandle<Frame>,
    notifications: HubHandle<NotificationEvent>,
    pipeline: Arc<ChatPipeline>,
    keepalive: Keepalive,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let ignore: Arc<dyn InboundHandler> = Arc::new(IgnoreInbound);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            next = ws_rx.recv() => {
                let Some(conn) = next else {
                    info!("listener closed, shutting down");
                    break;
                };
                debug!(remote = %conn.remote_addr, user_id = %conn.identity.user_id, surface = ?conn.surface, "dispatching connection");
                match conn.surface {
                    Surface::Chat => {
                        let handler: Arc<dyn InboundHandler> = pipeline.clone();
                        tokio::spawn(run_connection(conn.ws, conn.identity, chat.clone(), handler, keepalive));
                    }
                    Surface::Notifications => {
                        tokio::spawn(run_connection(
                            conn.ws,
                            conn.identity,
                            notifications.clone(),
                            ignore.clone(),
                            keepalive,
                        ));
                    }
                }
            }
        }
    }
}

/// Periodic housekeeping: expire cached credentials and report presence.
async fn maintenance(
    authenticator: Arc<dyn Authenticator>,
    chat: HubHandle<Frame>,
    notifications: HubHandle<NotificationEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                authenticator.purge_expired().await;
                let chat_online = chat.registry().count().await;
                let notification_online = notifications.registry().count().await;
                debug!(chat_online, notification_online, "maintenance tick");
            }
        }
    }
}
