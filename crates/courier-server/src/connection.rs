//! Per-connection pumps.
//!
//! Each admitted WebSocket gets a mailbox registered with a hub and two
//! concurrent loops:
//!
//! - the read loop (on the connection task) enforces the idle deadline and
//!   hands text frames to an [`InboundHandler`];
//! - the write pump (a spawned task) drains the mailbox onto the socket and
//!   sends periodic pings.
//!
//! Whichever side stops first ends the connection, and the hub is told to
//! unregister it exactly once.

use crate::auth::Identity;
use crate::hub::{Attached, ConnectionId, HubHandle, Payload};
use async_trait::async_trait;
use courier_core::{CourierError, CourierResult, UserId};
use futures_util::stream::SplitSink;
use futures_util::{FutureExt, SinkExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

/// Liveness settings shared by every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    /// How often the write pump sends a ping. Must be below `read_deadline`.
    pub ping_interval: Duration,
    /// Silence longer than this ends the connection.
    pub read_deadline: Duration,
    /// Upper bound for one socket write (or batch of writes).
    pub write_timeout: Duration,
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(54),
            read_deadline: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// The authenticated connection an inbound frame arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub user_id: UserId,
    pub display_name: String,
    pub connection: ConnectionId,
}

/// Consumer of inbound text frames.
#[async_trait]
pub trait InboundHandler: Send + Sync + 'static {
    async fn on_text(&self, origin: &Origin, text: &str);
}

/// Handler for surfaces that only push: inbound text just keeps the
/// connection alive.
pub struct IgnoreInbound;

#[async_trait]
impl InboundHandler for IgnoreInbound {
    async fn on_text(&self, origin: &Origin, text: &str) {
        debug!(user_id = %origin.user_id, len = text.len(), "ignoring inbound frame");
    }
}

/// Register `ws` with `hub` and run both pumps until the connection ends.
pub async fn run_connection<P, S>(
    ws: WebSocketStream<S>,
    identity: Identity,
    hub: HubHandle<P>,
    handler: Arc<dyn InboundHandler>,
    keepalive: Keepalive,
) where
    P: Payload,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let Attached { id, outbound } = match hub.attach(identity.user_id, &identity.display_name).await
    {
        Ok(attached) => attached,
        Err(e) => {
            warn!(hub = hub.name(), user_id = %identity.user_id, error = %e, "could not register connection");
            return;
        }
    };
    let origin = Origin {
        user_id: identity.user_id,
        display_name: identity.display_name,
        connection: id,
    };
    info!(hub = hub.name(), user_id = %origin.user_id, conn_id = %id, "connection opened");

    let (sink, mut stream) = ws.split();
    let mut writer = tokio::spawn(write_pump(sink, outbound, keepalive));
    let mut writer_done = false;

    loop {
        tokio::select! {
            result = &mut writer => {
                writer_done = true;
                match result {
                    Ok(Ok(())) => debug!(conn_id = %id, "write pump finished"),
                    Ok(Err(e)) => debug!(conn_id = %id, error = %e, "write pump failed"),
                    Err(e) => warn!(conn_id = %id, error = %e, "write pump panicked"),
                }
                break;
            }
            next = timeout(keepalive.read_deadline, stream.next()) => {
                match next {
                    Err(_) => {
                        info!(user_id = %origin.user_id, conn_id = %id, "read deadline elapsed");
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        debug!(user_id = %origin.user_id, conn_id = %id, error = %e, "read failed");
                        break;
                    }
                    Ok(Some(Ok(Message::Text(text)))) => {
                        // A panicking handler loses its frame, not the connection.
                        let handled = AssertUnwindSafe(handler.on_text(&origin, &text))
                            .catch_unwind()
                            .await;
                        if handled.is_err() {
                            error!(user_id = %origin.user_id, conn_id = %id, "inbound handler panicked");
                        }
                    }
                    Ok(Some(Ok(Message::Close(frame)))) => {
                        debug!(user_id = %origin.user_id, conn_id = %id, reason = ?frame, "client closed");
                        break;
                    }
                    Ok(Some(Ok(Message::Binary(data)))) => {
                        debug!(conn_id = %id, len = data.len(), "ignoring binary frame");
                    }
                    // Ping and pong only slide the deadline.
                    Ok(Some(Ok(_))) => {}
                }
            }
        }
    }

    if let Err(e) = hub.unregister(origin.user_id, id).await {
        debug!(conn_id = %id, error = %e, "unregister skipped");
    }
    if !writer_done && timeout(keepalive.write_timeout, &mut writer).await.is_err() {
        writer.abort();
    }
    info!(hub = hub.name(), user_id = %origin.user_id, conn_id = %id, "connection closed");
}

/// Drain `outbound` onto the socket until the mailbox closes or a write fails.
///
/// Everything queued by the time the pump wakes is written as separate
/// WebSocket messages and flushed together.
async fn write_pump<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbound: mpsc::Receiver<Arc<str>>,
    keepalive: Keepalive,
) -> CourierResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut ping = interval_at(
        Instant::now() + keepalive.ping_interval,
        keepalive.ping_interval,
    );

    loop {
        tokio::select! {
            next = outbound.recv() => {
                let Some(first) = next else {
                    // Mailbox closed: unregistered, evicted or hub stopped.
                    let _ = timeout(keepalive.write_timeout, sink.send(Message::Close(None))).await;
                    return Ok(());
                };
                let batch = async {
                    sink.feed(Message::Text(first.to_string().into())).await?;
                    while let Ok(more) = outbound.try_recv() {
                        sink.feed(Message::Text(more.to_string().into())).await?;
                    }
                    sink.flush().await
                };
                timeout(keepalive.write_timeout, batch)
                    .await
                    .map_err(|_| CourierError::Timeout)?
                    .map_err(|e| CourierError::Transport(format!("write failed: {e}")))?;
            }
            _ = ping.tick() => {
                timeout(keepalive.write_timeout, sink.send(Message::Ping(Vec::new().into())))
                    .await
                    .map_err(|_| CourierError::Timeout)?
                    .map_err(|e| CourierError::Transport(format!("ping failed: {e}")))?;
            }
        }
    }
}
