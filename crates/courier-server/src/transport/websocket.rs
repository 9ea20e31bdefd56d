//! WebSocket listener using tokio-tungstenite.
//!
//! The HTTP head is read and answered here so that authentication happens
//! before any WebSocket exists: a refused request gets a plain HTTP status
//! and the socket is closed. tungstenite's `create_response` validates the
//! upgrade and builds the `101`.

use super::upgrade;
use crate::auth::{Authenticator, Identity};
use courier_core::{CourierError, CourierResult};
use http::{Method, Request, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::create_response;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

/// Time allowed for reading the request head and authenticating.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Which hub an accepted connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// `/ws`
    Chat,
    /// `/ws/notifications`
    Notifications,
}

impl Surface {
    fn from_path(path: &str) -> Option<Self> {
        match path {
            "/ws" => Some(Surface::Chat),
            "/ws/notifications" => Some(Surface::Notifications),
            _ => None,
        }
    }
}

/// An authenticated, upgraded connection.
pub struct AcceptedConnection {
    pub ws: WebSocketStream<TcpStream>,
    pub identity: Identity,
    pub surface: Surface,
    pub remote_addr: SocketAddr,
}

/// Start the WebSocket listener.
///
/// Returns the bound address and a receiver that yields admitted
/// connections.
pub async fn start_listener(
    bind_addr: SocketAddr,
    authenticator: Arc<dyn Authenticator>,
    max_frame_bytes: usize,
) -> CourierResult<(SocketAddr, mpsc::Receiver<AcceptedConnection>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| CourierError::Transport(format!("WS bind failed: {e}")))?;
    let local_addr = tcp_listener.local_addr()?;

    info!(addr = %local_addr, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<AcceptedConnection>(64);

    tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    let authenticator = Arc::clone(&authenticator);
                    tokio::spawn(async move {
                        let admitted = timeout(
                            HANDSHAKE_TIMEOUT,
                            admit(stream, addr, authenticator.as_ref(), max_frame_bytes),
                        )
                        .await;
                        match admitted {
                            Ok(Ok(Some(conn))) => {
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            Ok(Ok(None)) => {}
                            Ok(Err(e)) => {
                                debug!(remote = %addr, error = %e, "upgrade request refused");
                            }
                            Err(_) => {
                                debug!(remote = %addr, "handshake timed out");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    });

    Ok((local_addr, rx))
}

/// Run one request through admission.
///
/// `Ok(None)` means the request was answered with a plain HTTP response.
async fn admit(
    mut stream: TcpStream,
    remote_addr: SocketAddr,
    authenticator: &dyn Authenticator,
    max_frame_bytes: usize,
) -> CourierResult<Option<AcceptedConnection>> {
    let request = match upgrade::read_request(&mut stream).await {
        Ok(request) => request,
        Err(e @ CourierError::InvalidFrame(_)) => {
            reject(&mut stream, StatusCode::BAD_REQUEST).await;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let path = request.uri().path();
    if *request.method() == Method::GET && path == "/health" {
        stream.write_all(&upgrade::to_bytes(&upgrade::health())).await?;
        let _ = stream.shutdown().await;
        return Ok(None);
    }

    let Some(surface) = Surface::from_path(path) else {
        let e = CourierError::InvalidFrame(format!("unknown path {path}"));
        reject(&mut stream, StatusCode::NOT_FOUND).await;
        return Err(e);
    };
    let switching = match create_response(&request) {
        Ok(response) => response,
        Err(e) => {
            reject(&mut stream, StatusCode::BAD_REQUEST).await;
            return Err(CourierError::InvalidFrame(format!(
                "not a WebSocket upgrade: {e}"
            )));
        }
    };

    let identity = match authenticate(&request, authenticator).await {
        Ok(identity) => identity,
        Err(e) => {
            let status = match e {
                CourierError::AuthUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::UNAUTHORIZED,
            };
            reject(&mut stream, status).await;
            return Err(e);
        }
    };

    stream
        .write_all(&upgrade::to_bytes(&switching.map(|()| Vec::<u8>::new())))
        .await?;

    // Frames above the codec limit are skipped by the pipeline; this is the
    // hard ceiling past which the socket is dropped.
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_frame_bytes.saturating_mul(16));
    let ws = WebSocketStream::from_raw_socket(stream, Role::Server, Some(config)).await;

    debug!(remote = %remote_addr, user_id = %identity.user_id, ?surface, "WebSocket connection accepted");
    Ok(Some(AcceptedConnection {
        ws,
        identity,
        surface,
        remote_addr,
    }))
}

async fn authenticate(
    request: &Request<()>,
    authenticator: &dyn Authenticator,
) -> CourierResult<Identity> {
    let credential = upgrade::credential(request)
        .ok_or_else(|| CourierError::AuthFailed("no credential".into()))?;
    authenticator.authenticate(&credential).await
}

async fn reject(stream: &mut TcpStream, status: StatusCode) {
    let _ = stream
        .write_all(&upgrade::to_bytes(&upgrade::refusal(status)))
        .await;
    let _ = stream.shutdown().await;
}
