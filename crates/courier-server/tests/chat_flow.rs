//! End-to-end delivery over loopback WebSockets.

use courier_core::UserId;
use courier_server::auth::{Identity, StaticAuthenticator};
use courier_server::config::ServerConfig;
use courier_server::connection::Keepalive;
use courier_server::store::{FollowStatus, MemoryStore, Visibility};
use courier_server::{CourierServer, ServerHandle};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);

async fn start(store: Arc<MemoryStore>) -> ServerHandle {
    start_with(
        store,
        Keepalive {
            ping_interval: Duration::from_millis(500),
            read_deadline: Duration::from_secs(5),
            write_timeout: Duration::from_secs(1),
        },
    )
    .await
}

/// Pings every 100ms and drops peers silent for 300ms.
fn short_keepalive() -> Keepalive {
    Keepalive {
        ping_interval: Duration::from_millis(100),
        read_deadline: Duration::from_millis(300),
        write_timeout: Duration::from_millis(200),
    }
}

async fn start_with(store: Arc<MemoryStore>, keepalive: Keepalive) -> ServerHandle {
    let mut tokens = HashMap::new();
    for (token, id, name) in [("tok-alice", 1, "alice"), ("tok-bob", 2, "bob"), ("tok-carol", 3, "carol")] {
        tokens.insert(
            token.to_string(),
            Identity {
                user_id: UserId(id),
                display_name: name.to_string(),
            },
        );
    }

    let mut config = ServerConfig::default();
    config.bind = "127.0.0.1".parse().unwrap();
    config.port = 0;
    config.keepalive = keepalive;

    CourierServer::new(config, store, Arc::new(StaticAuthenticator::new(tokens)))
        .unwrap()
        .start()
        .await
        .unwrap()
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_user(UserId(1), "alice", None, Visibility::Public).await;
    store.add_user(UserId(2), "bob", None, Visibility::Public).await;
    store.add_user(UserId(3), "carol", None, Visibility::Private).await;
    store
}

async fn connect(server: &ServerHandle, path: &str, token: &str, user: i64) -> Client {
    let url = format!("ws://{}{path}?token={token}", server.local_addr());
    let (client, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    tokio::time::timeout(WAIT, async {
        loop {
            let online = if path == "/ws" {
                server.chat().registry().is_online(UserId(user)).await
            } else {
                server.notifications().registry().is_online(UserId(user)).await
            };
            if online {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    client
}

async fn send(client: &mut Client, frame: Value) {
    client
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

/// Next text frame as JSON, skipping keepalive pings.
async fn next_json(client: &mut Client) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                other => panic!("unexpected {other:?}"),
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_direct_message_round_trip() {
    let store = seeded_store().await;
    store.follow(UserId(2), UserId(1), FollowStatus::Accepted).await;
    let server = start(store.clone()).await;

    let mut bob = connect(&server, "/ws", "tok-bob", 2).await;
    let mut alice = connect(&server, "/ws", "tok-alice", 1).await;

    send(&mut bob, json!({"type": "message", "receiver_id": 1, "content": "hi <alice>"})).await;

    let received = next_json(&mut alice).await;
    assert_eq!(received["type"], "message");
    assert_eq!(received["sender_id"], 2);
    assert_eq!(received["content"], "hi &lt;alice&gt;");
    assert!(received["message_id"].is_i64());

    let confirmation = next_json(&mut bob).await;
    assert_eq!(confirmation, received);
    assert_eq!(store.messages().await.len(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_denied_and_invalid_messages_get_errors() {
    let store = seeded_store().await;
    // one-way follow of a private profile
    store.follow(UserId(2), UserId(3), FollowStatus::Accepted).await;
    let server = start(store.clone()).await;
    let mut bob = connect(&server, "/ws", "tok-bob", 2).await;

    send(&mut bob, json!({"type": "message", "receiver_id": 3, "content": "hello"})).await;
    assert_eq!(
        next_json(&mut bob).await["error"],
        "You cannot send messages to this user"
    );

    let long = "a".repeat(501);
    send(&mut bob, json!({"type": "message", "receiver_id": 1, "content": long})).await;
    assert_eq!(
        next_json(&mut bob).await["error"],
        "content: Message exceeds maximum length of 500 characters"
    );

    assert!(store.messages().await.is_empty());
    server.shutdown().await;
}

#[tokio::test]
async fn test_offline_recipient_notified_on_notification_surface() {
    let store = seeded_store().await;
    store.follow(UserId(2), UserId(1), FollowStatus::Accepted).await;
    let server = start(store.clone()).await;

    let mut alice_notifications = connect(&server, "/ws/notifications", "tok-alice", 1).await;
    let mut bob = connect(&server, "/ws", "tok-bob", 2).await;

    send(&mut bob, json!({"type": "message", "receiver_id": 1, "content": "ping me"})).await;
    assert_eq!(next_json(&mut bob).await["type"], "message");

    let event = next_json(&mut alice_notifications).await;
    assert_eq!(event["type"], "notification");
    assert_eq!(event["notification"]["type"], "message");
    assert_eq!(event["notification"]["content"], "New message from bob");
    assert_eq!(store.notifications().await.len(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_upgrade_without_credentials_is_refused() {
    let server = start(seeded_store().await).await;

    let url = format!("ws://{}/ws", server.local_addr());
    match tokio_tungstenite::connect_async(url).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
        other => panic!("expected 401, got {other:?}"),
    }
    assert_eq!(server.chat().registry().count().await, 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_replaces_previous_connection() {
    let server = start(seeded_store().await).await;
    let mut first = connect(&server, "/ws", "tok-alice", 1).await;
    let first_id = server.chat().registry().connection_id(UserId(1)).await;

    let _second = tokio_tungstenite::connect_async(format!(
        "ws://{}/ws?token=tok-alice",
        server.local_addr()
    ))
    .await
    .unwrap();

    // the superseded socket is closed by the server
    let closed = tokio::time::timeout(WAIT, async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert_ne!(server.chat().registry().connection_id(UserId(1)).await, first_id);
    assert_eq!(server.chat().registry().count().await, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_clients() {
    let server = start(seeded_store().await).await;
    let mut alice = connect(&server, "/ws", "tok-alice", 1).await;

    server.shutdown().await;

    let closed = tokio::time::timeout(WAIT, async {
        loop {
            match alice.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}

#[tokio::test]
async fn test_silent_client_is_dropped_after_read_deadline() {
    let server = start_with(seeded_store().await, short_keepalive()).await;
    // never polled again, so the server's pings go unanswered
    let _silent = connect(&server, "/ws", "tok-alice", 1).await;

    let dropped = tokio::time::timeout(WAIT, async {
        while server.chat().registry().is_online(UserId(1)).await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(dropped.is_ok());
    assert_eq!(server.chat().registry().count().await, 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_answering_pings_stays_online() {
    let server = start_with(seeded_store().await, short_keepalive()).await;
    let mut bob = connect(&server, "/ws", "tok-bob", 2).await;
    let first_id = server.chat().registry().connection_id(UserId(2)).await;

    // reading lets tungstenite answer each ping with a pong
    let reader = tokio::spawn(async move { while let Some(Ok(_)) = bob.next().await {} });

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(server.chat().registry().is_online(UserId(2)).await);
    assert_eq!(server.chat().registry().connection_id(UserId(2)).await, first_id);

    reader.abort();
    server.shutdown().await;
}
