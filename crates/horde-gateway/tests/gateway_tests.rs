//! Integration tests for the gateway.
//!
//! Refusals are tested through the Axum `Router` directly via
//! `tower::ServiceExt`. The full connection path runs against a real
//! listener on an ephemeral port with a `tokio-tungstenite` client.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use horde_core::config::ServerConfig;
use horde_core::{
    Broadcaster, InboundMessage, OverflowPolicy, ShutdownSignal, inbound_channel,
};
use horde_gateway::router::build_router;
use horde_gateway::{AppState, Connector, WebSocketConnector, snapshot_on_connect, spawn_gateway};
use horde_types::{ServerMessage, ZombieMove};
use horde_world::WorldGrid;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tower::ServiceExt;

const ALLOWED: &str = "http://localhost:3000";

struct Fixture {
    broadcaster: Arc<Broadcaster<String>>,
    connector: Arc<WebSocketConnector>,
    inbound: mpsc::Receiver<InboundMessage>,
    shutdown: ShutdownSignal,
    config: ServerConfig,
}

fn fixture() -> Fixture {
    let broadcaster = Arc::new(Broadcaster::new(16, OverflowPolicy::Disconnect));
    let (inbound_tx, inbound) = inbound_channel(16);
    let shutdown = ShutdownSignal::new();
    let connector = Arc::new(WebSocketConnector::new(
        Arc::clone(&broadcaster),
        inbound_tx,
        shutdown.clone(),
    ));
    let config = ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
        allowed_origins: BTreeMap::from([(String::from(ALLOWED), true)]),
        ..ServerConfig::default()
    };
    Fixture {
        broadcaster,
        connector,
        inbound,
        shutdown,
        config,
    }
}

fn listen(fixture: &Fixture) {
    fixture
        .connector
        .listen_for_connections(snapshot_on_connect(&WorldGrid::new(30, 30)).unwrap())
        .unwrap();
}

fn upgrade_request(origin: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/zombie");
    if let Some(origin) = origin {
        builder = builder.header("origin", origin);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let f = fixture();
    let app = build_router(Arc::new(AppState::new(Arc::clone(&f.connector), &f.config)));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn upgrade_without_allowed_origin_is_forbidden() {
    let f = fixture();
    listen(&f);
    let app = build_router(Arc::new(AppState::new(Arc::clone(&f.connector), &f.config)));

    let missing = app.clone().oneshot(upgrade_request(None)).await.unwrap();
    assert_eq!(missing.status(), StatusCode::FORBIDDEN);

    let unknown = app
        .oneshot(upgrade_request(Some("http://evil.test")))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::FORBIDDEN);
    assert_eq!(f.connector.active_sessions(), 0);
}

#[tokio::test]
async fn upgrade_before_listening_is_unavailable() {
    let f = fixture();
    let app = build_router(Arc::new(AppState::new(Arc::clone(&f.connector), &f.config)));

    let response = app.oneshot(upgrade_request(Some(ALLOWED))).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn plain_request_is_not_upgraded() {
    let f = fixture();
    listen(&f);
    let app = build_router(Arc::new(AppState::new(Arc::clone(&f.connector), &f.config)));

    let response = app.oneshot(upgrade_request(Some(ALLOWED))).await.unwrap();
    assert!(response.status().is_client_error());
    assert_eq!(f.broadcaster.subscriber_count(), 0);
}

async fn next_text<S>(client: &mut S) -> String
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if message.is_text() {
            return message.to_text().unwrap().to_owned();
        }
    }
}

#[tokio::test]
async fn client_gets_snapshot_then_moves_until_shutdown() {
    let mut f = fixture();
    listen(&f);
    let state = Arc::new(AppState::new(Arc::clone(&f.connector), &f.config));
    let gateway = spawn_gateway(&f.config, state, f.shutdown.clone()).await.unwrap();
    let url = format!("ws://{}/zombie", gateway.local_addr);

    // No Origin header: refused during the handshake.
    assert!(tokio_tungstenite::connect_async(url.as_str()).await.is_err());

    let mut request = url.as_str().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("origin", HeaderValue::from_static(ALLOWED));
    let (mut client, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    let snapshot: Value = serde_json::from_str(&next_text(&mut client).await).unwrap();
    assert_eq!(snapshot["type"], "mapCreate");
    assert_eq!(snapshot["minX"], 0);
    assert_eq!(snapshot["maxX"], 30);
    assert_eq!(snapshot["maxY"], 30);

    let frame = ServerMessage::from(ZombieMove::new("1", 11, 6)).to_json().unwrap();
    let report = f.broadcaster.publish(frame.clone()).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(next_text(&mut client).await, frame);

    client.send(Message::text("hello")).await.unwrap();
    let inbound = tokio::time::timeout(Duration::from_secs(2), f.inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inbound.text, "hello");

    f.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(2), f.connector.stop())
        .await
        .unwrap();
    assert_eq!(f.broadcaster.subscriber_count(), 0);

    // The server closed the connection.
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    tokio::time::timeout(Duration::from_secs(2), gateway.task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn departing_client_is_unsubscribed() {
    let f = fixture();
    listen(&f);
    let state = Arc::new(AppState::new(Arc::clone(&f.connector), &f.config));
    let gateway = spawn_gateway(&f.config, state, f.shutdown.clone()).await.unwrap();

    let mut request = format!("ws://{}/zombie", gateway.local_addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("origin", HeaderValue::from_static(ALLOWED));
    let (mut client, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    let _snapshot = next_text(&mut client).await;
    assert_eq!(f.broadcaster.subscriber_count(), 1);

    client.close(None).await.unwrap();
    drop(client);

    tokio::time::timeout(Duration::from_secs(2), async {
        while f.connector.active_sessions() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(f.broadcaster.subscriber_count(), 0);

    // Publishing with nobody listening still succeeds.
    let report = f.broadcaster.publish(String::from("{}")).await.unwrap();
    assert_eq!(report.delivered, 0);

    f.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(2), gateway.task)
        .await
        .unwrap()
        .unwrap();
}
