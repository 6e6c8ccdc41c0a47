#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use quiz_api::config::Config;
use quiz_api::db::kv::{KeyValueStore, MemoryStore};
use quiz_api::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build an app state backed by `kv` with its relay listening.
pub async fn test_state_with(kv: Arc<MemoryStore>, instance_id: &str) -> AppState {
    let config = Config {
        instance_id: instance_id.to_string(),
        ..Config::default()
    };
    let state = AppState::new(config, Some(kv as Arc<dyn KeyValueStore>));
    state.start_relay().await.expect("start relay");
    state
}

/// A single instance over its own in-memory store.
pub async fn test_state() -> AppState {
    test_state_with(Arc::new(MemoryStore::new()), "inst_test").await
}

pub fn test_app(state: &AppState) -> Router {
    quiz_api::routes::router().with_state(state.clone())
}

/// Serve the app on an ephemeral port.
pub async fn start_server(state: &AppState) -> SocketAddr {
    let app = test_app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

pub async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");
    ws
}

pub async fn send(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Next text frame as JSON, or `None` if nothing arrives within `wait`.
pub async fn recv_within(ws: &mut WsClient, wait: Duration) -> Option<serde_json::Value> {
    loop {
        let msg = time::timeout(wait, ws.next()).await.ok()??.ok()?;
        match msg {
            Message::Text(text) => return Some(serde_json::from_str(&text).expect("json frame")),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

pub async fn recv(ws: &mut WsClient) -> serde_json::Value {
    recv_within(ws, Duration::from_secs(5))
        .await
        .expect("timed out waiting for frame")
}

/// Skip frames until one of type `kind` arrives.
pub async fn recv_type(ws: &mut WsClient, kind: &str) -> serde_json::Value {
    loop {
        let frame = recv(ws).await;
        if frame["type"] == kind {
            return frame;
        }
    }
}

/// Join over the socket; returns the new user id after `join_success` and
/// `quiz_state` have been read.
pub async fn join(ws: &mut WsClient, quiz_id: &str, name: &str) -> String {
    send(
        ws,
        serde_json::json!({"type": "join_quiz", "payload": {"quiz_id": quiz_id, "name": name}}),
    )
    .await;
    let success = recv_type(ws, "join_success").await;
    recv_type(ws, "quiz_state").await;
    success["payload"]["user_id"].as_str().unwrap().to_string()
}
