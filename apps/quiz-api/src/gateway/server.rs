//! WebSocket upgrade handler and per-connection reader/writer tasks.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{self, Instant};

use crate::AppState;

use super::events::ServerMessage;
use super::handler::handle_text;
use super::hub::OutboundQueue;

/// Largest inbound frame accepted from a client.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024;

/// Interval between server pings. Must stay below [`READ_IDLE_TIMEOUT`].
const PING_INTERVAL: Duration = Duration::from_secs(54);

/// A connection that sends nothing (pongs included) for this long is closed.
const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .max_frame_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (ws_tx, ws_rx) = socket.split();
    let (client_id, queue) = state.hub.register();
    tracing::info!(%client_id, clients = state.hub.client_count(), "client connected");

    let mut writer = tokio::spawn(write_loop(ws_tx, queue, client_id.clone()));

    tokio::select! {
        _ = read_loop(&state, &client_id, ws_rx) => {}
        _ = &mut writer => {}
    }

    // Dropping the hub entry closes the queue, which ends the writer.
    state.hub.unregister(&client_id);
    tracing::info!(%client_id, "client disconnected");
}

async fn read_loop(state: &AppState, client_id: &str, mut ws_rx: SplitStream<WebSocket>) {
    loop {
        let msg = match time::timeout(READ_IDLE_TIMEOUT, ws_rx.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                tracing::debug!(?e, %client_id, "ws read error");
                return;
            }
            Ok(None) => return,
            Err(_) => {
                tracing::debug!(%client_id, "read idle timeout; closing connection");
                return;
            }
        };

        match msg {
            Message::Text(text) => handle_text(state, client_id, text.as_str()).await,
            Message::Binary(_) => {
                state
                    .hub
                    .send_to(client_id, &ServerMessage::error("Binary frames are not supported"));
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return,
        }
    }
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut queue: OutboundQueue,
    client_id: String,
) {
    let mut ping = time::interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);

    loop {
        let frame = tokio::select! {
            next = queue.recv() => match next {
                Some(text) => Message::text(&*text),
                None => {
                    let _ = time::timeout(WRITE_TIMEOUT, ws_tx.send(Message::Close(None))).await;
                    return;
                }
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };

        match time::timeout(WRITE_TIMEOUT, ws_tx.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(?e, %client_id, "ws write error");
                return;
            }
            Err(_) => {
                tracing::debug!(%client_id, "ws write timed out");
                return;
            }
        }
    }
}
