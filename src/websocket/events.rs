//! Events WebSocket handler
//!
//! Streams `ActivityEvent`s from the event bus to each connected client as
//! JSON. Slow clients lag and miss events rather than blocking execution.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::server::AppState;

/// WebSocket upgrade handler for /ws/events
pub async fn events_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();
    info!(%session_id, "Events WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let mut events = state.event_bus.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(%session_id, error = %e, "Failed to serialize event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(%session_id, missed, "Client lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            message = receiver.next() => match message {
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    // inbound payloads are ignored; this stream is one-way
                    debug!(%session_id, "Ignoring inbound message");
                }
                Some(Err(e)) => {
                    debug!(%session_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    info!(%session_id, "Events WebSocket disconnected");
}
