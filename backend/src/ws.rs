//! WebSocket fanout: the subscriber-facing end of the realtime channel.
//!
//! A client opens one socket per character it is chatting with; the
//! connection subscribes to the caller's room and forwards every event as a
//! JSON text frame. Inbound frames are ignored — the socket is delivery-only.

use crate::AppState;
use crate::handlers::UserId;
use crate::realtime::Room;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use uuid::Uuid;

pub async fn room_ws(
    ws: WebSocketUpgrade,
    user: UserId,
    Path(character_id): Path<Uuid>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let room = Room::new(&user.0, character_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, room))
}

async fn handle_socket(socket: WebSocket, state: AppState, room: Room) {
    tracing::info!(room = %room, "WebSocket subscriber connected");

    let mut rx = state.hub.subscribe(&room);
    let (mut sink, mut stream) = socket.split();

    // Sender task: forward room events to the socket until either side drops.
    let send_room = room.clone();
    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Fire-and-forget channel: a slow client just loses events.
                    tracing::debug!(room = %send_room, skipped, "subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Inbound loop: only watch for close/errors.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(room = %room, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    send_task.abort();
    tracing::info!(room = %room, "WebSocket subscriber disconnected");
}
