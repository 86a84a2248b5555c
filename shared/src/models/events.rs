use super::message::Role;
use serde::{Deserialize, Serialize};

/// Events delivered to clients subscribed to a room.
///
/// Serialized with an `event` discriminant so a single WebSocket text frame
/// carries both the event name and its payload, e.g.
/// `{"event":"partial_response","token":"Hi"}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoomEvent {
    /// One incremental fragment of the reply being generated.
    PartialResponse { token: String },
    /// The full assembled reply; the transcript has been persisted.
    ResponseComplete { role: Role, content: String },
    /// Generation failed after the job started.
    Error { error: String },
}
