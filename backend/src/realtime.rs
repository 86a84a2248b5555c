//! Room-scoped broadcast fanout for generation events.
//!
//! Workers publish through the [`RealtimeChannel`] trait; the WebSocket
//! endpoint subscribes through [`BroadcastHub`]. Delivery is fire-and-forget:
//! events published to a room with no connected subscribers are dropped and
//! there is no replay.

use async_trait::async_trait;
use shared::models::RoomEvent;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Buffer capacity per room before slow subscribers start lagging.
const ROOM_CAPACITY: usize = 256;

/// A logical broadcast channel scoped to one (user, character) pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Room(String);

impl Room {
    pub fn new(user_id: &str, character_id: Uuid) -> Self {
        Self(format!("chat_{user_id}_{character_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("broadcast backbone unavailable: {0}")]
    Unavailable(String),
}

/// Publisher seam between the worker pool and whatever delivers events to
/// connected clients. A cross-process deployment would implement this over an
/// external broker; the in-process [`BroadcastHub`] is the shipped backbone.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn publish(&self, room: &Room, event: RoomEvent) -> Result<(), ChannelError>;
}

/// In-process fanout hub: one `tokio::sync::broadcast` channel per room.
///
/// Senders are created lazily on first publish or subscribe and kept for the
/// lifetime of the hub, so publishers and subscribers converge on the same
/// channel regardless of who arrives first.
pub struct BroadcastHub {
    rooms: RwLock<HashMap<String, broadcast::Sender<RoomEvent>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to all events published to `room` from now on.
    pub fn subscribe(&self, room: &Room) -> broadcast::Receiver<RoomEvent> {
        self.sender(room).subscribe()
    }

    fn sender(&self, room: &Room) -> broadcast::Sender<RoomEvent> {
        if let Some(tx) = self.rooms.read().expect("room map poisoned").get(room.as_str()) {
            return tx.clone();
        }
        let mut rooms = self.rooms.write().expect("room map poisoned");
        rooms
            .entry(room.as_str().to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .clone()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeChannel for BroadcastHub {
    async fn publish(&self, room: &Room, event: RoomEvent) -> Result<(), ChannelError> {
        // A send error only means zero receivers; fire-and-forget drops it.
        let _ = self.sender(room).send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_is_deterministic() {
        let character = Uuid::new_v4();
        let a = Room::new("auth0|alice", character);
        let b = Room::new("auth0|alice", character);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), format!("chat_auth0|alice_{character}"));
    }

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let hub = BroadcastHub::new();
        let room = Room::new("u1", Uuid::new_v4());
        let mut rx = hub.subscribe(&room);

        for token in ["a", "b", "c"] {
            hub.publish(&room, RoomEvent::PartialResponse { token: token.into() })
                .await
                .unwrap();
        }

        for expected in ["a", "b", "c"] {
            match rx.recv().await.unwrap() {
                RoomEvent::PartialResponse { token } => assert_eq!(token, expected),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn rooms_are_isolated_between_users() {
        let hub = BroadcastHub::new();
        let character = Uuid::new_v4();
        let room_a = Room::new("user_a", character);
        let room_b = Room::new("user_b", character);

        let mut rx_b = hub.subscribe(&room_b);
        hub.publish(&room_a, RoomEvent::PartialResponse { token: "secret".into() })
            .await
            .unwrap();

        assert!(matches!(
            rx_b.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped_silently() {
        let hub = BroadcastHub::new();
        let room = Room::new("nobody", Uuid::new_v4());
        hub.publish(&room, RoomEvent::Error { error: "x".into() })
            .await
            .unwrap();

        // A later subscriber sees nothing: no replay.
        let mut rx = hub.subscribe(&room);
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
