pub mod completion;
pub mod config;
pub mod dbs;
pub mod handlers;
pub mod queue;
pub mod realtime;
pub mod worker;
pub mod ws;

use crate::dbs::Database;
use crate::handlers::{get_conversation, send_message};
use crate::queue::JobQueue;
use crate::realtime::BroadcastHub;
use crate::ws::room_ws;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub queue: Arc<dyn JobQueue>,
    /// Concrete hub rather than the publish trait: the WebSocket endpoint
    /// needs to subscribe, not just publish.
    pub hub: Arc<BroadcastHub>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/messages", post(send_message))
        .route("/api/conversations/{character_id}", get(get_conversation))
        .route("/api/rooms/{character_id}/ws", get(room_ws))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
