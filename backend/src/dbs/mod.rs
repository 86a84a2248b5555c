use async_trait::async_trait;
use shared::models::{Character, ChatMessage, Conversation};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub mod local;
pub mod postgres;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Clone, Debug)]
pub enum DatabaseConfig {
    /// In-memory store, optionally snapshotted to a JSON file.
    Local { path: Option<PathBuf> },
    Postgres { url: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Durable store for characters and conversation transcripts.
///
/// Appends are atomic pushes: two jobs writing to the same conversation
/// interleave but never lose each other's rows. `get_or_create_conversation`
/// converges concurrent callers on a single row per (user, character) pair.
#[async_trait]
pub trait Database: Send + Sync {
    async fn create_character(&self, character: Character) -> DbResult<()>;

    /// Fetch a character, scoped to its owner. `NotFound` covers both a
    /// missing id and a character owned by someone else.
    async fn get_character(&self, character_id: Uuid, user_id: &str) -> DbResult<Character>;

    /// The lazy-creation primitive: returns the existing conversation for
    /// the pair or atomically creates one.
    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        character_id: Uuid,
    ) -> DbResult<Conversation>;

    /// Read-only lookup for the pair; `None` when no message has ever been
    /// sent.
    async fn find_conversation(
        &self,
        user_id: &str,
        character_id: Uuid,
    ) -> DbResult<Option<Conversation>>;

    async fn get_conversation(&self, conversation_id: Uuid) -> DbResult<Conversation>;

    /// Durable append; the message is visible to reads once this returns.
    async fn append_message(&self, conversation_id: Uuid, message: ChatMessage) -> DbResult<()>;

    /// One page of messages, newest first, `PAGE_SIZE` per page (1-based).
    /// The flag reports whether further pages exist.
    async fn page_messages(
        &self,
        conversation_id: Uuid,
        page: usize,
    ) -> DbResult<(Vec<ChatMessage>, bool)>;
}

/// Open the backend selected by configuration.
pub async fn connect(config: &DatabaseConfig) -> DbResult<Arc<dyn Database>> {
    match config {
        DatabaseConfig::Local { path } => Ok(Arc::new(match path {
            Some(p) => local::LocalDatabase::load(p.clone()),
            None => local::LocalDatabase::new(),
        })),
        DatabaseConfig::Postgres { url } => {
            Ok(Arc::new(postgres::PostgresDatabase::new(url).await?))
        }
    }
}
