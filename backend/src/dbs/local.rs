use crate::dbs::{Database, DbError, DbResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::models::{Character, ChatMessage, Conversation, PAGE_SIZE};
use std::path::PathBuf;
use std::sync::RwLock;
use uuid::Uuid;

/// In-memory store with an optional JSON snapshot on disk.
///
/// Every mutation happens under one write lock, so check-and-insert in
/// `get_or_create_conversation` and the message push in `append_message`
/// are atomic. Doubles as the storage fake in tests.
pub struct LocalDatabase {
    inner: RwLock<Store>,
    snapshot: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Default)]
struct Store {
    characters: Vec<Character>,
    conversations: Vec<Conversation>,
}

impl LocalDatabase {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Store::default()),
            snapshot: None,
        }
    }

    /// Load from a snapshot file, starting empty if it is missing or
    /// unreadable.
    pub fn load(path: PathBuf) -> Self {
        let store = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Store::default(),
        };
        Self {
            inner: RwLock::new(store),
            snapshot: Some(path),
        }
    }

    fn save(&self, store: &Store) {
        let Some(path) = &self.snapshot else { return };
        match serde_json::to_string_pretty(store) {
            Ok(content) => {
                if let Err(e) = std::fs::write(path, content) {
                    tracing::error!(path = %path.display(), error = %e, "failed to write snapshot");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize snapshot"),
        }
    }
}

impl Default for LocalDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for LocalDatabase {
    async fn create_character(&self, character: Character) -> DbResult<()> {
        let mut store = self.inner.write().expect("store lock poisoned");
        store.characters.push(character);
        self.save(&store);
        Ok(())
    }

    async fn get_character(&self, character_id: Uuid, user_id: &str) -> DbResult<Character> {
        let store = self.inner.read().expect("store lock poisoned");
        store
            .characters
            .iter()
            .find(|c| c.id == character_id && c.user_id == user_id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("character {character_id}")))
    }

    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        character_id: Uuid,
    ) -> DbResult<Conversation> {
        // Single write lock across check and insert keeps concurrent callers
        // converging on one row.
        let mut store = self.inner.write().expect("store lock poisoned");
        if let Some(existing) = store
            .conversations
            .iter()
            .find(|c| c.user_id == user_id && c.character_id == character_id)
        {
            return Ok(existing.clone());
        }
        let conversation = Conversation::new(user_id, character_id);
        store.conversations.push(conversation.clone());
        self.save(&store);
        Ok(conversation)
    }

    async fn find_conversation(
        &self,
        user_id: &str,
        character_id: Uuid,
    ) -> DbResult<Option<Conversation>> {
        let store = self.inner.read().expect("store lock poisoned");
        Ok(store
            .conversations
            .iter()
            .find(|c| c.user_id == user_id && c.character_id == character_id)
            .cloned())
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> DbResult<Conversation> {
        let store = self.inner.read().expect("store lock poisoned");
        store
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("conversation {conversation_id}")))
    }

    async fn append_message(&self, conversation_id: Uuid, message: ChatMessage) -> DbResult<()> {
        let mut store = self.inner.write().expect("store lock poisoned");
        let conversation = store
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| DbError::NotFound(format!("conversation {conversation_id}")))?;
        conversation.messages.push(message);
        conversation.updated_at = chrono::Utc::now();
        self.save(&store);
        Ok(())
    }

    async fn page_messages(
        &self,
        conversation_id: Uuid,
        page: usize,
    ) -> DbResult<(Vec<ChatMessage>, bool)> {
        let store = self.inner.read().expect("store lock poisoned");
        let conversation = store
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| DbError::NotFound(format!("conversation {conversation_id}")))?;

        let page = page.max(1);
        let total = conversation.messages.len();
        let messages: Vec<ChatMessage> = conversation
            .messages
            .iter()
            .rev()
            .skip((page - 1) * PAGE_SIZE)
            .take(PAGE_SIZE)
            .cloned()
            .collect();
        let has_more = page * PAGE_SIZE < total;
        Ok((messages, has_more))
    }
}
