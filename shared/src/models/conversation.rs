use super::message::ChatMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of messages returned per page by the conversation read endpoint.
pub const PAGE_SIZE: usize = 20;

/// The message log for one (user, character) pair. At most one exists per
/// pair; it is created lazily on the first message and only ever appended to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub character_id: Uuid,
    pub user_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(user_id: impl Into<String>, character_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            character_id,
            user_id: user_id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

// Request/response payloads

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SendMessageRequest {
    pub character_id: Uuid,
    pub message: String,
}

/// One page of a conversation, newest message first.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ConversationPage {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
}
