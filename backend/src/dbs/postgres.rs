use crate::dbs::{Database, DbError, DbResult};
use async_trait::async_trait;
use serde_json::Value;
use shared::models::{Character, ChatMessage, Conversation, PAGE_SIZE, Role};
use sqlx::{Pool, Postgres, Row, postgres::PgPoolOptions};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Clone)]
pub struct PostgresDatabase {
    pool: Pool<Postgres>,
}

impl PostgresDatabase {
    pub async fn new(database_url: &str) -> DbResult<Self> {
        let pool = PgPoolOptions::new().connect(database_url).await?;
        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> DbResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS characters (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                attributes JSONB NOT NULL,
                avatar TEXT,
                user_id TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        // UNIQUE (user_id, character_id) backs the atomic get-or-create.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS conversations (
                id UUID PRIMARY KEY,
                character_id UUID NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                UNIQUE (user_id, character_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        // Messages are rows, one insert per append; the v7 UUID id carries
        // insertion order.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id UUID PRIMARY KEY,
                conversation_id UUID NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn character_from_row(row: &sqlx::postgres::PgRow) -> DbResult<Character> {
        let attrs_val: Value = row.get("attributes");
        let attributes: BTreeMap<String, String> = serde_json::from_value(attrs_val)?;
        Ok(Character {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            attributes,
            avatar: row.get("avatar"),
            user_id: row.get("user_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn message_from_row(row: &sqlx::postgres::PgRow) -> DbResult<ChatMessage> {
        let role_str: String = row.get("role");
        let role = Role::parse(&role_str)
            .ok_or_else(|| DbError::Internal(format!("unknown message role '{role_str}'")))?;
        Ok(ChatMessage {
            id: row.get("id"),
            role,
            content: row.get("content"),
        })
    }

    async fn conversation_row(&self, row: sqlx::postgres::PgRow) -> DbResult<Conversation> {
        let id: Uuid = row.get("id");
        let messages = self.messages_for(id).await?;
        Ok(Conversation {
            id,
            character_id: row.get("character_id"),
            user_id: row.get("user_id"),
            messages,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    async fn messages_for(&self, conversation_id: Uuid) -> DbResult<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT id, role, content FROM messages WHERE conversation_id = $1 ORDER BY id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::message_from_row).collect()
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn create_character(&self, character: Character) -> DbResult<()> {
        let attrs = serde_json::to_value(&character.attributes)?;
        sqlx::query(
            "INSERT INTO characters (id, name, description, attributes, avatar, user_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(character.id)
        .bind(&character.name)
        .bind(&character.description)
        .bind(attrs)
        .bind(&character.avatar)
        .bind(&character.user_id)
        .bind(character.created_at)
        .bind(character.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_character(&self, character_id: Uuid, user_id: &str) -> DbResult<Character> {
        let row = sqlx::query(
            "SELECT id, name, description, attributes, avatar, user_id, created_at, updated_at
             FROM characters WHERE id = $1 AND user_id = $2",
        )
        .bind(character_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("character {character_id}")))?;
        Self::character_from_row(&row)
    }

    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        character_id: Uuid,
    ) -> DbResult<Conversation> {
        // Conditional insert: concurrent callers race harmlessly, the unique
        // constraint makes all of them converge on one row.
        let now = chrono::Utc::now();
        sqlx::query(
            "INSERT INTO conversations (id, character_id, user_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $4)
             ON CONFLICT (user_id, character_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(character_id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_conversation(user_id, character_id)
            .await?
            .ok_or_else(|| {
                DbError::Internal(format!(
                    "conversation for user {user_id} and character {character_id} vanished after upsert"
                ))
            })
    }

    async fn find_conversation(
        &self,
        user_id: &str,
        character_id: Uuid,
    ) -> DbResult<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT id, character_id, user_id, created_at, updated_at
             FROM conversations WHERE user_id = $1 AND character_id = $2",
        )
        .bind(user_id)
        .bind(character_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.conversation_row(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> DbResult<Conversation> {
        let row = sqlx::query(
            "SELECT id, character_id, user_id, created_at, updated_at
             FROM conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("conversation {conversation_id}")))?;
        self.conversation_row(row).await
    }

    async fn append_message(&self, conversation_id: Uuid, message: ChatMessage) -> DbResult<()> {
        let result = sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content)
             SELECT $1, id, $3, $4 FROM conversations WHERE id = $2",
        )
        .bind(message.id)
        .bind(conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("conversation {conversation_id}")));
        }

        sqlx::query("UPDATE conversations SET updated_at = $1 WHERE id = $2")
            .bind(chrono::Utc::now())
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn page_messages(
        &self,
        conversation_id: Uuid,
        page: usize,
    ) -> DbResult<(Vec<ChatMessage>, bool)> {
        let page = page.max(1);
        // Fetch one row beyond the page to learn whether more pages exist.
        let rows = sqlx::query(
            "SELECT id, role, content FROM messages
             WHERE conversation_id = $1
             ORDER BY id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(conversation_id)
        .bind((PAGE_SIZE + 1) as i64)
        .bind(((page - 1) * PAGE_SIZE) as i64)
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() > PAGE_SIZE;
        rows.iter()
            .take(PAGE_SIZE)
            .map(Self::message_from_row)
            .collect::<DbResult<Vec<_>>>()
            .map(|messages| (messages, has_more))
    }
}
