//! HTTP handlers: message intake and the paginated conversation read.
//!
//! Intake appends the user's message synchronously (so it is visible on the
//! next read) and returns 202 as soon as the job is queued; the reply itself
//! only ever arrives through the realtime channel.

use crate::AppState;
use crate::dbs::DbError;
use axum::{
    Json,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
};
use serde::Deserialize;
use shared::models::{
    ChatMessage, ConversationPage, GenerationJob, Role, SendMessageRequest,
};
use uuid::Uuid;

/// Authenticated caller identity, taken from the `x-user-id` header placed
/// there by the external authentication layer. Absent header means 401.
pub struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(|s| UserId(s.to_string()))
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

fn internal(context: &str) -> impl Fn(DbError) -> StatusCode + '_ {
    move |e| {
        tracing::error!("{context}: {e:?}");
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

pub async fn send_message(
    State(state): State<AppState>,
    user: UserId,
    Json(payload): Json<SendMessageRequest>,
) -> Result<StatusCode, StatusCode> {
    if payload.message.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let character = state
        .db
        .get_character(payload.character_id, &user.0)
        .await
        .map_err(|e| match e {
            DbError::NotFound(_) => StatusCode::NOT_FOUND,
            e => {
                tracing::error!("Failed to look up character: {e:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    let conversation = state
        .db
        .get_or_create_conversation(&user.0, character.id)
        .await
        .map_err(internal("Failed to get or create conversation"))?;

    state
        .db
        .append_message(
            conversation.id,
            ChatMessage::new(Role::User, payload.message.clone()),
        )
        .await
        .map_err(internal("Failed to append user message"))?;

    state.queue.enqueue(GenerationJob {
        conversation_id: conversation.id,
        character_id: character.id,
        user_id: user.0,
        user_message: payload.message,
    });

    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
}

pub async fn get_conversation(
    State(state): State<AppState>,
    user: UserId,
    Path(character_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ConversationPage>, StatusCode> {
    let conversation = state
        .db
        .find_conversation(&user.0, character_id)
        .await
        .map_err(internal("Failed to look up conversation"))?;

    // No conversation yet: empty page, chatting hasn't started.
    let Some(conversation) = conversation else {
        return Ok(Json(ConversationPage {
            messages: Vec::new(),
            has_more: false,
        }));
    };

    let page = query.page.unwrap_or(1).max(1);
    let (messages, has_more) = state
        .db
        .page_messages(conversation.id, page)
        .await
        .map_err(internal("Failed to page messages"))?;

    Ok(Json(ConversationPage { messages, has_more }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbs::Database;
    use crate::dbs::local::LocalDatabase;
    use crate::queue::JobQueue;
    use crate::realtime::BroadcastHub;
    use crate::worker::tests::fixture;
    use shared::models::PAGE_SIZE;
    use std::sync::{Arc, Mutex};

    /// Queue fake capturing enqueued jobs instead of executing them.
    struct CapturingQueue {
        jobs: Mutex<Vec<GenerationJob>>,
    }

    impl CapturingQueue {
        fn new() -> Self {
            Self {
                jobs: Mutex::new(Vec::new()),
            }
        }
    }

    impl JobQueue for CapturingQueue {
        fn enqueue(&self, job: GenerationJob) {
            self.jobs.lock().unwrap().push(job);
        }
    }

    fn state(db: Arc<LocalDatabase>, queue: Arc<CapturingQueue>) -> AppState {
        AppState {
            db,
            queue,
            hub: Arc::new(BroadcastHub::new()),
        }
    }

    #[tokio::test]
    async fn intake_appends_user_message_and_enqueues_one_job() {
        let db = Arc::new(LocalDatabase::new());
        let (character, _) = fixture(&db, "alice").await;
        let queue = Arc::new(CapturingQueue::new());

        let status = send_message(
            State(state(db.clone(), queue.clone())),
            UserId("alice".to_string()),
            Json(SendMessageRequest {
                character_id: character.id,
                message: "hello".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);

        let jobs = queue.jobs.lock().unwrap().clone();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].user_message, "hello");

        // The user sees their own message immediately.
        let stored = db.get_conversation(jobs[0].conversation_id).await.unwrap();
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(stored.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn double_submit_yields_two_user_messages_and_two_jobs() {
        let db = Arc::new(LocalDatabase::new());
        let (character, _) = fixture(&db, "alice").await;
        let queue = Arc::new(CapturingQueue::new());
        let app_state = state(db.clone(), queue.clone());

        for _ in 0..2 {
            send_message(
                State(app_state.clone()),
                UserId("alice".to_string()),
                Json(SendMessageRequest {
                    character_id: character.id,
                    message: "are you there?".to_string(),
                }),
            )
            .await
            .unwrap();
        }

        let jobs = queue.jobs.lock().unwrap().clone();
        assert_eq!(jobs.len(), 2);
        // No deduplication, but both jobs target the same conversation.
        assert_eq!(jobs[0].conversation_id, jobs[1].conversation_id);

        let stored = db.get_conversation(jobs[0].conversation_id).await.unwrap();
        assert_eq!(stored.messages.len(), 2);
    }

    #[tokio::test]
    async fn unowned_character_is_not_found() {
        let db = Arc::new(LocalDatabase::new());
        let (character, _) = fixture(&db, "alice").await;
        let queue = Arc::new(CapturingQueue::new());

        let result = send_message(
            State(state(db, queue.clone())),
            UserId("mallory".to_string()),
            Json(SendMessageRequest {
                character_id: character.id,
                message: "hi".to_string(),
            }),
        )
        .await;
        assert_eq!(result.unwrap_err(), StatusCode::NOT_FOUND);
        assert!(queue.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_message_is_rejected_without_a_job() {
        let db = Arc::new(LocalDatabase::new());
        let (character, _) = fixture(&db, "alice").await;
        let queue = Arc::new(CapturingQueue::new());

        let result = send_message(
            State(state(db, queue.clone())),
            UserId("alice".to_string()),
            Json(SendMessageRequest {
                character_id: character.id,
                message: "   ".to_string(),
            }),
        )
        .await;
        assert_eq!(result.unwrap_err(), StatusCode::BAD_REQUEST);
        assert!(queue.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_before_first_message_returns_empty_page() {
        let db = Arc::new(LocalDatabase::new());
        let (character, _) = fixture(&db, "alice").await;
        // fixture creates the conversation; read as a user who never chatted.
        let queue = Arc::new(CapturingQueue::new());

        let Json(page) = get_conversation(
            State(state(db, queue)),
            UserId("bob".to_string()),
            Path(character.id),
            Query(PageQuery { page: None }),
        )
        .await
        .unwrap();
        assert!(page.messages.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn read_returns_newest_first_pages() {
        let db = Arc::new(LocalDatabase::new());
        let (character, conversation) = fixture(&db, "alice").await;
        for i in 0..25 {
            db.append_message(conversation.id, ChatMessage::new(Role::User, format!("m{i}")))
                .await
                .unwrap();
        }
        let queue = Arc::new(CapturingQueue::new());
        let app_state = state(db, queue);

        let Json(page) = get_conversation(
            State(app_state.clone()),
            UserId("alice".to_string()),
            Path(character.id),
            Query(PageQuery { page: Some(1) }),
        )
        .await
        .unwrap();
        assert_eq!(page.messages.len(), PAGE_SIZE);
        assert!(page.has_more);
        assert_eq!(page.messages[0].content, "m24");

        let Json(page2) = get_conversation(
            State(app_state),
            UserId("alice".to_string()),
            Path(character.id),
            Query(PageQuery { page: Some(2) }),
        )
        .await
        .unwrap();
        assert_eq!(page2.messages.len(), 5);
        assert!(!page2.has_more);
    }
}
