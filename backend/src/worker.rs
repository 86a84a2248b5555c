//! The generation worker: consumes one queued job, drives the completion
//! stream, republishes tokens to the job's room, and persists the reply.
//!
//! Lifecycle per job: look up conversation and character, stream tokens while
//! publishing `partial_response` events, stop at the token ceiling, persist
//! exactly one AI message, publish `response_complete`. Any failure after
//! startup degrades to a best-effort `error` event; nothing ever propagates
//! out of [`run_job`], so a failing job can never take down the pool.

use crate::completion::CompletionClient;
use crate::dbs::{Database, DbError};
use crate::realtime::{ChannelError, RealtimeChannel, Room};
use futures::StreamExt;
use shared::models::{ChatMessage, GenerationJob, Role, RoomEvent};
use std::sync::Arc;
use thiserror::Error;

/// Hard ceiling on tokens consumed per reply. Reaching it truncates the
/// reply; it is not an error.
pub const MAX_TOKENS_PER_REPLY: usize = 1000;

/// Message published with the `error` event. Deliberately generic; details
/// stay in the logs.
const GENERATION_FAILED: &str = "An error occurred while generating the AI response.";

/// Dependencies injected into every job. Trait objects so tests can
/// substitute in-memory fakes for all three collaborators.
pub struct WorkerContext {
    pub db: Arc<dyn Database>,
    pub completion: Arc<dyn CompletionClient>,
    pub channel: Arc<dyn RealtimeChannel>,
}

#[derive(Error, Debug)]
enum JobError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Run one generation job to completion. Never returns an error and never
/// panics on collaborator failure.
pub async fn run_job(ctx: &WorkerContext, job: GenerationJob) {
    let room = Room::new(&job.user_id, job.character_id);
    if let Err(e) = try_run(ctx, &job, &room).await {
        tracing::error!(
            conversation_id = %job.conversation_id,
            character_id = %job.character_id,
            error = %e,
            "generation job failed"
        );
        let event = RoomEvent::Error {
            error: GENERATION_FAILED.to_string(),
        };
        if let Err(publish_err) = ctx.channel.publish(&room, event).await {
            tracing::error!(room = %room, error = %publish_err, "failed to publish error event");
        }
    }
}

async fn try_run(ctx: &WorkerContext, job: &GenerationJob, room: &Room) -> Result<(), JobError> {
    // Lookup failures mean the job references state that no longer exists;
    // there is nothing useful to tell the room, so terminate quietly.
    let conversation = match ctx.db.get_conversation(job.conversation_id).await {
        Ok(c) => c,
        Err(DbError::NotFound(_)) => {
            tracing::error!(
                conversation_id = %job.conversation_id,
                character_id = %job.character_id,
                "conversation not found, dropping job"
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let character = match ctx.db.get_character(job.character_id, &job.user_id).await {
        Ok(c) => c,
        Err(DbError::NotFound(_)) => {
            tracing::error!(
                conversation_id = %job.conversation_id,
                character_id = %job.character_id,
                "character not found, dropping job"
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let mut stream = ctx.completion.generate(&character, &job.user_message);
    let mut reply = String::new();
    let mut token_count = 0usize;

    while let Some(token) = stream.next().await {
        reply.push_str(&token);
        token_count += 1;

        // A failed partial publish must not cost us the transcript; the
        // accumulated reply is still persisted below.
        if let Err(e) = ctx
            .channel
            .publish(room, RoomEvent::PartialResponse { token })
            .await
        {
            tracing::warn!(room = %room, error = %e, "failed to publish partial token");
        }

        if token_count >= MAX_TOKENS_PER_REPLY {
            tracing::warn!(
                conversation_id = %conversation.id,
                "token ceiling reached, truncating reply"
            );
            break;
        }
    }
    drop(stream);

    // Exactly one durable append per job.
    ctx.db
        .append_message(conversation.id, ChatMessage::new(Role::Ai, reply.clone()))
        .await?;

    ctx.channel
        .publish(
            room,
            RoomEvent::ResponseComplete {
                role: Role::Ai,
                content: reply,
            },
        )
        .await?;

    tracing::debug!(conversation_id = %conversation.id, tokens = token_count, "reply generated");
    Ok(())
}
