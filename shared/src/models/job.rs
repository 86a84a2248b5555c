use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One unit of background work: generate the AI reply to `user_message`.
///
/// Transient; lives only inside the job queue and has no identity visible to
/// clients beyond the room its events are published to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub conversation_id: Uuid,
    pub character_id: Uuid,
    pub user_id: String,
    pub user_message: String,
}
