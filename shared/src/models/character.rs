use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Open-ended key/value traits, rendered verbatim into the system prompt.
    /// Sorted map so prompt rendering is deterministic.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub avatar: Option<String>,
    /// Opaque external subject id of the owner.
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Character {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        attributes: BTreeMap<String, String>,
        user_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            attributes,
            avatar: None,
            user_id: user_id.into(),
            created_at: now,
            updated_at: now,
        }
    }
}
