use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::common::{AdminId, VoterId};

/// Who performed an audited action.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Actor {
    Voter(VoterId),
    Admin(AdminId),
    System,
}

impl Actor {
    fn split(self) -> (Option<u32>, &'static str) {
        match self {
            Self::Voter(id) => (Some(id), "voter"),
            Self::Admin(id) => (Some(id), "admin"),
            Self::System => (None, "system"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// One entry for the external audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub actor_id: Option<u32>,
    pub actor_type: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub details: String,
    pub outcome: AuditOutcome,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        actor: Actor,
        action: &str,
        entity_type: &str,
        entity_id: Option<String>,
        details: impl Into<String>,
        outcome: AuditOutcome,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let (actor_id, actor_type) = actor.split();
        Self {
            actor_id,
            actor_type: actor_type.to_string(),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            details: details.into(),
            outcome,
            recorded_at,
        }
    }
}
