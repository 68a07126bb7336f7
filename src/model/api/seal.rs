use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::common::{AdminId, ElectionId};

/// Returned when an election is sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealResult {
    pub election_id: ElectionId,
    pub seal_hash: String,
    pub sealed_at: DateTime<Utc>,
    pub sealed_by: AdminId,
    pub message: String,
}

/// Body of a seal verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifySealRequest {
    pub seal_hash: String,
}

/// Outcome of comparing a provided seal hash against the stored seal and a
/// fresh recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub is_valid: bool,
    pub stored_hash: String,
    pub recomputed_hash: String,
    pub sealed_at: DateTime<Utc>,
    pub message: String,
}
