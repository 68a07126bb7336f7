use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::common::{AdminId, ElectionId};

/// The pre-election attestation that nothing has been cast yet. At most one
/// exists per election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroReport {
    pub election_id: ElectionId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub generated_at: DateTime<Utc>,
    pub generated_by: AdminId,
    /// Serialized report body that `report_hash` covers.
    pub report_data: String,
    pub report_hash: String,
    pub total_registered_voters: u64,
    pub total_candidates: u64,
    pub total_positions: u64,
    pub total_votes: u64,
    pub ip_address: String,
}
