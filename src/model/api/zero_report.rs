use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::common::{AdminId, ElectionId, PositionId};

/// Body of the pre-election zero report. `report_hash` is computed over this
/// structure with the hash left empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroReportView {
    pub election_id: ElectionId,
    pub election_title: String,
    pub generated_at: DateTime<Utc>,
    pub generated_by: AdminId,
    pub total_registered_voters: u64,
    pub total_candidates: u64,
    pub total_positions: u64,
    pub total_votes: u64,
    pub positions: Vec<ZeroReportPosition>,
    #[serde(default)]
    pub report_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroReportPosition {
    pub position_id: PositionId,
    pub position_name: String,
    pub total_votes: u64,
    pub candidates: Vec<ZeroReportCandidate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroReportCandidate {
    pub candidate_name: String,
    pub candidate_number: Option<String>,
    pub vote_count: u64,
}
