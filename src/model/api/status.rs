use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{CandidateId, ElectionId, ElectionStatus, PositionId},
    db::{Candidate, Position},
};

/// A voter's view of an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionStatusView {
    pub election_id: ElectionId,
    pub title: String,
    pub status: ElectionStatus,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub timezone: String,
    pub sealed: bool,
    pub sealed_at: Option<DateTime<Utc>>,
    pub can_vote: bool,
    pub has_voted: bool,
    pub message: String,
    pub positions: Vec<PositionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub position_id: PositionId,
    pub name: String,
    pub max_candidates: u32,
    pub candidates: Vec<CandidateSummary>,
}

impl PositionSummary {
    pub fn new(position: Position, candidates: Vec<Candidate>) -> Self {
        Self {
            position_id: position.id,
            name: position.name,
            max_candidates: position.max_candidates,
            candidates: candidates.into_iter().map(CandidateSummary::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub candidate_id: CandidateId,
    pub name: String,
    pub number: Option<String>,
}

impl From<Candidate> for CandidateSummary {
    fn from(candidate: Candidate) -> Self {
        Self {
            candidate_id: candidate.id,
            name: candidate.name,
            number: candidate.number,
        }
    }
}
