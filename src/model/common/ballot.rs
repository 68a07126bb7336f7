use chrono::{DateTime, Utc};
use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

use super::CandidateId;

/// The kind of a cast ballot. Only candidate ballots carry a choice worth
/// decrypting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Candidate,
    Blank,
    Null,
}

impl From<VoteType> for Bson {
    fn from(vote_type: VoteType) -> Self {
        to_bson(&vote_type).expect("Serialisation is infallible")
    }
}

/// What a voter asked for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "candidate_id")]
pub enum VoteChoice {
    Candidate(CandidateId),
    Blank,
    Null,
}

impl VoteChoice {
    pub fn vote_type(&self) -> VoteType {
        match self {
            Self::Candidate(_) => VoteType::Candidate,
            Self::Blank => VoteType::Blank,
            Self::Null => VoteType::Null,
        }
    }

    pub fn candidate_id(&self) -> Option<CandidateId> {
        match self {
            Self::Candidate(id) => Some(*id),
            Self::Blank | Self::Null => None,
        }
    }
}

/// The plaintext sealed inside every ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotPayload {
    pub candidate_id: Option<CandidateId>,
    pub candidate_name: Option<String>,
    pub candidate_number: Option<String>,
    pub is_blank: bool,
    pub is_null: bool,
    pub encrypted_at: DateTime<Utc>,
    pub vote_id: String,
}

impl BallotPayload {
    pub fn blank(vote_id: String, encrypted_at: DateTime<Utc>) -> Self {
        Self {
            candidate_id: None,
            candidate_name: None,
            candidate_number: None,
            is_blank: true,
            is_null: false,
            encrypted_at,
            vote_id,
        }
    }

    pub fn null(vote_id: String, encrypted_at: DateTime<Utc>) -> Self {
        Self {
            is_blank: false,
            is_null: true,
            ..Self::blank(vote_id, encrypted_at)
        }
    }
}
