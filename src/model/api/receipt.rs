use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::common::ElectionId;

/// The human-readable receipt handed to a voter after a successful cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Opaque lookup token, unrelated to the internal vote ID.
    pub receipt_token: String,
    /// Hash the voter can keep as proof of casting.
    pub receipt_hash: String,
    pub voted_at: DateTime<Utc>,
    pub election_id: ElectionId,
    pub election_title: String,
    pub voter_name: String,
    /// Masked, e.g. `123.***.**01`.
    pub voter_cpf: String,
    pub vote_details: Vec<VoteDetail>,
}

/// What the voter chose, as printed on their receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDetail {
    pub position_name: String,
    pub candidate_name: Option<String>,
    pub candidate_number: Option<String>,
    pub is_blank: bool,
    pub is_null: bool,
}
