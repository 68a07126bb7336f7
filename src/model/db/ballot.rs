use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::crypto::digest;
use crate::model::common::{ElectionId, PositionId, VoteType, VoterId};

/// A cast ballot, exactly as stored. Never mutated after insertion apart from
/// soft invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBallot {
    /// Unique, assigned at cast time.
    pub vote_id: String,
    pub vote_type: VoteType,
    /// Nonce-prefixed AEAD ciphertext of the [`BallotPayload`](crate::model::common::BallotPayload).
    pub encrypted_payload: String,
    pub vote_hash: String,
    /// MAC over `vote_hash` and `encrypted_payload`.
    pub vote_signature: String,
    /// Snapshot of the voter's weight at cast time.
    pub vote_weight: Decimal,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub voted_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
    pub device_fingerprint: String,
    pub voter_id: VoterId,
    pub election_id: ElectionId,
    pub position_id: PositionId,
    pub encrypted_justification: Option<String>,
    pub creation_hash: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    /// Seal hash active when the ballot was cast. Its decryption key hangs
    /// off this value.
    pub election_seal_hash: String,
    pub is_valid: bool,
}

impl SealedBallot {
    /// Recompute the row-level creation hash from the stored identity fields
    /// and weight.
    pub fn creation_hash_matches(&self) -> bool {
        digest::creation_hash(
            &self.vote_id,
            self.voter_id,
            self.election_id,
            self.vote_weight,
            self.created_at,
        )
        .eq_ignore_ascii_case(&self.creation_hash)
    }
}
