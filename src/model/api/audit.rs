use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{AdminId, CandidateId, ElectionId, PositionId, VoteType, VoterId},
    db::{Election, Position, SealedBallot, Voter},
};

/// Whether an audit trail should break ballot secrecy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecryptionRequest {
    /// Metadata only.
    None,
    /// Decrypt every ballot on behalf of this administrator. The request is
    /// itself audited before anything is decrypted.
    Authorized { admin_id: AdminId },
}

/// Ways a stored ballot can fail verification.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityViolation {
    /// The MAC over the vote hash and ciphertext does not verify.
    SignatureMismatch,
    /// The row-level creation hash does not match the stored fields.
    CreationHashMismatch,
    /// The ballot was cast under a seal that is not the election's current one.
    SealHashMismatch,
    /// The ballot's seal no longer verifies against the election's state.
    SealInvalidated,
    /// The vote hash does not match the ballot's contents, e.g. because its
    /// vote type was edited.
    VoteHashMismatch,
    /// The payload cannot be decrypted under the ballot's own seal.
    Undecryptable,
}

/// The decrypted content of a ballot, only present on authorized trails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedContent {
    pub candidate_id: Option<CandidateId>,
    pub candidate_name: Option<String>,
    pub justification: Option<String>,
    /// Set instead of the fields above when decryption failed.
    pub error: Option<String>,
}

/// One ballot in an audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub vote_id: String,
    pub position_id: PositionId,
    pub vote_type: VoteType,
    pub voted_at: DateTime<Utc>,
    pub vote_weight: Decimal,
    pub vote_hash: String,
    pub ip_address: String,
    pub user_agent: String,
    pub device_fingerprint: String,
    pub election_seal_hash: String,
    /// Empty when the ballot verifies.
    pub violations: Vec<IntegrityViolation>,
    pub decrypted: Option<DecryptedContent>,
}

impl AuditEntry {
    pub fn new(ballot: &SealedBallot, violations: Vec<IntegrityViolation>) -> Self {
        Self {
            vote_id: ballot.vote_id.clone(),
            position_id: ballot.position_id,
            vote_type: ballot.vote_type,
            voted_at: ballot.voted_at,
            vote_weight: ballot.vote_weight,
            vote_hash: ballot.vote_hash.clone(),
            ip_address: ballot.ip_address.clone(),
            user_agent: ballot.user_agent.clone(),
            device_fingerprint: ballot.device_fingerprint.clone(),
            election_seal_hash: ballot.election_seal_hash.clone(),
            violations,
            decrypted: None,
        }
    }

    pub fn is_flagged(&self) -> bool {
        !self.violations.is_empty()
    }
}

/// A ballot that failed at least one integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedBallot {
    pub vote_id: String,
    pub position_id: PositionId,
    pub violations: Vec<IntegrityViolation>,
}

/// Result of checking every valid ballot of an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub election_id: ElectionId,
    pub checked: u64,
    pub flagged: Vec<FlaggedBallot>,
    pub generated_at: DateTime<Utc>,
}

impl IntegrityReport {
    pub fn is_intact(&self) -> bool {
        self.flagged.is_empty()
    }
}

/// A stored ballot with its related records, for audit use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotDetails {
    pub ballot: AuditEntry,
    pub voter_id: VoterId,
    pub voter_name: Option<String>,
    pub election: Option<ElectionSummary>,
    pub position_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub election_id: ElectionId,
    pub title: String,
}

impl BallotDetails {
    pub fn new(
        entry: AuditEntry,
        voter_id: VoterId,
        voter: Option<Voter>,
        election: Option<Election>,
        position: Option<Position>,
    ) -> Self {
        Self {
            ballot: entry,
            voter_id,
            voter_name: voter.map(|v| v.name),
            election: election.map(|e| ElectionSummary {
                election_id: e.id,
                title: e.title,
            }),
            position_name: position.map(|p| p.name),
        }
    }
}
