//! Keyless one-way hashes. Every input is rendered into a canonical string
//! first, so the same inputs always reproduce the same hash.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use data_encoding::HEXUPPER;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::model::common::{CandidateId, ElectionId, VoterId};

/// Datetime layout used inside every hashed string: millisecond precision.
pub const HASH_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Upper-case hex SHA-256 of a string.
pub fn sha256_hex(input: &str) -> String {
    HEXUPPER.encode(&Sha256::digest(input.as_bytes()))
}

/// Integrity anchor of a ballot, independent of its ciphertext.
/// Blank and null ballots hash with candidate `0`.
pub fn vote_hash(
    vote_id: &str,
    voter_id: VoterId,
    candidate_id: Option<CandidateId>,
    voted_at: DateTime<Utc>,
) -> String {
    sha256_hex(&format!(
        "{}-{}-{}-{}",
        vote_id,
        voter_id,
        candidate_id.unwrap_or(0),
        voted_at.format(HASH_DATETIME_FORMAT)
    ))
}

/// Row-level hash of a ballot's identity fields and weight. The weight is
/// normalised, so `2.5` and `2.50` hash alike.
pub fn creation_hash(
    vote_id: &str,
    voter_id: VoterId,
    election_id: ElectionId,
    vote_weight: Decimal,
    created_at: DateTime<Utc>,
) -> String {
    sha256_hex(&format!(
        "{}-{}-{}-{}-{}",
        vote_id,
        voter_id,
        election_id,
        vote_weight.normalize(),
        created_at.format(HASH_DATETIME_FORMAT)
    ))
}

/// Voter-facing hash printed on a receipt.
pub fn receipt_hash(vote_id: &str, receipt_token: &str, voted_at: DateTime<Utc>) -> String {
    sha256_hex(&format!(
        "{}-{}-{}",
        vote_id,
        receipt_token,
        voted_at.format(HASH_DATETIME_FORMAT)
    ))
}

/// Hash of request metadata, `IP:..|UA:..|k:v|` with extra keys sorted.
pub fn device_fingerprint(
    user_agent: &str,
    ip_address: &str,
    extra: &BTreeMap<String, String>,
) -> String {
    let mut data = format!("IP:{}|UA:{}|", ip_address, user_agent);
    for (key, value) in extra {
        data.push_str(key);
        data.push(':');
        data.push_str(value);
        data.push('|');
    }
    sha256_hex(&data)
}
