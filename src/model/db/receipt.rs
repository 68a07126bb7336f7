use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::common::{ElectionId, VoterId};

/// A voter-facing receipt, keyed by an opaque token that is unrelated to the
/// ballot's internal vote ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub receipt_token: String,
    /// Hash over the vote ID, token and cast time. Distinct from the ballot's
    /// own vote hash.
    pub receipt_hash: String,
    pub voter_id: VoterId,
    pub election_id: ElectionId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub voted_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
    /// The serialized human-readable receipt handed back to the voter.
    pub receipt_data: String,
}
