use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use rocket::serde::json::serde_json;
use serde::{Deserialize, Serialize};

use crate::crypto::digest::sha256_hex;
use crate::model::common::{AdminId, ElectionId, SealType};

/// An append-only seal record. The latest by `sealed_at` is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSeal {
    pub seal_hash: String,
    pub seal_type: SealType,
    pub election_id: ElectionId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub sealed_at: DateTime<Utc>,
    pub sealed_by: AdminId,
    /// The exact string `seal_hash` was computed over. Never regenerated.
    pub system_data: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_valid: bool,
}

impl ElectionSeal {
    /// Parse the stored snapshot back into its typed form.
    pub fn snapshot(&self) -> Result<SealSnapshot, serde_json::Error> {
        serde_json::from_str(&self.system_data)
    }
}

/// Election-wide state captured by a seal.
///
/// Fields serialize in declaration order, and the timestamp always renders
/// with exactly three fractional digits, so the same snapshot always produces
/// the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealSnapshot {
    pub election_id: ElectionId,
    pub title: String,
    pub registered_voter_count: u64,
    pub candidate_count: u64,
    pub cast_vote_count: u64,
    #[serde(with = "millis_rfc3339")]
    pub timestamp: DateTime<Utc>,
}

impl SealSnapshot {
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).expect("Serialisation is infallible")
    }

    pub fn hash(&self) -> String {
        sha256_hex(&self.canonical_json())
    }
}

mod millis_rfc3339 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use chrono::TimeZone;

    use super::*;

    impl SealSnapshot {
        pub fn example() -> Self {
            Self {
                election_id: 1,
                title: "Board election".to_string(),
                registered_voter_count: 120,
                candidate_count: 4,
                cast_vote_count: 0,
                timestamp: Utc.with_ymd_and_hms(2024, 10, 1, 9, 0, 0).unwrap()
                    + chrono::Duration::milliseconds(250),
            }
        }
    }
}
