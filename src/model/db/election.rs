use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::model::common::{AdminId, CandidateId, ElectionId, ElectionStatus, PositionId};

/// An election, as maintained by the election manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: ElectionId,
    pub title: String,
    pub status: ElectionStatus,
    /// Local wall-clock time in `timezone`.
    pub start_date: NaiveDateTime,
    /// Local wall-clock time in `timezone`.
    pub end_date: NaiveDateTime,
    /// IANA zone name, e.g. `America/Sao_Paulo`.
    pub timezone: String,
    pub is_sealed: bool,
    pub seal_hash: Option<String>,
    pub sealed_at: Option<DateTime<Utc>>,
    pub sealed_by: Option<AdminId>,
}

impl Election {
    /// The zone the election's dates are recorded in, if it is a known zone.
    pub fn tz(&self) -> Option<Tz> {
        self.timezone.parse().ok()
    }

    /// Start of voting in UTC.
    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        self.to_utc(self.start_date)
    }

    /// End of voting in UTC.
    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.to_utc(self.end_date)
    }

    fn to_utc(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        // Ambiguous local times (DST fall-back) resolve to the earlier instant.
        self.tz()?
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// A position (office) being contested in an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "_id")]
    pub id: PositionId,
    pub election_id: ElectionId,
    pub name: String,
    /// How many candidates win this position.
    pub max_candidates: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: CandidateId,
    pub position_id: PositionId,
    pub name: String,
    pub number: Option<String>,
}

/// Example data for tests.
#[cfg(test)]
pub(crate) mod examples {
    use chrono::NaiveDate;

    use super::*;

    impl Election {
        /// An active, unsealed election running for all of October 2024 in
        /// São Paulo time.
        pub fn example() -> Self {
            Self {
                id: 1,
                title: "Board election".to_string(),
                status: ElectionStatus::Active,
                start_date: NaiveDate::from_ymd_opt(2024, 10, 1)
                    .unwrap()
                    .and_hms_opt(8, 0, 0)
                    .unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 10, 31)
                    .unwrap()
                    .and_hms_opt(17, 0, 0)
                    .unwrap(),
                timezone: "America/Sao_Paulo".to_string(),
                is_sealed: false,
                seal_hash: None,
                sealed_at: None,
                sealed_by: None,
            }
        }
    }

    impl Position {
        pub fn example() -> Self {
            Self {
                id: 10,
                election_id: 1,
                name: "President".to_string(),
                max_candidates: 1,
            }
        }

        pub fn example2() -> Self {
            Self {
                id: 20,
                election_id: 1,
                name: "Treasurer".to_string(),
                max_candidates: 2,
            }
        }
    }

    impl Candidate {
        pub fn example() -> Self {
            Self {
                id: 100,
                position_id: 10,
                name: "Ana Souza".to_string(),
                number: Some("13".to_string()),
            }
        }

        pub fn example2() -> Self {
            Self {
                id: 101,
                position_id: 10,
                name: "Bruno Lima".to_string(),
                number: Some("22".to_string()),
            }
        }

        pub fn example3() -> Self {
            Self {
                id: 200,
                position_id: 20,
                name: "Carla Dias".to_string(),
                number: None,
            }
        }
    }
}
