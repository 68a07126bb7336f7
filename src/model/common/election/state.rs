use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the election lifecycle, as recorded by the election manager.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    /// Under construction.
    Draft,
    /// Configured and waiting for its start date.
    Scheduled,
    /// Open for sealing and, once sealed, for voting.
    Active,
    /// Voting has closed.
    Completed,
    Cancelled,
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
