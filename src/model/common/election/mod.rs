mod state;

pub use state::ElectionStatus;

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// What a seal record anchors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SealType {
    /// Taken when an election is sealed; its hash keys every ballot.
    ElectionSeal,
    /// Taken alongside a published report.
    ReportSeal,
}

impl From<SealType> for Bson {
    fn from(seal_type: SealType) -> Self {
        to_bson(&seal_type).expect("Serialisation is infallible")
    }
}
