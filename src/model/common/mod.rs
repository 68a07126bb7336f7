//! Types shared between the database and API representations.

pub mod ballot;
pub mod election;

pub type VoterId = u32;
pub type ElectionId = u32;
pub type PositionId = u32;
pub type CandidateId = u32;
pub type AdminId = u32;

pub use ballot::{BallotPayload, VoteChoice, VoteType};
pub use election::{ElectionStatus, SealType};
