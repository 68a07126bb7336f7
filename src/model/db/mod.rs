//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in a DB-friendly way, e.g.:
//!
//! - Datetimes that are sorted or range-queried are stored as BSON datetimes,
//!   at millisecond precision.
//! - Collaborator records (voters, elections, positions, candidates) use
//!   their integer ID as `_id`.

pub mod audit;
pub mod ballot;
pub mod election;
pub mod receipt;
pub mod seal;
pub mod voter;
pub mod zero_report;

pub use audit::{Actor, AuditOutcome, AuditRecord};
pub use ballot::SealedBallot;
pub use election::{Candidate, Election, Position};
pub use receipt::VoteReceipt;
pub use seal::{ElectionSeal, SealSnapshot};
pub use voter::Voter;
pub use zero_report::ZeroReport;
