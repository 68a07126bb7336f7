//! Storage and collaborator interfaces the services are written against.
//!
//! The services only ever hold `Arc<dyn Trait>` handles, so the same
//! workflow runs over MongoDB in production and over in-memory maps in tests.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use mongodb::error::Error as DbError;
use thiserror::Error;

use crate::model::{
    common::{AdminId, CandidateId, ElectionId, PositionId, SealType, VoterId},
    db::{
        AuditRecord, Candidate, Election, ElectionSeal, Position, SealedBallot, VoteReceipt, Voter,
        ZeroReport,
    },
};

pub mod mongo;

#[cfg(test)]
pub mod memory;

pub use mongo::MongoStore;

/// Storage faults, plus the uniqueness violations callers must react to.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A valid ballot already exists for this voter and election.
    #[error("Voter {voter_id} already has a ballot in election {election_id}")]
    DuplicateVote {
        voter_id: VoterId,
        election_id: ElectionId,
    },
    /// Some other unique key was already taken.
    #[error("Duplicate {0}")]
    Duplicate(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence of sealed ballots.
#[rocket::async_trait]
pub trait BallotStore: Send + Sync {
    /// Insert a new ballot. Fails with [`StoreError::DuplicateVote`] if a
    /// valid ballot already exists for the same voter and election; this
    /// check is atomic with the insert.
    async fn create_ballot(&self, ballot: SealedBallot) -> StoreResult<SealedBallot>;

    async fn has_voted(&self, voter_id: VoterId, election_id: ElectionId) -> StoreResult<bool>;

    /// Valid ballots, oldest first.
    async fn list_by_election(&self, election_id: ElectionId) -> StoreResult<Vec<SealedBallot>>;

    /// Valid ballots for one position, oldest first.
    async fn list_by_position(
        &self,
        election_id: ElectionId,
        position_id: PositionId,
    ) -> StoreResult<Vec<SealedBallot>>;

    /// One page of valid ballots, ordered by `voted_at` then `vote_id`, for
    /// bulk processing without loading the whole election.
    async fn ballots_page(
        &self,
        election_id: ElectionId,
        position_id: Option<PositionId>,
        skip: u64,
        limit: u64,
    ) -> StoreResult<Vec<SealedBallot>>;

    async fn count_by_election(&self, election_id: ElectionId) -> StoreResult<u64>;

    async fn count_by_position(
        &self,
        election_id: ElectionId,
        position_id: PositionId,
    ) -> StoreResult<u64>;

    /// A valid ballot by its vote ID.
    async fn get_by_id(&self, vote_id: &str) -> StoreResult<Option<SealedBallot>>;

    /// Recompute a ballot's creation hash. Returns `false`, not an error, when
    /// the hash does not match or the ballot does not exist.
    async fn validate_integrity(&self, vote_id: &str) -> StoreResult<bool> {
        Ok(self
            .get_by_id(vote_id)
            .await?
            .map(|ballot| ballot.creation_hash_matches())
            .unwrap_or(false))
    }
}

/// Append-only seal records.
#[rocket::async_trait]
pub trait SealStore: Send + Sync {
    async fn insert_seal(&self, seal: ElectionSeal) -> StoreResult<()>;

    /// The newest seal of the given type, by `sealed_at`.
    async fn latest_seal(
        &self,
        election_id: ElectionId,
        seal_type: SealType,
    ) -> StoreResult<Option<ElectionSeal>>;
}

#[rocket::async_trait]
pub trait ReceiptStore: Send + Sync {
    async fn insert_receipt(&self, receipt: VoteReceipt) -> StoreResult<()>;

    async fn receipt_by_token(&self, receipt_token: &str) -> StoreResult<Option<VoteReceipt>>;
}

#[rocket::async_trait]
pub trait ZeroReportStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] if the election already has one.
    async fn insert_zero_report(&self, report: ZeroReport) -> StoreResult<()>;

    async fn zero_report(&self, election_id: ElectionId) -> StoreResult<Option<ZeroReport>>;
}

/// Read access to the records owned by the election manager, plus the one
/// write the sealing action performs on an election.
#[rocket::async_trait]
pub trait ElectionDirectory: Send + Sync {
    async fn voter(&self, voter_id: VoterId) -> StoreResult<Option<Voter>>;

    /// Every voter on the roll, active or not.
    async fn count_registered_voters(&self) -> StoreResult<u64>;

    async fn count_active_voters(&self) -> StoreResult<u64>;

    async fn election(&self, election_id: ElectionId) -> StoreResult<Option<Election>>;

    /// Atomically mark an unsealed election as sealed. Returns `false` if the
    /// election does not exist or was already sealed.
    async fn mark_sealed(
        &self,
        election_id: ElectionId,
        seal_hash: &str,
        sealed_at: DateTime<Utc>,
        sealed_by: AdminId,
    ) -> StoreResult<bool>;

    /// Positions of an election, by ID.
    async fn positions(&self, election_id: ElectionId) -> StoreResult<Vec<Position>>;

    /// A position, only if it belongs to the election.
    async fn position(
        &self,
        election_id: ElectionId,
        position_id: PositionId,
    ) -> StoreResult<Option<Position>>;

    /// Candidates standing for a position, by ID.
    async fn candidates(&self, position_id: PositionId) -> StoreResult<Vec<Candidate>>;

    /// A candidate, only if it stands for the position.
    async fn candidate(
        &self,
        position_id: PositionId,
        candidate_id: CandidateId,
    ) -> StoreResult<Option<Candidate>>;

    /// Candidates across every position of an election.
    async fn count_candidates(&self, election_id: ElectionId) -> StoreResult<u64>;
}

/// The external audit log.
#[rocket::async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditRecord) -> StoreResult<()>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Every storage handle a service may need.
#[derive(Clone)]
pub struct Stores {
    pub ballots: Arc<dyn BallotStore>,
    pub seals: Arc<dyn SealStore>,
    pub receipts: Arc<dyn ReceiptStore>,
    pub zero_reports: Arc<dyn ZeroReportStore>,
    pub directory: Arc<dyn ElectionDirectory>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

impl Stores {
    /// All stores backed by the one MongoDB database, on the wall clock.
    pub fn mongo(store: MongoStore) -> Self {
        let store = Arc::new(store);
        Self {
            ballots: store.clone(),
            seals: store.clone(),
            receipts: store.clone(),
            zero_reports: store.clone(),
            directory: store.clone(),
            audit: store,
            clock: Arc::new(SystemClock),
        }
    }

    /// The current time, truncated to the millisecond precision the database
    /// keeps, so hashes over it survive a round trip.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(3)
    }
}
