use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{
    AuditRecord, Candidate, Election, ElectionSeal, Position, SealedBallot, VoteReceipt, Voter,
    ZeroReport,
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MongoCollection for SealedBallot {
    const NAME: &'static str = "sealed_ballots";
}

impl MongoCollection for ElectionSeal {
    const NAME: &'static str = "election_seals";
}

impl MongoCollection for VoteReceipt {
    const NAME: &'static str = "vote_receipts";
}

impl MongoCollection for ZeroReport {
    const NAME: &'static str = "zero_reports";
}

impl MongoCollection for AuditRecord {
    const NAME: &'static str = "audit_log";
}

// Collaborator collections, owned by the election manager.
impl MongoCollection for Voter {
    const NAME: &'static str = "voters";
}

impl MongoCollection for Election {
    const NAME: &'static str = "elections";
}

impl MongoCollection for Position {
    const NAME: &'static str = "positions";
}

impl MongoCollection for Candidate {
    const NAME: &'static str = "candidates";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Sealed ballots. The first index is the storage-level guarantee of one
    // valid ballot per voter per election.
    let ballots = Coll::<SealedBallot>::from_db(db);
    let one_valid_ballot_per_voter = IndexModel::builder()
        .keys(doc! {"voter_id": 1, "election_id": 1})
        .options(
            IndexOptions::builder()
                .unique(true)
                .partial_filter_expression(doc! {"is_valid": true})
                .build(),
        )
        .build();
    let vote_id_index = IndexModel::builder()
        .keys(doc! {"vote_id": 1})
        .options(unique.clone())
        .build();
    let tally_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "position_id": 1, "voted_at": 1, "vote_id": 1})
        .build();
    ballots
        .create_indexes([one_valid_ballot_per_voter, vote_id_index, tally_index], None)
        .await?;

    // Seals are looked up newest-first per election and type.
    let seal_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "seal_type": 1, "sealed_at": -1})
        .build();
    Coll::<ElectionSeal>::from_db(db)
        .create_index(seal_index, None)
        .await?;

    let receipt_index = IndexModel::builder()
        .keys(doc! {"receipt_token": 1})
        .options(unique.clone())
        .build();
    Coll::<VoteReceipt>::from_db(db)
        .create_index(receipt_index, None)
        .await?;

    let zero_report_index = IndexModel::builder()
        .keys(doc! {"election_id": 1})
        .options(unique)
        .build();
    Coll::<ZeroReport>::from_db(db)
        .create_index(zero_report_index, None)
        .await?;

    let position_index = IndexModel::builder()
        .keys(doc! {"election_id": 1})
        .build();
    Coll::<Position>::from_db(db)
        .create_index(position_index, None)
        .await?;

    let candidate_index = IndexModel::builder()
        .keys(doc! {"position_id": 1})
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    Ok(())
}
