use chrono::{DateTime, SecondsFormat, Utc};
use log::warn;
use mongodb::{
    bson::{doc, Bson, Document},
    options::{FindOneOptions, FindOptions},
    Database,
};
use rocket::futures::TryStreamExt;

use crate::model::{
    common::{AdminId, CandidateId, ElectionId, PositionId, SealType, VoterId},
    db::{
        AuditRecord, Candidate, Election, ElectionSeal, Position, SealedBallot, VoteReceipt, Voter,
        ZeroReport,
    },
    mongodb::{is_duplicate_key_error, Coll},
};

use super::{
    AuditSink, BallotStore, ElectionDirectory, ReceiptStore, SealStore, StoreError, StoreResult,
    ZeroReportStore,
};

/// Every store, backed by one MongoDB database.
pub struct MongoStore {
    ballots: Coll<SealedBallot>,
    seals: Coll<ElectionSeal>,
    receipts: Coll<VoteReceipt>,
    zero_reports: Coll<ZeroReport>,
    audit: Coll<AuditRecord>,
    voters: Coll<Voter>,
    elections: Coll<Election>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        Self {
            ballots: Coll::from_db(db),
            seals: Coll::from_db(db),
            receipts: Coll::from_db(db),
            zero_reports: Coll::from_db(db),
            audit: Coll::from_db(db),
            voters: Coll::from_db(db),
            elections: Coll::from_db(db),
            positions: Coll::from_db(db),
            candidates: Coll::from_db(db),
        }
    }
}

/// Filter for the valid ballots of an election, optionally of one position.
fn valid_ballots(election_id: ElectionId, position_id: Option<PositionId>) -> Document {
    let mut filter = doc! {
        "election_id": election_id,
        "is_valid": true,
    };
    if let Some(position_id) = position_id {
        filter.insert("position_id", position_id);
    }
    filter
}

/// Ballot processing order: oldest first, vote ID breaking ties.
fn ballot_order() -> Document {
    doc! {"voted_at": 1, "vote_id": 1}
}

#[rocket::async_trait]
impl BallotStore for MongoStore {
    async fn create_ballot(&self, ballot: SealedBallot) -> StoreResult<SealedBallot> {
        match self.ballots.insert_one(&ballot, None).await {
            Ok(_) => Ok(ballot),
            Err(err) if is_duplicate_key_error(&err) => {
                warn!(
                    "Unique index rejected ballot for voter {} in election {}",
                    ballot.voter_id, ballot.election_id
                );
                Err(StoreError::DuplicateVote {
                    voter_id: ballot.voter_id,
                    election_id: ballot.election_id,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn has_voted(&self, voter_id: VoterId, election_id: ElectionId) -> StoreResult<bool> {
        let filter = doc! {
            "voter_id": voter_id,
            "election_id": election_id,
            "is_valid": true,
        };
        Ok(self.ballots.find_one(filter, None).await?.is_some())
    }

    async fn list_by_election(&self, election_id: ElectionId) -> StoreResult<Vec<SealedBallot>> {
        let options = FindOptions::builder().sort(ballot_order()).build();
        let ballots = self
            .ballots
            .find(valid_ballots(election_id, None), options)
            .await?
            .try_collect()
            .await?;
        Ok(ballots)
    }

    async fn list_by_position(
        &self,
        election_id: ElectionId,
        position_id: PositionId,
    ) -> StoreResult<Vec<SealedBallot>> {
        let options = FindOptions::builder().sort(ballot_order()).build();
        let ballots = self
            .ballots
            .find(valid_ballots(election_id, Some(position_id)), options)
            .await?
            .try_collect()
            .await?;
        Ok(ballots)
    }

    async fn ballots_page(
        &self,
        election_id: ElectionId,
        position_id: Option<PositionId>,
        skip: u64,
        limit: u64,
    ) -> StoreResult<Vec<SealedBallot>> {
        let options = FindOptions::builder()
            .sort(ballot_order())
            .skip(skip)
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .build();
        let ballots = self
            .ballots
            .find(valid_ballots(election_id, position_id), options)
            .await?
            .try_collect()
            .await?;
        Ok(ballots)
    }

    async fn count_by_election(&self, election_id: ElectionId) -> StoreResult<u64> {
        Ok(self
            .ballots
            .count_documents(valid_ballots(election_id, None), None)
            .await?)
    }

    async fn count_by_position(
        &self,
        election_id: ElectionId,
        position_id: PositionId,
    ) -> StoreResult<u64> {
        Ok(self
            .ballots
            .count_documents(valid_ballots(election_id, Some(position_id)), None)
            .await?)
    }

    async fn get_by_id(&self, vote_id: &str) -> StoreResult<Option<SealedBallot>> {
        let filter = doc! {"vote_id": vote_id, "is_valid": true};
        Ok(self.ballots.find_one(filter, None).await?)
    }
}

#[rocket::async_trait]
impl SealStore for MongoStore {
    async fn insert_seal(&self, seal: ElectionSeal) -> StoreResult<()> {
        self.seals.insert_one(seal, None).await?;
        Ok(())
    }

    async fn latest_seal(
        &self,
        election_id: ElectionId,
        seal_type: SealType,
    ) -> StoreResult<Option<ElectionSeal>> {
        let filter = doc! {"election_id": election_id, "seal_type": seal_type};
        let options = FindOneOptions::builder()
            .sort(doc! {"sealed_at": -1})
            .build();
        Ok(self.seals.find_one(filter, options).await?)
    }
}

#[rocket::async_trait]
impl ReceiptStore for MongoStore {
    async fn insert_receipt(&self, receipt: VoteReceipt) -> StoreResult<()> {
        match self.receipts.insert_one(receipt, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key_error(&err) => {
                Err(StoreError::Duplicate("receipt token".to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn receipt_by_token(&self, receipt_token: &str) -> StoreResult<Option<VoteReceipt>> {
        let filter = doc! {"receipt_token": receipt_token};
        Ok(self.receipts.find_one(filter, None).await?)
    }
}

#[rocket::async_trait]
impl ZeroReportStore for MongoStore {
    async fn insert_zero_report(&self, report: ZeroReport) -> StoreResult<()> {
        let election_id = report.election_id;
        match self.zero_reports.insert_one(report, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key_error(&err) => Err(StoreError::Duplicate(format!(
                "zero report for election {election_id}"
            ))),
            Err(err) => Err(err.into()),
        }
    }

    async fn zero_report(&self, election_id: ElectionId) -> StoreResult<Option<ZeroReport>> {
        let filter = doc! {"election_id": election_id};
        Ok(self.zero_reports.find_one(filter, None).await?)
    }
}

#[rocket::async_trait]
impl ElectionDirectory for MongoStore {
    async fn voter(&self, voter_id: VoterId) -> StoreResult<Option<Voter>> {
        Ok(self.voters.find_one(doc! {"_id": voter_id}, None).await?)
    }

    async fn count_registered_voters(&self) -> StoreResult<u64> {
        Ok(self.voters.count_documents(doc! {}, None).await?)
    }

    async fn count_active_voters(&self) -> StoreResult<u64> {
        Ok(self
            .voters
            .count_documents(doc! {"is_active": true}, None)
            .await?)
    }

    async fn election(&self, election_id: ElectionId) -> StoreResult<Option<Election>> {
        Ok(self
            .elections
            .find_one(doc! {"_id": election_id}, None)
            .await?)
    }

    async fn mark_sealed(
        &self,
        election_id: ElectionId,
        seal_hash: &str,
        sealed_at: DateTime<Utc>,
        sealed_by: AdminId,
    ) -> StoreResult<bool> {
        // Only flips an election that is still unsealed, so two concurrent
        // sealing actions cannot both succeed.
        let filter = doc! {"_id": election_id, "is_sealed": false};
        let update = doc! {
            "$set": {
                "is_sealed": true,
                "seal_hash": seal_hash,
                "sealed_at": Bson::String(sealed_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
                "sealed_by": sealed_by,
            }
        };
        let result = self.elections.update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn positions(&self, election_id: ElectionId) -> StoreResult<Vec<Position>> {
        let options = FindOptions::builder().sort(doc! {"_id": 1}).build();
        let positions = self
            .positions
            .find(doc! {"election_id": election_id}, options)
            .await?
            .try_collect()
            .await?;
        Ok(positions)
    }

    async fn position(
        &self,
        election_id: ElectionId,
        position_id: PositionId,
    ) -> StoreResult<Option<Position>> {
        let filter = doc! {"_id": position_id, "election_id": election_id};
        Ok(self.positions.find_one(filter, None).await?)
    }

    async fn candidates(&self, position_id: PositionId) -> StoreResult<Vec<Candidate>> {
        let options = FindOptions::builder().sort(doc! {"_id": 1}).build();
        let candidates = self
            .candidates
            .find(doc! {"position_id": position_id}, options)
            .await?
            .try_collect()
            .await?;
        Ok(candidates)
    }

    async fn candidate(
        &self,
        position_id: PositionId,
        candidate_id: CandidateId,
    ) -> StoreResult<Option<Candidate>> {
        let filter = doc! {"_id": candidate_id, "position_id": position_id};
        Ok(self.candidates.find_one(filter, None).await?)
    }

    async fn count_candidates(&self, election_id: ElectionId) -> StoreResult<u64> {
        let position_ids = self
            .positions
            .distinct("_id", doc! {"election_id": election_id}, None)
            .await?;
        Ok(self
            .candidates
            .count_documents(doc! {"position_id": {"$in": position_ids}}, None)
            .await?)
    }
}

#[rocket::async_trait]
impl AuditSink for MongoStore {
    async fn record(&self, entry: AuditRecord) -> StoreResult<()> {
        self.audit.insert_one(entry, None).await?;
        Ok(())
    }
}
