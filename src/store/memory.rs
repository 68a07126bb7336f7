//! In-memory stores for tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::model::{
    common::{AdminId, CandidateId, ElectionId, PositionId, SealType, VoterId},
    db::{
        AuditRecord, Candidate, Election, ElectionSeal, Position, SealedBallot, VoteReceipt, Voter,
        ZeroReport,
    },
};

use super::{
    AuditSink, BallotStore, Clock, ElectionDirectory, ReceiptStore, SealStore, StoreError,
    StoreResult, Stores, ZeroReportStore,
};

#[derive(Default)]
pub struct MemoryStore {
    ballots: Mutex<Vec<SealedBallot>>,
    seals: Mutex<Vec<ElectionSeal>>,
    receipts: Mutex<Vec<VoteReceipt>>,
    zero_reports: Mutex<Vec<ZeroReport>>,
    audit: Mutex<Vec<AuditRecord>>,
    fail_audit: AtomicBool,
    voters: Mutex<BTreeMap<VoterId, Voter>>,
    elections: Mutex<BTreeMap<ElectionId, Election>>,
    positions: Mutex<BTreeMap<PositionId, Position>>,
    candidates: Mutex<BTreeMap<CandidateId, Candidate>>,
}

impl MemoryStore {
    pub fn add_voter(&self, voter: Voter) {
        self.voters.lock().unwrap().insert(voter.id, voter);
    }

    pub fn add_election(&self, election: Election) {
        self.elections.lock().unwrap().insert(election.id, election);
    }

    pub fn add_position(&self, position: Position) {
        self.positions.lock().unwrap().insert(position.id, position);
    }

    pub fn add_candidate(&self, candidate: Candidate) {
        self.candidates.lock().unwrap().insert(candidate.id, candidate);
    }

    pub fn update_election(&self, election_id: ElectionId, f: impl FnOnce(&mut Election)) {
        f(self.elections.lock().unwrap().get_mut(&election_id).unwrap());
    }

    pub fn update_voter(&self, voter_id: VoterId, f: impl FnOnce(&mut Voter)) {
        f(self.voters.lock().unwrap().get_mut(&voter_id).unwrap());
    }

    /// Edit a stored ballot behind the services' backs.
    pub fn tamper_ballot(&self, vote_id: &str, f: impl FnOnce(&mut SealedBallot)) {
        let mut ballots = self.ballots.lock().unwrap();
        f(ballots.iter_mut().find(|b| b.vote_id == vote_id).unwrap());
    }

    /// Every stored ballot, valid or not.
    pub fn all_ballots(&self) -> Vec<SealedBallot> {
        self.ballots.lock().unwrap().clone()
    }

    pub fn seals(&self) -> Vec<ElectionSeal> {
        self.seals.lock().unwrap().clone()
    }

    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit.lock().unwrap().clone()
    }

    /// Audit actions recorded so far, in order.
    pub fn audit_actions(&self) -> Vec<String> {
        self.audit_records().into_iter().map(|r| r.action).collect()
    }

    pub fn set_audit_failing(&self, failing: bool) {
        self.fail_audit.store(failing, Ordering::SeqCst);
    }

    fn sorted_valid(&self, filter: impl Fn(&SealedBallot) -> bool) -> Vec<SealedBallot> {
        let mut ballots = self
            .ballots
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.is_valid && filter(*b))
            .cloned()
            .collect::<Vec<_>>();
        ballots.sort_by(|a, b| {
            a.voted_at
                .cmp(&b.voted_at)
                .then_with(|| a.vote_id.cmp(&b.vote_id))
        });
        ballots
    }
}

#[rocket::async_trait]
impl BallotStore for MemoryStore {
    async fn create_ballot(&self, ballot: SealedBallot) -> StoreResult<SealedBallot> {
        let mut ballots = self.ballots.lock().unwrap();
        if ballots.iter().any(|b| {
            b.is_valid && b.voter_id == ballot.voter_id && b.election_id == ballot.election_id
        }) {
            return Err(StoreError::DuplicateVote {
                voter_id: ballot.voter_id,
                election_id: ballot.election_id,
            });
        }
        ballots.push(ballot.clone());
        Ok(ballot)
    }

    async fn has_voted(&self, voter_id: VoterId, election_id: ElectionId) -> StoreResult<bool> {
        Ok(self
            .ballots
            .lock()
            .unwrap()
            .iter()
            .any(|b| b.is_valid && b.voter_id == voter_id && b.election_id == election_id))
    }

    async fn list_by_election(&self, election_id: ElectionId) -> StoreResult<Vec<SealedBallot>> {
        Ok(self.sorted_valid(|b| b.election_id == election_id))
    }

    async fn list_by_position(
        &self,
        election_id: ElectionId,
        position_id: PositionId,
    ) -> StoreResult<Vec<SealedBallot>> {
        Ok(self.sorted_valid(|b| b.election_id == election_id && b.position_id == position_id))
    }

    async fn ballots_page(
        &self,
        election_id: ElectionId,
        position_id: Option<PositionId>,
        skip: u64,
        limit: u64,
    ) -> StoreResult<Vec<SealedBallot>> {
        Ok(self
            .sorted_valid(|b| {
                b.election_id == election_id && position_id.map_or(true, |p| b.position_id == p)
            })
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_by_election(&self, election_id: ElectionId) -> StoreResult<u64> {
        Ok(self.sorted_valid(|b| b.election_id == election_id).len() as u64)
    }

    async fn count_by_position(
        &self,
        election_id: ElectionId,
        position_id: PositionId,
    ) -> StoreResult<u64> {
        Ok(self
            .sorted_valid(|b| b.election_id == election_id && b.position_id == position_id)
            .len() as u64)
    }

    async fn get_by_id(&self, vote_id: &str) -> StoreResult<Option<SealedBallot>> {
        Ok(self
            .ballots
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.is_valid && b.vote_id == vote_id)
            .cloned())
    }
}

#[rocket::async_trait]
impl SealStore for MemoryStore {
    async fn insert_seal(&self, seal: ElectionSeal) -> StoreResult<()> {
        self.seals.lock().unwrap().push(seal);
        Ok(())
    }

    async fn latest_seal(
        &self,
        election_id: ElectionId,
        seal_type: SealType,
    ) -> StoreResult<Option<ElectionSeal>> {
        Ok(self
            .seals
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.election_id == election_id && s.seal_type == seal_type)
            .max_by_key(|s| s.sealed_at)
            .cloned())
    }
}

#[rocket::async_trait]
impl ReceiptStore for MemoryStore {
    async fn insert_receipt(&self, receipt: VoteReceipt) -> StoreResult<()> {
        let mut receipts = self.receipts.lock().unwrap();
        if receipts
            .iter()
            .any(|r| r.receipt_token == receipt.receipt_token)
        {
            return Err(StoreError::Duplicate("receipt token".to_string()));
        }
        receipts.push(receipt);
        Ok(())
    }

    async fn receipt_by_token(&self, receipt_token: &str) -> StoreResult<Option<VoteReceipt>> {
        Ok(self
            .receipts
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.receipt_token == receipt_token)
            .cloned())
    }
}

#[rocket::async_trait]
impl ZeroReportStore for MemoryStore {
    async fn insert_zero_report(&self, report: ZeroReport) -> StoreResult<()> {
        let mut reports = self.zero_reports.lock().unwrap();
        if reports.iter().any(|r| r.election_id == report.election_id) {
            return Err(StoreError::Duplicate(format!(
                "zero report for election {}",
                report.election_id
            )));
        }
        reports.push(report);
        Ok(())
    }

    async fn zero_report(&self, election_id: ElectionId) -> StoreResult<Option<ZeroReport>> {
        Ok(self
            .zero_reports
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.election_id == election_id)
            .cloned())
    }
}

#[rocket::async_trait]
impl ElectionDirectory for MemoryStore {
    async fn voter(&self, voter_id: VoterId) -> StoreResult<Option<Voter>> {
        Ok(self.voters.lock().unwrap().get(&voter_id).cloned())
    }

    async fn count_registered_voters(&self) -> StoreResult<u64> {
        Ok(self.voters.lock().unwrap().len() as u64)
    }

    async fn count_active_voters(&self) -> StoreResult<u64> {
        Ok(self
            .voters
            .lock()
            .unwrap()
            .values()
            .filter(|v| v.is_active)
            .count() as u64)
    }

    async fn election(&self, election_id: ElectionId) -> StoreResult<Option<Election>> {
        Ok(self.elections.lock().unwrap().get(&election_id).cloned())
    }

    async fn mark_sealed(
        &self,
        election_id: ElectionId,
        seal_hash: &str,
        sealed_at: DateTime<Utc>,
        sealed_by: AdminId,
    ) -> StoreResult<bool> {
        let mut elections = self.elections.lock().unwrap();
        match elections.get_mut(&election_id) {
            Some(election) if !election.is_sealed => {
                election.is_sealed = true;
                election.seal_hash = Some(seal_hash.to_string());
                election.sealed_at = Some(sealed_at);
                election.sealed_by = Some(sealed_by);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn positions(&self, election_id: ElectionId) -> StoreResult<Vec<Position>> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.election_id == election_id)
            .cloned()
            .collect())
    }

    async fn position(
        &self,
        election_id: ElectionId,
        position_id: PositionId,
    ) -> StoreResult<Option<Position>> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .get(&position_id)
            .filter(|p| p.election_id == election_id)
            .cloned())
    }

    async fn candidates(&self, position_id: PositionId) -> StoreResult<Vec<Candidate>> {
        Ok(self
            .candidates
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.position_id == position_id)
            .cloned()
            .collect())
    }

    async fn candidate(
        &self,
        position_id: PositionId,
        candidate_id: CandidateId,
    ) -> StoreResult<Option<Candidate>> {
        Ok(self
            .candidates
            .lock()
            .unwrap()
            .get(&candidate_id)
            .filter(|c| c.position_id == position_id)
            .cloned())
    }

    async fn count_candidates(&self, election_id: ElectionId) -> StoreResult<u64> {
        let positions = self.positions(election_id).await?;
        Ok(self
            .candidates
            .lock()
            .unwrap()
            .values()
            .filter(|c| positions.iter().any(|p| p.id == c.position_id))
            .count() as u64)
    }
}

#[rocket::async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, entry: AuditRecord) -> StoreResult<()> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit sink offline".to_string()));
        }
        self.audit.lock().unwrap().push(entry);
        Ok(())
    }
}

/// A clock that only moves when told to.
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

impl Stores {
    pub fn memory(store: Arc<MemoryStore>, clock: Arc<FixedClock>) -> Self {
        Self {
            ballots: store.clone(),
            seals: store.clone(),
            receipts: store.clone(),
            zero_reports: store.clone(),
            directory: store.clone(),
            audit: store,
            clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rocket::async_test]
    async fn second_valid_ballot_is_refused() {
        let store = MemoryStore::default();
        let ballot = SealedBallot::example();
        store.create_ballot(ballot.clone()).await.unwrap();

        let mut again = ballot.clone();
        again.vote_id = "OTHER".to_string();
        assert!(matches!(
            store.create_ballot(again).await,
            Err(StoreError::DuplicateVote {
                voter_id: 1,
                election_id: 1
            })
        ));
        assert_eq!(store.count_by_election(1).await.unwrap(), 1);
    }

    #[rocket::async_test]
    async fn invalidated_ballots_are_hidden() {
        let store = MemoryStore::default();
        let ballot = SealedBallot::example();
        store.create_ballot(ballot.clone()).await.unwrap();
        assert!(store.has_voted(1, 1).await.unwrap());
        assert!(store.validate_integrity(&ballot.vote_id).await.unwrap());

        store.tamper_ballot(&ballot.vote_id, |b| b.is_valid = false);
        assert!(!store.has_voted(1, 1).await.unwrap());
        assert!(store.get_by_id(&ballot.vote_id).await.unwrap().is_none());
        assert!(store.list_by_election(1).await.unwrap().is_empty());
        // An invalidated ballot no longer blocks the voter.
        let mut replacement = ballot;
        replacement.vote_id = "REPLACEMENT".to_string();
        store.create_ballot(replacement).await.unwrap();
    }

    #[rocket::async_test]
    async fn validate_integrity_reports_tampering() {
        let store = MemoryStore::default();
        let ballot = SealedBallot::example();
        store.create_ballot(ballot.clone()).await.unwrap();
        store.tamper_ballot(&ballot.vote_id, |b| b.election_id = 2);
        assert!(!store.validate_integrity(&ballot.vote_id).await.unwrap());
        assert!(!store.validate_integrity("MISSING").await.unwrap());
    }

    #[rocket::async_test]
    async fn pages_are_ordered_by_cast_time() {
        let store = MemoryStore::default();
        let base = SealedBallot::example();
        for i in (0..5).rev() {
            let mut ballot = base.clone();
            ballot.vote_id = format!("V{i}");
            ballot.voter_id = i;
            ballot.voted_at = base.voted_at + Duration::seconds(i.into());
            store.create_ballot(ballot).await.unwrap();
        }

        let first = store.ballots_page(1, None, 0, 2).await.unwrap();
        let rest = store.ballots_page(1, Some(1), 2, 10).await.unwrap();
        let ids = first
            .iter()
            .chain(rest.iter())
            .map(|b| b.vote_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["V0", "V1", "V2", "V3", "V4"]);
        assert!(store.ballots_page(1, Some(2), 0, 10).await.unwrap().is_empty());
    }
}
