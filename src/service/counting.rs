//! Tallying and auditing of stored ballots.
//!
//! Every bulk operation walks the election's ballots one page at a time.
//! Each page is split into chunks that are verified and decrypted on the
//! blocking pool, and the results are folded into the caller's accumulator
//! in ballot order. Decryption happens once per ballot, and nothing outside
//! the fold is ever shared between workers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::{error, info, warn};
use rocket::futures::{stream, StreamExt};
use rocket::http::Status;
use rocket::tokio::task::spawn_blocking;
use rust_decimal::Decimal;

use crate::crypto::VoteCryptography;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        audit::{
            AuditEntry, BallotDetails, DecryptedContent, DecryptionRequest, FlaggedBallot,
            IntegrityReport, IntegrityViolation,
        },
        results::{
            CandidateTally, ElectionResults, ExcludedBallot, ExclusionReason, PositionCount,
            VoteCountResult,
        },
    },
    common::{
        AdminId, BallotPayload, CandidateId, ElectionId, PositionId, SealType, VoteType,
    },
    db::{Actor, AuditOutcome, AuditRecord, Election, ElectionSeal, SealedBallot},
};
use crate::store::Stores;

use super::{record_audit, seal::check_seal};

/// What a ballot turned out to contain.
enum Choice {
    Blank,
    Null,
    Candidate(BallotPayload),
    /// Decryption failed with this message.
    Undecryptable(String),
}

/// A ballot after verification and decryption.
struct Inspected {
    ballot: SealedBallot,
    choice: Choice,
    violations: Vec<IntegrityViolation>,
}

/// Verify one ballot and, unless it is blank or null, decrypt it under its
/// own seal. `invalid_seal` is a seal hash that no longer verifies.
fn inspect(
    crypto: &VoteCryptography,
    current_seal: Option<&str>,
    invalid_seal: Option<&str>,
    ballot: SealedBallot,
) -> Inspected {
    let mut violations = Vec::new();
    if !crypto.verify_integrity(
        &ballot.encrypted_payload,
        &ballot.vote_hash,
        &ballot.vote_signature,
    ) {
        violations.push(IntegrityViolation::SignatureMismatch);
    }
    if !ballot.creation_hash_matches() {
        violations.push(IntegrityViolation::CreationHashMismatch);
    }
    if !current_seal.map_or(false, |seal| seal.eq_ignore_ascii_case(&ballot.election_seal_hash)) {
        violations.push(IntegrityViolation::SealHashMismatch);
    }
    if invalid_seal.map_or(false, |seal| seal.eq_ignore_ascii_case(&ballot.election_seal_hash)) {
        violations.push(IntegrityViolation::SealInvalidated);
    }

    let choice = match ballot.vote_type {
        VoteType::Blank => Choice::Blank,
        VoteType::Null => Choice::Null,
        VoteType::Candidate => {
            match crypto.decrypt_ballot(&ballot.encrypted_payload, &ballot.election_seal_hash) {
                Ok(payload) => Choice::Candidate(payload),
                Err(e) => {
                    violations.push(IntegrityViolation::Undecryptable);
                    Choice::Undecryptable(e.to_string())
                }
            }
        }
    };

    let hashed_candidate = match &choice {
        Choice::Candidate(payload) => Some(payload.candidate_id),
        Choice::Blank | Choice::Null => Some(None),
        Choice::Undecryptable(_) => None,
    };
    if let Some(candidate_id) = hashed_candidate {
        let expected = crypto.hash_vote(&ballot.vote_id, ballot.voter_id, candidate_id, ballot.voted_at);
        if !expected.eq_ignore_ascii_case(&ballot.vote_hash) {
            violations.push(IntegrityViolation::VoteHashMismatch);
        }
    }

    Inspected {
        ballot,
        choice,
        violations,
    }
}

/// Why a ballot with these violations stays out of the tally, if it does.
fn exclusion_reason(violations: &[IntegrityViolation]) -> Option<ExclusionReason> {
    use IntegrityViolation as V;
    [
        (V::SealHashMismatch, ExclusionReason::SealMismatch),
        (V::SealInvalidated, ExclusionReason::SealInvalidated),
        (V::Undecryptable, ExclusionReason::DecryptionFailed),
        (V::SignatureMismatch, ExclusionReason::SignatureMismatch),
        (V::VoteHashMismatch, ExclusionReason::VoteHashMismatch),
        (V::CreationHashMismatch, ExclusionReason::CreationHashMismatch),
    ]
    .into_iter()
    .find(|(violation, _)| violations.contains(violation))
    .map(|(_, reason)| reason)
}

/// A position's running tally.
struct PositionTally {
    count: PositionCount,
    /// Index into `count.candidates` by candidate ID.
    index: HashMap<CandidateId, usize>,
}

/// Counts, verifies and audits the ballots of an election.
pub struct VoteCounter {
    stores: Stores,
    crypto: Arc<VoteCryptography>,
    batch_size: u64,
    parallelism: usize,
}

impl VoteCounter {
    pub fn new(
        stores: Stores,
        crypto: Arc<VoteCryptography>,
        batch_size: u64,
        parallelism: usize,
    ) -> Self {
        Self {
            stores,
            crypto,
            batch_size: batch_size.max(1),
            parallelism: parallelism.max(1),
        }
    }

    /// Tally every position of the election.
    pub async fn count_votes(&self, election_id: ElectionId) -> Result<VoteCountResult> {
        self.count(election_id, None).await
    }

    /// Tally a single position. The result lists only that position.
    pub async fn count_votes_by_position(
        &self,
        election_id: ElectionId,
        position_id: PositionId,
    ) -> Result<VoteCountResult> {
        self.count(election_id, Some(position_id)).await
    }

    /// Check every valid ballot of the election and list the ones that fail.
    pub async fn integrity_report(&self, election_id: ElectionId) -> Result<IntegrityReport> {
        let election = self.election(election_id).await?;
        let mut checked = 0;
        let mut flagged = Vec::new();
        self.for_each_ballot(&election, None, |inspected| {
            checked += 1;
            if !inspected.violations.is_empty() {
                warn!(
                    "Ballot {} failed verification: {:?}",
                    inspected.ballot.vote_id, inspected.violations
                );
                flagged.push(FlaggedBallot {
                    vote_id: inspected.ballot.vote_id,
                    position_id: inspected.ballot.position_id,
                    violations: inspected.violations,
                });
            }
        })
        .await?;

        if !flagged.is_empty() {
            warn!(
                "{} of {checked} ballots in election {election_id} failed verification",
                flagged.len()
            );
        }
        Ok(IntegrityReport {
            election_id,
            checked,
            flagged,
            generated_at: self.stores.now(),
        })
    }

    /// `true` only if every valid ballot of the election verifies.
    pub async fn validate_all_votes_integrity(&self, election_id: ElectionId) -> Result<bool> {
        Ok(self.integrity_report(election_id).await?.is_intact())
    }

    /// Count the election and publish hashed results with winners. Refuses if
    /// any ballot fails verification. The result hash is kept as a report
    /// seal.
    pub async fn generate_election_results(
        &self,
        election_id: ElectionId,
        admin_id: AdminId,
    ) -> Result<ElectionResults> {
        let report = self.integrity_report(election_id).await?;
        if !report.is_intact() {
            let msg = format!(
                "{} ballot(s) in election {election_id} failed verification",
                report.flagged.len()
            );
            self.audit_admin(admin_id, "generate_results", election_id, &msg, AuditOutcome::Failure)
                .await;
            return Err(Error::Integrity(msg));
        }

        let count = self.count_votes(election_id).await?;
        let results = ElectionResults::new(count, self.stores.now());
        self.stores
            .seals
            .insert_seal(ElectionSeal {
                seal_hash: results.result_hash.clone(),
                seal_type: SealType::ReportSeal,
                election_id,
                sealed_at: results.generated_at,
                sealed_by: admin_id,
                system_data: results.hashed_json(),
                ip_address: None,
                user_agent: None,
                is_valid: true,
            })
            .await?;
        self.audit_admin(
            admin_id,
            "generate_results",
            election_id,
            &format!("Results published with hash {}", results.result_hash),
            AuditOutcome::Success,
        )
        .await;
        info!("Published results for election {election_id}");
        Ok(results)
    }

    /// One entry per valid ballot. Ballot contents are only decrypted for an
    /// authorized request, and only once that request has been audited.
    pub async fn vote_audit_trail(
        &self,
        election_id: ElectionId,
        request: DecryptionRequest,
    ) -> Result<Vec<AuditEntry>> {
        let election = self.election(election_id).await?;

        let decrypt = match request {
            DecryptionRequest::None => false,
            DecryptionRequest::Authorized { admin_id } => {
                // Secrecy is only broken on the record: no audit entry, no decryption.
                let entry = AuditRecord::new(
                    Actor::Admin(admin_id),
                    "decrypt_audit_trail",
                    "election",
                    Some(election_id.to_string()),
                    "Decrypted audit trail requested",
                    AuditOutcome::Success,
                    self.stores.now(),
                );
                if let Err(e) = self.stores.audit.record(entry).await {
                    error!("Refusing to decrypt election {election_id}: audit failed: {e}");
                    return Err(e.into());
                }
                warn!("Admin {admin_id} is decrypting the ballots of election {election_id}");
                true
            }
        };

        let crypto = self.crypto.clone();
        let mut entries = Vec::new();
        self.for_each_ballot(&election, None, |inspected| {
            let mut entry = AuditEntry::new(&inspected.ballot, inspected.violations);
            if decrypt {
                entry.decrypted = Some(decrypted_content(
                    &crypto,
                    inspected.choice,
                    inspected.ballot.encrypted_justification.as_deref(),
                ));
            }
            entries.push(entry);
        })
        .await?;
        Ok(entries)
    }

    /// A stored ballot with its voter, election and position, verified.
    pub async fn ballot_details(&self, vote_id: &str) -> Result<BallotDetails> {
        let ballot = self
            .stores
            .ballots
            .get_by_id(vote_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Ballot '{vote_id}'")))?;

        let directory = &self.stores.directory;
        let voter = directory.voter(ballot.voter_id).await?;
        let election = directory.election(ballot.election_id).await?;
        let position = directory
            .position(ballot.election_id, ballot.position_id)
            .await?;

        let voter_id = ballot.voter_id;
        let crypto = self.crypto.clone();
        let current_seal = election.as_ref().and_then(|e| e.seal_hash.clone());
        let invalid_seal = match &election {
            Some(election) => self.invalidated_seal(election.id).await?,
            None => None,
        };
        let inspected = spawn_blocking(move || {
            inspect(&crypto, current_seal.as_deref(), invalid_seal.as_deref(), ballot)
        })
        .await
        .map_err(worker_failed)?;

        Ok(BallotDetails::new(
            AuditEntry::new(&inspected.ballot, inspected.violations),
            voter_id,
            voter,
            election,
            position,
        ))
    }

    async fn election(&self, election_id: ElectionId) -> Result<Election> {
        self.stores
            .directory
            .election(election_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Election with ID '{election_id}'")))
    }

    /// The election's latest seal hash if that seal no longer verifies.
    async fn invalidated_seal(&self, election_id: ElectionId) -> Result<Option<String>> {
        let seal = match self
            .stores
            .seals
            .latest_seal(election_id, SealType::ElectionSeal)
            .await?
        {
            Some(seal) => seal,
            None => return Ok(None),
        };
        if check_seal(&self.stores, &seal).await?.holds() {
            return Ok(None);
        }
        warn!(
            "Seal {} of election {election_id} no longer verifies, its ballots are suspect",
            seal.seal_hash
        );
        Ok(Some(seal.seal_hash))
    }

    async fn count(
        &self,
        election_id: ElectionId,
        position_id: Option<PositionId>,
    ) -> Result<VoteCountResult> {
        let election = self.election(election_id).await?;
        let directory = &self.stores.directory;

        let mut positions = directory.positions(election_id).await?;
        if let Some(position_id) = position_id {
            positions.retain(|p| p.id == position_id);
            if positions.is_empty() {
                return Err(Error::not_found(format!(
                    "Position '{position_id}' in election '{election_id}'"
                )));
            }
        }

        let mut tallies = BTreeMap::new();
        for position in positions {
            let candidates = directory.candidates(position.id).await?;
            let index = candidates
                .iter()
                .enumerate()
                .map(|(i, c)| (c.id, i))
                .collect();
            let count = PositionCount {
                position_id: position.id,
                position_name: position.name,
                max_candidates: position.max_candidates,
                total_votes: 0,
                blank_votes: 0,
                null_votes: 0,
                excluded_votes: 0,
                candidates: candidates
                    .into_iter()
                    .map(|c| CandidateTally {
                        candidate_id: c.id,
                        candidate_name: c.name,
                        candidate_number: c.number,
                        votes: 0,
                        weighted_votes: Decimal::ZERO,
                        percentage: Decimal::ZERO,
                    })
                    .collect(),
            };
            tallies.insert(position.id, PositionTally { count, index });
        }

        let mut excluded = Vec::new();
        self.for_each_ballot(&election, position_id, |inspected| {
            let Inspected {
                ballot,
                choice,
                violations,
            } = inspected;
            let tally = match tallies.get_mut(&ballot.position_id) {
                Some(tally) => tally,
                None => {
                    warn!("Ballot {} names an unknown position", ballot.vote_id);
                    excluded.push(ExcludedBallot {
                        vote_id: ballot.vote_id,
                        position_id: ballot.position_id,
                        reason: ExclusionReason::UnknownPosition,
                    });
                    return;
                }
            };
            tally.count.total_votes += 1;

            let reason = match exclusion_reason(&violations) {
                Some(reason) => Some(reason),
                None => match choice {
                    Choice::Blank => {
                        tally.count.blank_votes += 1;
                        None
                    }
                    Choice::Null => {
                        tally.count.null_votes += 1;
                        None
                    }
                    Choice::Undecryptable(_) => Some(ExclusionReason::DecryptionFailed),
                    Choice::Candidate(payload) => {
                        match payload.candidate_id.and_then(|id| tally.index.get(&id)) {
                            Some(&i) => {
                                let candidate = &mut tally.count.candidates[i];
                                candidate.votes += 1;
                                candidate.weighted_votes += ballot.vote_weight;
                                None
                            }
                            None => Some(ExclusionReason::UnknownCandidate),
                        }
                    }
                },
            };
            if let Some(reason) = reason {
                warn!("Ballot {} left out of the tally: {reason:?}", ballot.vote_id);
                tally.count.excluded_votes += 1;
                excluded.push(ExcludedBallot {
                    vote_id: ballot.vote_id,
                    position_id: ballot.position_id,
                    reason,
                });
            }
        })
        .await?;

        let positions = tallies
            .into_values()
            .map(|mut tally| {
                tally.count.compute_percentages();
                tally.count.rank();
                tally.count
            })
            .collect::<Vec<_>>();
        info!(
            "Counted election {election_id}: {} ballots, {} excluded",
            positions.iter().map(|p| p.total_votes).sum::<u64>(),
            excluded.len()
        );

        Ok(VoteCountResult {
            election_id,
            election_title: election.title,
            counted_at: self.stores.now(),
            total_votes: positions.iter().map(|p| p.total_votes).sum(),
            total_blank_votes: positions.iter().map(|p| p.blank_votes).sum(),
            total_null_votes: positions.iter().map(|p| p.null_votes).sum(),
            positions,
            excluded,
        })
    }

    /// Inspect every valid ballot of the election, optionally of one
    /// position, feeding each to `fold` in ballot order.
    async fn for_each_ballot<F>(
        &self,
        election: &Election,
        position_id: Option<PositionId>,
        mut fold: F,
    ) -> Result<()>
    where
        F: FnMut(Inspected) + Send,
    {
        let invalid_seal = self.invalidated_seal(election.id).await?;
        let mut skip = 0;
        loop {
            let mut page = self
                .stores
                .ballots
                .ballots_page(election.id, position_id, skip, self.batch_size)
                .await?;
            let fetched = page.len() as u64;

            let chunk_size = (page.len() + self.parallelism - 1) / self.parallelism;
            let mut chunks = Vec::with_capacity(self.parallelism);
            while !page.is_empty() {
                let rest = page.split_off(chunk_size.min(page.len()));
                chunks.push(std::mem::replace(&mut page, rest));
            }

            let mut inspected = stream::iter(chunks.into_iter().map(|chunk| {
                let crypto = self.crypto.clone();
                let current_seal = election.seal_hash.clone();
                let invalid_seal = invalid_seal.clone();
                spawn_blocking(move || {
                    chunk
                        .into_iter()
                        .map(|ballot| {
                            inspect(
                                &crypto,
                                current_seal.as_deref(),
                                invalid_seal.as_deref(),
                                ballot,
                            )
                        })
                        .collect::<Vec<_>>()
                })
            }))
            .buffered(self.parallelism);
            while let Some(chunk) = inspected.next().await {
                chunk.map_err(worker_failed)?.into_iter().for_each(&mut fold);
            }

            if fetched < self.batch_size {
                return Ok(());
            }
            skip += fetched;
        }
    }

    async fn audit_admin(
        &self,
        admin_id: AdminId,
        action: &str,
        election_id: ElectionId,
        details: &str,
        outcome: AuditOutcome,
    ) {
        record_audit(
            self.stores.audit.as_ref(),
            AuditRecord::new(
                Actor::Admin(admin_id),
                action,
                "election",
                Some(election_id.to_string()),
                details,
                outcome,
                self.stores.now(),
            ),
        )
        .await;
    }
}

fn decrypted_content(
    crypto: &VoteCryptography,
    choice: Choice,
    encrypted_justification: Option<&str>,
) -> DecryptedContent {
    let (justification, justification_error) =
        match crypto.decrypt_justification(encrypted_justification) {
            Ok(justification) => (justification, None),
            Err(e) => (None, Some(e.to_string())),
        };
    match choice {
        Choice::Candidate(payload) => DecryptedContent {
            candidate_id: payload.candidate_id,
            candidate_name: payload.candidate_name,
            justification,
            error: justification_error,
        },
        Choice::Blank | Choice::Null => DecryptedContent {
            candidate_id: None,
            candidate_name: None,
            justification,
            error: justification_error,
        },
        Choice::Undecryptable(e) => DecryptedContent {
            candidate_id: None,
            candidate_name: None,
            justification: None,
            error: Some(e),
        },
    }
}

fn worker_failed(e: rocket::tokio::task::JoinError) -> Error {
    error!("Ballot worker failed: {e}");
    Error::Status(Status::InternalServerError, format!("Ballot worker failed: {e}"))
}
