use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use rocket::serde::json::serde_json;
use uuid::Uuid;

use crate::crypto::VoteCryptography;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        cast::{CastOutcome, CastVote, Rejection},
        receipt::{Receipt, VoteDetail},
        status::{ElectionStatusView, PositionSummary},
    },
    common::{BallotPayload, ElectionId, ElectionStatus, VoteChoice, VoterId},
    db::{Actor, AuditOutcome, AuditRecord, Election, SealedBallot, VoteReceipt, Voter},
};
use crate::store::{StoreError, Stores};

use super::record_audit;

const CAN_VOTE_MESSAGE: &str = "You can vote";

/// A fresh opaque identifier: 32 upper-case hex digits.
fn new_token() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}

/// Runs cast attempts through eligibility, duplicate and target checks, seals
/// and persists the ballot, and issues the receipt.
pub struct VotingService {
    stores: Stores,
    crypto: Arc<VoteCryptography>,
}

impl VotingService {
    pub fn new(stores: Stores, crypto: Arc<VoteCryptography>) -> Self {
        Self { stores, crypto }
    }

    /// Attempt to cast one ballot.
    ///
    /// Expected refusals come back as [`CastOutcome::Rejected`]. An `Err`
    /// means a storage or cryptographic fault, and no ballot was recorded
    /// unless the fault happened while issuing the receipt.
    pub async fn cast_vote(&self, cast: CastVote) -> Result<CastOutcome> {
        let now = self.stores.now();

        // Eligibility.
        let (voter, election) = match self
            .eligibility(cast.voter_id, cast.election_id, now)
            .await?
        {
            Ok(found) => found,
            Err(rejection) => {
                return Ok(self.reject(&cast, "eligibility_check", rejection).await)
            }
        };
        let seal_hash = match election.seal_hash.clone() {
            Some(seal_hash) => seal_hash,
            None => {
                return Ok(self
                    .reject(&cast, "eligibility_check", Rejection::ElectionNotSealed)
                    .await)
            }
        };
        self.audit(&cast, "eligibility_check", "Voter is eligible", AuditOutcome::Success)
            .await;

        // Duplicate check.
        if self
            .stores
            .ballots
            .has_voted(cast.voter_id, cast.election_id)
            .await?
        {
            return Ok(self.reject(&cast, "duplicate_check", Rejection::AlreadyVoted).await);
        }
        self.audit(&cast, "duplicate_check", "No earlier ballot", AuditOutcome::Success)
            .await;

        // Target validation. Blank and null ballots name no candidate.
        let directory = &self.stores.directory;
        let position = match directory.position(cast.election_id, cast.position_id).await? {
            Some(position) => position,
            None => {
                return Ok(self
                    .reject(&cast, "validate_target", Rejection::InvalidPosition)
                    .await)
            }
        };
        let candidate = match cast.choice {
            VoteChoice::Candidate(candidate_id) => {
                match directory.candidate(position.id, candidate_id).await? {
                    Some(candidate) => Some(candidate),
                    None => {
                        return Ok(self
                            .reject(&cast, "validate_target", Rejection::InvalidCandidate)
                            .await)
                    }
                }
            }
            VoteChoice::Blank | VoteChoice::Null => None,
        };
        self.audit(
            &cast,
            "validate_target",
            format!("Position {} accepted", position.id),
            AuditOutcome::Success,
        )
        .await;

        // Seal and encrypt. Everything must succeed before anything is stored.
        let vote_id = new_token();
        let payload = match (&candidate, cast.choice) {
            (Some(candidate), _) => BallotPayload {
                candidate_id: Some(candidate.id),
                candidate_name: Some(candidate.name.clone()),
                candidate_number: candidate.number.clone(),
                is_blank: false,
                is_null: false,
                encrypted_at: now,
                vote_id: vote_id.clone(),
            },
            (None, VoteChoice::Null) => BallotPayload::null(vote_id.clone(), now),
            (None, _) => BallotPayload::blank(vote_id.clone(), now),
        };
        let sealed = self.seal_ballot(&cast, &voter, &election, &seal_hash, &vote_id, &payload, now);
        let ballot = match sealed {
            Ok(ballot) => ballot,
            Err(e) => {
                error!("Failed to seal ballot for election {}: {e}", cast.election_id);
                self.audit(&cast, "seal_ballot", e.to_string(), AuditOutcome::Failure)
                    .await;
                return Err(e);
            }
        };
        self.audit(&cast, "seal_ballot", "Ballot sealed", AuditOutcome::Success)
            .await;

        // Persist. The store's uniqueness check is the authoritative one.
        match self.stores.ballots.create_ballot(ballot).await {
            Ok(_) => {}
            Err(StoreError::DuplicateVote { .. }) => {
                return Ok(self.reject(&cast, "persist_ballot", Rejection::AlreadyVoted).await)
            }
            Err(e) => {
                error!("Failed to store ballot for election {}: {e}", cast.election_id);
                self.audit(&cast, "persist_ballot", e.to_string(), AuditOutcome::Failure)
                    .await;
                return Err(e.into());
            }
        }
        self.audit(
            &cast,
            "persist_ballot",
            format!("Ballot {vote_id} stored"),
            AuditOutcome::Success,
        )
        .await;

        // Receipt.
        let receipt_token = new_token();
        let receipt = Receipt {
            receipt_hash: self.crypto.receipt_hash(&vote_id, &receipt_token, now),
            receipt_token,
            voted_at: now,
            election_id: election.id,
            election_title: election.title,
            voter_name: voter.name.clone(),
            voter_cpf: voter.masked_cpf(),
            vote_details: vec![VoteDetail {
                position_name: position.name,
                candidate_name: payload.candidate_name,
                candidate_number: payload.candidate_number,
                is_blank: payload.is_blank,
                is_null: payload.is_null,
            }],
        };
        let record = VoteReceipt {
            receipt_token: receipt.receipt_token.clone(),
            receipt_hash: receipt.receipt_hash.clone(),
            voter_id: voter.id,
            election_id: election.id,
            voted_at: now,
            ip_address: cast.origin.ip_address.clone(),
            user_agent: cast.origin.user_agent.clone(),
            receipt_data: serde_json::to_string(&receipt)?,
        };
        if let Err(e) = self.stores.receipts.insert_receipt(record).await {
            error!("Ballot {vote_id} was stored but its receipt was not: {e}");
            self.audit(&cast, "issue_receipt", e.to_string(), AuditOutcome::Failure)
                .await;
            return Err(e.into());
        }
        self.audit(&cast, "issue_receipt", "Receipt issued", AuditOutcome::Success)
            .await;

        info!(
            "Accepted ballot in election {} position {}",
            cast.election_id, cast.position_id
        );
        Ok(CastOutcome::Accepted { receipt })
    }

    /// Whether the voter may cast a ballot right now, ignoring whether they
    /// already have.
    pub async fn can_vote(
        &self,
        voter_id: VoterId,
        election_id: ElectionId,
    ) -> Result<Result<(), Rejection>> {
        Ok(self
            .eligibility(voter_id, election_id, self.stores.now())
            .await?
            .map(|_| ()))
    }

    /// The election as the given voter sees it.
    pub async fn election_status(
        &self,
        election_id: ElectionId,
        voter_id: VoterId,
    ) -> Result<ElectionStatusView> {
        let directory = &self.stores.directory;
        let election = directory
            .election(election_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Election with ID '{election_id}'")))?;

        let has_voted = self.stores.ballots.has_voted(voter_id, election_id).await?;
        let eligibility = self.can_vote(voter_id, election_id).await?;
        let message = if has_voted {
            Rejection::AlreadyVoted.to_string()
        } else {
            match eligibility {
                Ok(()) => CAN_VOTE_MESSAGE.to_string(),
                Err(rejection) => rejection.to_string(),
            }
        };

        let mut positions = Vec::new();
        for position in directory.positions(election_id).await? {
            let candidates = directory.candidates(position.id).await?;
            positions.push(PositionSummary::new(position, candidates));
        }

        Ok(ElectionStatusView {
            election_id,
            title: election.title,
            status: election.status,
            start_date: election.start_date,
            end_date: election.end_date,
            timezone: election.timezone,
            sealed: election.is_sealed,
            sealed_at: election.sealed_at,
            can_vote: eligibility.is_ok() && !has_voted,
            has_voted,
            message,
            positions,
        })
    }

    /// Look up a receipt by its token.
    pub async fn vote_receipt(&self, receipt_token: &str) -> Result<Receipt> {
        let record = self
            .stores
            .receipts
            .receipt_by_token(receipt_token)
            .await?
            .ok_or_else(|| Error::not_found(format!("Receipt '{receipt_token}'")))?;
        Ok(serde_json::from_str(&record.receipt_data)?)
    }

    /// Check the voter and election, in the order a voter would want to hear
    /// about problems.
    async fn eligibility(
        &self,
        voter_id: VoterId,
        election_id: ElectionId,
        now: DateTime<Utc>,
    ) -> Result<Result<(Voter, Election), Rejection>> {
        let directory = &self.stores.directory;
        let voter = match directory.voter(voter_id).await? {
            Some(voter) => voter,
            None => return Ok(Err(Rejection::VoterNotFound)),
        };
        if !voter.is_active {
            return Ok(Err(Rejection::VoterInactive));
        }
        let election = match directory.election(election_id).await? {
            Some(election) => election,
            None => return Ok(Err(Rejection::ElectionNotFound)),
        };
        if election.status != ElectionStatus::Active {
            return Ok(Err(Rejection::ElectionNotActive));
        }
        if !election.is_sealed {
            return Ok(Err(Rejection::ElectionNotSealed));
        }
        let (starts_at, ends_at) = match (election.starts_at(), election.ends_at()) {
            (Some(starts_at), Some(ends_at)) => (starts_at, ends_at),
            _ => return Ok(Err(Rejection::InvalidTimezone)),
        };
        if now < starts_at {
            return Ok(Err(Rejection::NotStarted));
        }
        if now > ends_at {
            return Ok(Err(Rejection::Ended));
        }
        Ok(Ok((voter, election)))
    }

    /// Build the stored ballot: ciphertext, hashes, signature and fingerprint.
    #[allow(clippy::too_many_arguments)]
    fn seal_ballot(
        &self,
        cast: &CastVote,
        voter: &Voter,
        election: &Election,
        seal_hash: &str,
        vote_id: &str,
        payload: &BallotPayload,
        now: DateTime<Utc>,
    ) -> Result<SealedBallot> {
        let encrypted_payload = self.crypto.encrypt_ballot(payload, seal_hash)?;
        let vote_hash = self
            .crypto
            .hash_vote(vote_id, voter.id, payload.candidate_id, now);
        let vote_signature = self.crypto.sign_vote(&vote_hash, &encrypted_payload);
        let encrypted_justification = self
            .crypto
            .encrypt_justification(cast.justification.as_deref())?;
        debug!("Sealed ballot under seal {seal_hash}");

        Ok(SealedBallot {
            vote_id: vote_id.to_string(),
            vote_type: cast.choice.vote_type(),
            encrypted_payload,
            vote_hash,
            vote_signature,
            vote_weight: voter.vote_weight,
            voted_at: now,
            ip_address: cast.origin.ip_address.clone(),
            user_agent: cast.origin.user_agent.clone(),
            device_fingerprint: self.crypto.fingerprint_device(
                &cast.origin.user_agent,
                &cast.origin.ip_address,
                &cast.device,
            ),
            voter_id: voter.id,
            election_id: election.id,
            position_id: cast.position_id,
            encrypted_justification,
            creation_hash: self.crypto.creation_hash(
                vote_id,
                voter.id,
                election.id,
                voter.vote_weight,
                now,
            ),
            created_at: now,
            election_seal_hash: seal_hash.to_string(),
            is_valid: true,
        })
    }

    async fn reject(&self, cast: &CastVote, stage: &str, rejection: Rejection) -> CastOutcome {
        info!(
            "Rejected ballot in election {} at {stage}: {rejection}",
            cast.election_id
        );
        self.audit(cast, stage, rejection.to_string(), AuditOutcome::Failure)
            .await;
        CastOutcome::rejected(rejection)
    }

    async fn audit(
        &self,
        cast: &CastVote,
        action: &str,
        details: impl Into<String>,
        outcome: AuditOutcome,
    ) {
        record_audit(
            self.stores.audit.as_ref(),
            AuditRecord::new(
                Actor::Voter(cast.voter_id),
                action,
                "election",
                Some(cast.election_id.to_string()),
                details,
                outcome,
                self.stores.now(),
            ),
        )
        .await;
    }
}
