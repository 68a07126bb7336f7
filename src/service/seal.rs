use log::{info, warn};
use rocket::http::Status;

use crate::crypto::digest::sha256_hex;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        cast::RequestOrigin,
        seal::{SealResult, VerificationResult},
    },
    common::{AdminId, ElectionId, ElectionStatus, SealType},
    db::{Actor, AuditOutcome, AuditRecord, ElectionSeal, SealSnapshot},
};
use crate::store::Stores;

use super::record_audit;

/// Creates and checks election seals.
///
/// A seal snapshot has two kinds of field. `election_id`, `timestamp` and
/// `cast_vote_count` are frozen: verification always reads them back from the
/// stored snapshot. `title`, `registered_voter_count` and `candidate_count`
/// are refreshed: verification fetches their current values, so any change
/// to the election, the voter roll or the candidate list after sealing shows
/// up as a hash mismatch. Votes cast after sealing never invalidate the seal.
pub struct SealManager {
    stores: Stores,
}

impl SealManager {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Snapshot the election and persist a new seal over it.
    pub async fn generate_seal(
        &self,
        election_id: ElectionId,
        admin_id: AdminId,
        origin: &RequestOrigin,
    ) -> Result<ElectionSeal> {
        let directory = &self.stores.directory;
        let election = directory
            .election(election_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Election with ID '{election_id}'")))?;

        let snapshot = SealSnapshot {
            election_id,
            title: election.title,
            registered_voter_count: directory.count_registered_voters().await?,
            candidate_count: directory.count_candidates(election_id).await?,
            cast_vote_count: self.stores.ballots.count_by_election(election_id).await?,
            timestamp: self.stores.now(),
        };
        // Keep the exact string that was hashed. It is never rebuilt.
        let system_data = snapshot.canonical_json();
        let seal = ElectionSeal {
            seal_hash: sha256_hex(&system_data),
            seal_type: SealType::ElectionSeal,
            election_id,
            sealed_at: snapshot.timestamp,
            sealed_by: admin_id,
            system_data,
            ip_address: Some(origin.ip_address.clone()),
            user_agent: Some(origin.user_agent.clone()),
            is_valid: true,
        };
        self.stores.seals.insert_seal(seal.clone()).await?;
        info!("Generated seal {} for election {election_id}", seal.seal_hash);
        Ok(seal)
    }

    pub async fn latest_seal(&self, election_id: ElectionId) -> Result<Option<ElectionSeal>> {
        Ok(self
            .stores
            .seals
            .latest_seal(election_id, SealType::ElectionSeal)
            .await?)
    }

    /// Compare `provided_hash` against the latest stored seal, and the stored
    /// seal against a recomputation over the election's current state. Every
    /// verification is audited, failed ones as failures.
    pub async fn verify_seal(
        &self,
        election_id: ElectionId,
        provided_hash: &str,
    ) -> Result<VerificationResult> {
        let seal = self
            .latest_seal(election_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Seal for election '{election_id}'")))?;
        let check = check_seal(&self.stores, &seal).await?;
        let provided_matches = provided_hash.eq_ignore_ascii_case(&seal.seal_hash);

        let message = if !check.record_intact {
            "Stored seal record has been altered"
        } else if !provided_matches {
            "Provided hash does not match the stored seal"
        } else if !check.state_unchanged {
            "Election state has changed since sealing"
        } else {
            "Seal is valid"
        };
        let is_valid = check.holds() && provided_matches;
        let outcome = if is_valid {
            AuditOutcome::Success
        } else {
            warn!("Seal verification failed for election {election_id}: {message}");
            AuditOutcome::Failure
        };
        record_audit(
            self.stores.audit.as_ref(),
            AuditRecord::new(
                Actor::System,
                "verify_seal",
                "election_seal",
                Some(election_id.to_string()),
                format!(
                    "{message}: provided {provided_hash}, stored {}, recomputed {}",
                    seal.seal_hash, check.recomputed_hash
                ),
                outcome,
                self.stores.now(),
            ),
        )
        .await;

        Ok(VerificationResult {
            is_valid,
            stored_hash: seal.seal_hash,
            recomputed_hash: check.recomputed_hash,
            sealed_at: seal.sealed_at,
            message: message.to_string(),
        })
    }

    /// Seal an active, unsealed election so voting can begin.
    pub async fn seal_election(
        &self,
        election_id: ElectionId,
        admin_id: AdminId,
        origin: &RequestOrigin,
    ) -> Result<SealResult> {
        let election = self
            .stores
            .directory
            .election(election_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Election with ID '{election_id}'")))?;

        if election.is_sealed {
            return Err(self
                .refuse(election_id, admin_id, Status::Conflict, "Election is already sealed")
                .await);
        }
        if election.status != ElectionStatus::Active {
            return Err(self
                .refuse(
                    election_id,
                    admin_id,
                    Status::BadRequest,
                    "Only active elections can be sealed",
                )
                .await);
        }

        let seal = self.generate_seal(election_id, admin_id, origin).await?;
        let sealed = self
            .stores
            .directory
            .mark_sealed(election_id, &seal.seal_hash, seal.sealed_at, admin_id)
            .await?;
        if !sealed {
            // Another administrator sealed it between our read and our write.
            return Err(self
                .refuse(election_id, admin_id, Status::Conflict, "Election is already sealed")
                .await);
        }

        record_audit(
            self.stores.audit.as_ref(),
            AuditRecord::new(
                Actor::Admin(admin_id),
                "seal_election",
                "election",
                Some(election_id.to_string()),
                format!("Election sealed with hash {}", seal.seal_hash),
                AuditOutcome::Success,
                seal.sealed_at,
            ),
        )
        .await;
        info!("Election {election_id} sealed by admin {admin_id}");

        Ok(SealResult {
            election_id,
            seal_hash: seal.seal_hash,
            sealed_at: seal.sealed_at,
            sealed_by: admin_id,
            message: "Election sealed successfully".to_string(),
        })
    }

    /// Audit a refused sealing attempt and build the error for it.
    async fn refuse(
        &self,
        election_id: ElectionId,
        admin_id: AdminId,
        status: Status,
        reason: &str,
    ) -> Error {
        record_audit(
            self.stores.audit.as_ref(),
            AuditRecord::new(
                Actor::Admin(admin_id),
                "seal_election",
                "election",
                Some(election_id.to_string()),
                reason,
                AuditOutcome::Failure,
                self.stores.now(),
            ),
        )
        .await;
        Error::Status(status, reason.to_string())
    }
}

/// A stored election seal checked against itself and the current state.
pub(crate) struct SealCheck {
    pub recomputed_hash: String,
    /// The stored snapshot still hashes to the stored seal hash.
    pub record_intact: bool,
    /// The snapshot with its refreshed fields re-read hashes to the stored
    /// seal hash.
    pub state_unchanged: bool,
}

impl SealCheck {
    pub fn holds(&self) -> bool {
        self.record_intact && self.state_unchanged
    }
}

/// Recompute `seal` with the frozen fields taken from its stored snapshot
/// and the refreshed ones from the directory.
pub(crate) async fn check_seal(stores: &Stores, seal: &ElectionSeal) -> Result<SealCheck> {
    let stored = seal.snapshot()?;
    let directory = &stores.directory;
    let election = directory
        .election(seal.election_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election with ID '{}'", seal.election_id)))?;
    let current = SealSnapshot {
        election_id: stored.election_id,
        title: election.title,
        registered_voter_count: directory.count_registered_voters().await?,
        candidate_count: directory.count_candidates(seal.election_id).await?,
        cast_vote_count: stored.cast_vote_count,
        timestamp: stored.timestamp,
    };
    let recomputed_hash = current.hash();

    Ok(SealCheck {
        record_intact: sha256_hex(&seal.system_data).eq_ignore_ascii_case(&seal.seal_hash),
        state_unchanged: recomputed_hash.eq_ignore_ascii_case(&seal.seal_hash),
        recomputed_hash,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::model::{
        common::VoteChoice,
        db::{Candidate, Election},
    };
    use crate::service::harness::{Harness, ADMIN};
    use crate::store::Clock;

    use super::*;

    #[rocket::async_test]
    async fn seal_snapshots_election_state() {
        let harness = Harness::new();
        let seals = &harness.services.seals;
        let seal = seals
            .generate_seal(1, ADMIN, &RequestOrigin::example())
            .await
            .unwrap();

        let snapshot = seal.snapshot().unwrap();
        assert_eq!(snapshot.election_id, 1);
        assert_eq!(snapshot.title, "Board election");
        assert_eq!(snapshot.registered_voter_count, 2);
        assert_eq!(snapshot.candidate_count, 3);
        assert_eq!(snapshot.cast_vote_count, 0);
        assert_eq!(snapshot.timestamp, harness.clock.now());
        assert_eq!(seal.seal_hash, sha256_hex(&seal.system_data));
        assert_eq!(seal.seal_hash, snapshot.hash());
        assert_eq!(seal.seal_type, SealType::ElectionSeal);
        assert_eq!(seals.latest_seal(1).await.unwrap(), Some(seal));
    }

    #[rocket::async_test]
    async fn seal_of_unknown_election_is_not_found() {
        let harness = Harness::new();
        let result = harness
            .services
            .seals
            .generate_seal(99, ADMIN, &RequestOrigin::example())
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(harness.store.seals().is_empty());
    }

    #[rocket::async_test]
    async fn latest_seal_wins() {
        let harness = Harness::new();
        let seals = &harness.services.seals;
        let origin = RequestOrigin::example();
        let first = seals.generate_seal(1, ADMIN, &origin).await.unwrap();
        harness.clock.advance(Duration::minutes(5));
        let second = seals.generate_seal(1, ADMIN, &origin).await.unwrap();

        assert_ne!(first.seal_hash, second.seal_hash);
        assert_eq!(seals.latest_seal(1).await.unwrap(), Some(second));
        assert_eq!(seals.latest_seal(2).await.unwrap(), None);
    }

    #[rocket::async_test]
    async fn fresh_seal_verifies() {
        let harness = Harness::new();
        let seals = &harness.services.seals;
        let seal = seals
            .generate_seal(1, ADMIN, &RequestOrigin::example())
            .await
            .unwrap();
        // Time passing does not matter: the timestamp is frozen.
        harness.clock.advance(Duration::days(3));

        let result = seals.verify_seal(1, &seal.seal_hash).await.unwrap();
        assert!(result.is_valid, "{}", result.message);
        assert_eq!(harness.store.audit_actions(), vec!["verify_seal".to_string()]);
        assert_eq!(
            harness.store.audit_records()[0].outcome,
            AuditOutcome::Success
        );
        assert_eq!(result.stored_hash, seal.seal_hash);
        assert_eq!(result.recomputed_hash, seal.seal_hash);
        assert_eq!(result.sealed_at, seal.sealed_at);

        let lower = seals
            .verify_seal(1, &seal.seal_hash.to_lowercase())
            .await
            .unwrap();
        assert!(lower.is_valid);
    }

    #[rocket::async_test]
    async fn roll_change_invalidates_seal() {
        let harness = Harness::new();
        let seals = &harness.services.seals;
        let seal = seals
            .generate_seal(1, ADMIN, &RequestOrigin::example())
            .await
            .unwrap();

        harness.add_voter(3);
        let result = seals.verify_seal(1, &seal.seal_hash).await.unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.stored_hash, seal.seal_hash);
        assert_ne!(result.recomputed_hash, seal.seal_hash);
        assert_eq!(result.message, "Election state has changed since sealing");

        let record = harness.store.audit_records().pop().unwrap();
        assert_eq!(record.action, "verify_seal");
        assert_eq!(record.actor_type, "system");
        assert_eq!(record.actor_id, None);
        assert_eq!(record.entity_id.as_deref(), Some("1"));
        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert!(record.details.contains(&result.stored_hash));
        assert!(record.details.contains(&result.recomputed_hash));
    }

    #[rocket::async_test]
    async fn candidate_or_title_change_invalidates_seal() {
        let harness = Harness::new();
        let seals = &harness.services.seals;
        let seal = seals
            .generate_seal(1, ADMIN, &RequestOrigin::example())
            .await
            .unwrap();

        harness.store.add_candidate(Candidate {
            id: 102,
            ..Candidate::example()
        });
        assert!(!seals.verify_seal(1, &seal.seal_hash).await.unwrap().is_valid);

        let harness = Harness::new();
        let seals = &harness.services.seals;
        let seal = seals
            .generate_seal(1, ADMIN, &RequestOrigin::example())
            .await
            .unwrap();
        harness
            .store
            .update_election(1, |e| e.title = "Renamed".to_string());
        assert!(!seals.verify_seal(1, &seal.seal_hash).await.unwrap().is_valid);
    }

    #[rocket::async_test]
    async fn wrong_provided_hash_is_invalid() {
        let harness = Harness::new();
        let seals = &harness.services.seals;
        seals
            .generate_seal(1, ADMIN, &RequestOrigin::example())
            .await
            .unwrap();

        let result = seals.verify_seal(1, "0BADC0DE").await.unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.recomputed_hash, result.stored_hash);
        assert_eq!(result.message, "Provided hash does not match the stored seal");
    }

    #[rocket::async_test]
    async fn verify_without_seal_is_not_found() {
        let harness = Harness::new();
        assert!(matches!(
            harness.services.seals.verify_seal(1, "ANY").await,
            Err(Error::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn votes_cast_after_sealing_keep_seal_valid() {
        let harness = Harness::sealed().await;
        harness.cast(1, 10, VoteChoice::Candidate(100)).await;
        harness.cast(2, 10, VoteChoice::Blank).await;

        let seal_hash = harness.store.seals()[0].seal_hash.clone();
        let result = harness.services.seals.verify_seal(1, &seal_hash).await.unwrap();
        assert!(result.is_valid, "{}", result.message);
    }

    #[rocket::async_test]
    async fn sealing_marks_election() {
        let harness = Harness::new();
        let result = harness
            .services
            .seals
            .seal_election(1, ADMIN, &RequestOrigin::example())
            .await
            .unwrap();
        assert_eq!(result.election_id, 1);
        assert_eq!(result.sealed_by, ADMIN);

        let election = harness.stores().directory.election(1).await.unwrap().unwrap();
        assert!(election.is_sealed);
        assert_eq!(election.seal_hash, Some(result.seal_hash.clone()));
        assert_eq!(election.sealed_at, Some(result.sealed_at));
        assert_eq!(election.sealed_by, Some(ADMIN));

        let records = harness.store.audit_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "seal_election");
        assert_eq!(records[0].actor_id, Some(ADMIN));
        assert_eq!(records[0].outcome, AuditOutcome::Success);
    }

    #[rocket::async_test]
    async fn sealing_twice_is_refused() {
        let harness = Harness::sealed().await;
        let result = harness
            .services
            .seals
            .seal_election(1, ADMIN, &RequestOrigin::example())
            .await;
        assert!(matches!(result, Err(Error::Status(s, _)) if s == Status::Conflict));
        assert_eq!(harness.store.seals().len(), 1);
        let outcomes = harness
            .store
            .audit_records()
            .into_iter()
            .map(|r| r.outcome)
            .collect::<Vec<_>>();
        assert_eq!(outcomes, vec![AuditOutcome::Success, AuditOutcome::Failure]);
    }

    #[rocket::async_test]
    async fn only_active_elections_are_sealed() {
        let harness = Harness::new();
        harness.store.add_election(Election {
            id: 2,
            status: ElectionStatus::Draft,
            ..Election::example()
        });
        let seals = &harness.services.seals;
        let origin = RequestOrigin::example();
        assert!(matches!(
            seals.seal_election(2, ADMIN, &origin).await,
            Err(Error::Status(s, _)) if s == Status::BadRequest
        ));
        assert!(matches!(
            seals.seal_election(3, ADMIN, &origin).await,
            Err(Error::NotFound(_))
        ));
        assert!(harness.store.seals().is_empty());
    }

    #[rocket::async_test]
    async fn audit_outage_does_not_block_sealing() {
        let harness = Harness::new();
        harness.store.set_audit_failing(true);
        harness
            .services
            .seals
            .seal_election(1, ADMIN, &RequestOrigin::example())
            .await
            .unwrap();
        assert!(harness.store.audit_records().is_empty());
    }
}
