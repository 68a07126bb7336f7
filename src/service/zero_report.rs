use chrono::Duration;
use log::{info, warn};
use rocket::{http::Status, serde::json::serde_json};

use crate::crypto::digest::sha256_hex;
use crate::error::{Error, Result};
use crate::model::{
    api::zero_report::{ZeroReportCandidate, ZeroReportPosition, ZeroReportView},
    common::{AdminId, ElectionId},
    db::{Actor, AuditOutcome, AuditRecord, ZeroReport},
};
use crate::store::{StoreError, Stores};

use super::record_audit;

/// Issues the pre-election zero report, attesting that no ballots exist
/// shortly before voting opens.
pub struct ZeroReports {
    stores: Stores,
    /// How long before the start of voting a report may be generated.
    window: Duration,
}

impl ZeroReports {
    pub fn new(stores: Stores, window: Duration) -> Self {
        Self { stores, window }
    }

    pub async fn generate_zero_report(
        &self,
        election_id: ElectionId,
        admin_id: AdminId,
        ip_address: &str,
    ) -> Result<ZeroReportView> {
        let directory = &self.stores.directory;
        let election = directory
            .election(election_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Election with ID '{election_id}'")))?;

        let now = self.stores.now();
        let starts_at = election.starts_at().ok_or_else(|| {
            Error::bad_request(format!(
                "Election {election_id} has an unknown timezone '{}'",
                election.timezone
            ))
        })?;
        let until_start = starts_at - now;
        if until_start < Duration::zero() || until_start > self.window {
            let msg = format!(
                "Zero report can only be generated in the {} minutes before voting starts",
                self.window.num_minutes()
            );
            self.audit(admin_id, election_id, &msg, AuditOutcome::Failure)
                .await;
            return Err(Error::bad_request(msg));
        }

        let mut positions = Vec::new();
        let mut total_candidates = 0;
        for position in directory.positions(election_id).await? {
            let candidates = directory.candidates(position.id).await?;
            total_candidates += candidates.len() as u64;
            positions.push(ZeroReportPosition {
                position_id: position.id,
                position_name: position.name,
                total_votes: self
                    .stores
                    .ballots
                    .count_by_position(election_id, position.id)
                    .await?,
                candidates: candidates
                    .into_iter()
                    .map(|c| ZeroReportCandidate {
                        candidate_name: c.name,
                        candidate_number: c.number,
                        vote_count: 0,
                    })
                    .collect(),
            });
        }

        let mut view = ZeroReportView {
            election_id,
            election_title: election.title,
            generated_at: now,
            generated_by: admin_id,
            total_registered_voters: directory.count_active_voters().await?,
            total_candidates,
            total_positions: positions.len() as u64,
            total_votes: self.stores.ballots.count_by_election(election_id).await?,
            positions,
            report_hash: String::new(),
        };
        if view.total_votes > 0 {
            warn!(
                "Zero report for election {election_id} found {} ballots already cast",
                view.total_votes
            );
        }
        let report_data = serde_json::to_string(&view)?;
        view.report_hash = sha256_hex(&report_data);

        let report = ZeroReport {
            election_id,
            generated_at: now,
            generated_by: admin_id,
            report_data,
            report_hash: view.report_hash.clone(),
            total_registered_voters: view.total_registered_voters,
            total_candidates: view.total_candidates,
            total_positions: view.total_positions,
            total_votes: view.total_votes,
            ip_address: ip_address.to_string(),
        };
        match self.stores.zero_reports.insert_zero_report(report).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                let msg = "A zero report already exists for this election";
                self.audit(admin_id, election_id, msg, AuditOutcome::Failure)
                    .await;
                return Err(Error::Status(Status::Conflict, msg.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        self.audit(
            admin_id,
            election_id,
            &format!("Zero report generated with hash {}", view.report_hash),
            AuditOutcome::Success,
        )
        .await;
        info!("Generated zero report for election {election_id}");
        Ok(view)
    }

    pub async fn zero_report(&self, election_id: ElectionId) -> Result<ZeroReportView> {
        let report = self
            .stores
            .zero_reports
            .zero_report(election_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Zero report for election '{election_id}'")))?;
        let mut view: ZeroReportView = serde_json::from_str(&report.report_data)?;
        view.report_hash = report.report_hash;
        Ok(view)
    }

    async fn audit(
        &self,
        admin_id: AdminId,
        election_id: ElectionId,
        details: &str,
        outcome: AuditOutcome,
    ) {
        record_audit(
            self.stores.audit.as_ref(),
            AuditRecord::new(
                Actor::Admin(admin_id),
                "generate_zero_report",
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
