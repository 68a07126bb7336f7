//! The sealed-ballot workflows.
//!
//! Each service owns a [`Stores`] bundle and, where it touches ballot
//! contents, the shared [`VoteCryptography`] engine. None of them keeps
//! per-request state, so any number of requests may run them concurrently.

use std::sync::Arc;

use log::warn;
use rocket::{Build, Rocket};

use crate::config::Config;
use crate::crypto::VoteCryptography;
use crate::model::db::AuditRecord;
use crate::store::{AuditSink, Stores};

pub mod counting;
pub mod seal;
pub mod voting;
pub mod zero_report;

pub use counting::VoteCounter;
pub use seal::SealManager;
pub use voting::VotingService;
pub use zero_report::ZeroReports;

/// Every service, built over one set of stores.
pub struct Services {
    pub seals: SealManager,
    pub voting: VotingService,
    pub counting: VoteCounter,
    pub zero_reports: ZeroReports,
}

impl Services {
    pub fn new(stores: Stores, crypto: Arc<VoteCryptography>, config: &Config) -> Self {
        Self {
            seals: SealManager::new(stores.clone()),
            voting: VotingService::new(stores.clone(), crypto.clone()),
            counting: VoteCounter::new(
                stores.clone(),
                crypto,
                config.tally_batch_size(),
                config.tally_parallelism(),
            ),
            zero_reports: ZeroReports::new(stores, config.zero_report_window()),
        }
    }

    /// Place each service into managed state.
    pub fn manage(self, rocket: Rocket<Build>) -> Rocket<Build> {
        rocket
            .manage(self.seals)
            .manage(self.voting)
            .manage(self.counting)
            .manage(self.zero_reports)
    }
}

/// Send a record to the audit sink. A sink failure is logged but never fails
/// the audited operation.
pub(crate) async fn record_audit(audit: &dyn AuditSink, entry: AuditRecord) {
    let action = entry.action.clone();
    if let Err(e) = audit.record(entry).await {
        warn!("Failed to record audit entry for `{action}`: {e}");
    }
}
