use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{
        actor::AdminActor,
        cast::RequestOrigin,
        seal::{SealResult, VerificationResult, VerifySealRequest},
        zero_report::ZeroReportView,
    },
    common::ElectionId,
};
use crate::service::{SealManager, ZeroReports};

pub fn routes() -> Vec<Route> {
    routes![seal_election, verify_seal, generate_zero_report, zero_report]
}

#[post("/elections/<election_id>/seal")]
async fn seal_election(
    admin: AdminActor,
    origin: RequestOrigin,
    election_id: ElectionId,
    seals: &State<SealManager>,
) -> Result<Json<SealResult>> {
    let result = seals.seal_election(election_id, admin.0, &origin).await?;
    Ok(Json(result))
}

/// Anyone holding a seal hash may check it.
#[post("/elections/<election_id>/seal/verify", data = "<request>", format = "json")]
async fn verify_seal(
    election_id: ElectionId,
    request: Json<VerifySealRequest>,
    seals: &State<SealManager>,
) -> Result<Json<VerificationResult>> {
    let result = seals.verify_seal(election_id, &request.seal_hash).await?;
    Ok(Json(result))
}

#[post("/elections/<election_id>/zero-report")]
async fn generate_zero_report(
    admin: AdminActor,
    origin: RequestOrigin,
    election_id: ElectionId,
    zero_reports: &State<ZeroReports>,
) -> Result<Json<ZeroReportView>> {
    let report = zero_reports
        .generate_zero_report(election_id, admin.0, &origin.ip_address)
        .await?;
    Ok(Json(report))
}

#[get("/elections/<election_id>/zero-report")]
async fn zero_report(
    election_id: ElectionId,
    zero_reports: &State<ZeroReports>,
) -> Result<Json<ZeroReportView>> {
    let report = zero_reports.zero_report(election_id).await?;
    Ok(Json(report))
}
