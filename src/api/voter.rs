use log::info;
use rocket::{http::Status, response::status::Custom, serde::json::Json, Route, State};

use crate::error::Result;
use crate::logging::RequestId;
use crate::model::{
    api::{
        actor::VoterActor,
        cast::{CastOutcome, CastVote, CastVoteRequest, Rejection, RejectionKind, RequestOrigin},
        receipt::Receipt,
        status::ElectionStatusView,
    },
    common::ElectionId,
};
use crate::service::VotingService;

pub fn routes() -> Vec<Route> {
    routes![cast_vote, election_status, vote_receipt]
}

#[post("/elections/<election_id>/votes", data = "<ballot>", format = "json")]
async fn cast_vote(
    voter: VoterActor,
    origin: RequestOrigin,
    request_id: &RequestId,
    election_id: ElectionId,
    ballot: Json<CastVoteRequest>,
    voting: &State<VotingService>,
) -> Result<Custom<Json<CastOutcome>>> {
    let VoterActor(voter_id) = voter;
    info!("req{request_id}: voter {voter_id} casting in election {election_id}");
    let cast = CastVote::from_request(voter_id, election_id, ballot.into_inner(), origin);
    let outcome = voting.cast_vote(cast).await?;

    let status = match outcome.rejection() {
        None => Status::Created,
        Some(Rejection::AlreadyVoted) => Status::Conflict,
        Some(rejection) => match rejection.kind() {
            RejectionKind::Validation => Status::BadRequest,
            RejectionKind::Eligibility => Status::Forbidden,
        },
    };
    Ok(Custom(status, Json(outcome)))
}

#[get("/elections/<election_id>/status")]
async fn election_status(
    voter: VoterActor,
    election_id: ElectionId,
    voting: &State<VotingService>,
) -> Result<Json<ElectionStatusView>> {
    let status = voting.election_status(election_id, voter.0).await?;
    Ok(Json(status))
}

/// Receipts are looked up by their unguessable token alone.
#[get("/receipts/<receipt_token>")]
async fn vote_receipt(receipt_token: &str, voting: &State<VotingService>) -> Result<Json<Receipt>> {
    let receipt = voting.vote_receipt(receipt_token).await?;
    Ok(Json(receipt))
}
