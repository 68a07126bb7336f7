use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{
        actor::AdminActor,
        audit::{AuditEntry, BallotDetails, DecryptionRequest, IntegrityReport},
        results::{ElectionResults, VoteCountResult},
    },
    common::{ElectionId, PositionId},
};
use crate::service::VoteCounter;

pub fn routes() -> Vec<Route> {
    routes![
        count_votes,
        count_votes_by_position,
        integrity_report,
        generate_results,
        audit_trail,
        ballot_details,
    ]
}

#[get("/elections/<election_id>/count")]
async fn count_votes(
    _admin: AdminActor,
    election_id: ElectionId,
    counter: &State<VoteCounter>,
) -> Result<Json<VoteCountResult>> {
    Ok(Json(counter.count_votes(election_id).await?))
}

#[get("/elections/<election_id>/count/<position_id>")]
async fn count_votes_by_position(
    _admin: AdminActor,
    election_id: ElectionId,
    position_id: PositionId,
    counter: &State<VoteCounter>,
) -> Result<Json<VoteCountResult>> {
    let count = counter
        .count_votes_by_position(election_id, position_id)
        .await?;
    Ok(Json(count))
}

#[get("/elections/<election_id>/integrity")]
async fn integrity_report(
    _admin: AdminActor,
    election_id: ElectionId,
    counter: &State<VoteCounter>,
) -> Result<Json<IntegrityReport>> {
    Ok(Json(counter.integrity_report(election_id).await?))
}

/// Publishes the results, so every call stores a new report seal.
#[post("/elections/<election_id>/results")]
async fn generate_results(
    admin: AdminActor,
    election_id: ElectionId,
    counter: &State<VoteCounter>,
) -> Result<Json<ElectionResults>> {
    let results = counter
        .generate_election_results(election_id, admin.0)
        .await?;
    Ok(Json(results))
}

/// `?decrypt=true` breaks ballot secrecy, and is audited before anything is
/// decrypted.
#[get("/elections/<election_id>/audit?<decrypt>")]
async fn audit_trail(
    admin: AdminActor,
    election_id: ElectionId,
    decrypt: Option<bool>,
    counter: &State<VoteCounter>,
) -> Result<Json<Vec<AuditEntry>>> {
    let request = if decrypt.unwrap_or(false) {
        DecryptionRequest::Authorized { admin_id: admin.0 }
    } else {
        DecryptionRequest::None
    };
    Ok(Json(counter.vote_audit_trail(election_id, request).await?))
}

#[get("/ballots/<vote_id>")]
async fn ballot_details(
    _admin: AdminActor,
    vote_id: &str,
    counter: &State<VoteCounter>,
) -> Result<Json<BallotDetails>> {
    Ok(Json(counter.ballot_details(vote_id).await?))
}

#[cfg(test)]
mod tests {
    use rocket::{http::Status, local::asynchronous::Client};

    use crate::api::testing::{as_admin, client};
    use crate::model::common::VoteChoice;
    use crate::service::harness::Harness;

    use super::*;

    async fn voted_client() -> (Client, std::sync::Arc<crate::store::memory::MemoryStore>) {
        let harness = Harness::sealed().await;
        harness.cast(1, 10, VoteChoice::Candidate(100)).await;
        harness.cast(2, 20, VoteChoice::Blank).await;
        let (client, store, _) = client(harness).await;
        (client, store)
    }

    #[rocket::async_test]
    async fn counts() {
        let (client, _) = voted_client().await;

        let response = as_admin(client.get(uri!(count_votes(1)))).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let count: VoteCountResult = response.into_json().await.unwrap();
        assert_eq!(count.total_votes, 2);
        assert_eq!(count.total_blank_votes, 1);

        let response = as_admin(client.get(uri!(count_votes_by_position(1, 10))))
            .dispatch()
            .await;
        let count: VoteCountResult = response.into_json().await.unwrap();
        assert_eq!(count.positions.len(), 1);
        assert_eq!(count.positions[0].candidates[0].votes, 1);

        let response = as_admin(client.get(uri!(count_votes_by_position(1, 30))))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);

        let response = client.get(uri!(count_votes(1))).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn results_are_refused_after_tampering() {
        let (client, store) = voted_client().await;

        let response = as_admin(client.get(uri!(integrity_report(1))))
            .dispatch()
            .await;
        let report: IntegrityReport = response.into_json().await.unwrap();
        assert!(report.is_intact());
        assert_eq!(report.checked, 2);

        let response = as_admin(client.post(uri!(generate_results(1))))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let results: ElectionResults = response.into_json().await.unwrap();
        assert_eq!(results.verify(), Ok(()));

        let vote_id = store.all_ballots()[0].vote_id.clone();
        store.tamper_ballot(&vote_id, |b| b.vote_signature = "AAAA".to_string());
        let response = as_admin(client.post(uri!(generate_results(1))))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
    }

    #[rocket::async_test]
    async fn trail_is_decrypted_on_request() {
        let (client, store) = voted_client().await;

        let response = as_admin(client.get(uri!(audit_trail(1, Some(false)))))
            .dispatch()
            .await;
        let trail: Vec<AuditEntry> = response.into_json().await.unwrap();
        assert_eq!(trail.len(), 2);
        assert!(trail.iter().all(|e| e.decrypted.is_none()));
        assert!(!store
            .audit_actions()
            .contains(&"decrypt_audit_trail".to_string()));

        let response = as_admin(client.get(uri!(audit_trail(1, Some(true)))))
            .dispatch()
            .await;
        let trail: Vec<AuditEntry> = response.into_json().await.unwrap();
        assert_eq!(trail[0].decrypted.as_ref().unwrap().candidate_id, Some(100));
        assert!(store
            .audit_actions()
            .contains(&"decrypt_audit_trail".to_string()));

        store.set_audit_failing(true);
        let response = as_admin(client.get(uri!(audit_trail(1, Some(true)))))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::InternalServerError);
    }

    #[rocket::async_test]
    async fn ballot_lookup() {
        let (client, store) = voted_client().await;
        let vote_id = store.all_ballots()[1].vote_id.clone();

        let response = as_admin(client.get(uri!(ballot_details(vote_id.as_str()))))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let details: BallotDetails = response.into_json().await.unwrap();
        assert_eq!(details.voter_id, 2);
        assert_eq!(details.ballot.position_id, 20);

        let response = as_admin(client.get(uri!(ballot_details("NOPE"))))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }
}
