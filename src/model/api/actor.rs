//! Request guards for the caller's identity and origin.
//!
//! Authentication happens upstream: the gateway in front of this service
//! sets the actor headers only after it has authenticated the caller.

use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};
use thiserror::Error;

use crate::model::{
    api::cast::RequestOrigin,
    common::{AdminId, VoterId},
};

pub const VOTER_ID_HEADER: &str = "X-Voter-Id";
pub const ADMIN_ID_HEADER: &str = "X-Admin-Id";

/// The authenticated voter making a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VoterActor(pub VoterId);

/// The authenticated administrator making a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AdminActor(pub AdminId);

#[derive(Debug, Error)]
pub enum ActorError {
    #[error("Missing `{0}` header")]
    Missing(&'static str),
    #[error("Malformed `{0}` header")]
    Malformed(&'static str),
}

fn actor_id(req: &Request<'_>, header: &'static str) -> Outcome<u32, ActorError> {
    match req.headers().get_one(header) {
        None => Outcome::Failure((Status::Unauthorized, ActorError::Missing(header))),
        Some(value) => match value.trim().parse() {
            Ok(id) => Outcome::Success(id),
            Err(_) => Outcome::Failure((Status::BadRequest, ActorError::Malformed(header))),
        },
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for VoterActor {
    type Error = ActorError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        actor_id(req, VOTER_ID_HEADER).map(VoterActor)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminActor {
    type Error = ActorError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        actor_id(req, ADMIN_ID_HEADER).map(AdminActor)
    }
}

/// Never fails: an unknown address or user agent is recorded as such.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestOrigin {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(RequestOrigin {
            ip_address: req
                .client_ip()
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            user_agent: req
                .headers()
                .get_one("User-Agent")
                .unwrap_or_default()
                .to_string(),
        })
    }
}
