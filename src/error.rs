use log::{error, warn};
use rocket::{http::Status, response::Responder, serde::json::serde_json};
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::store::StoreError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Stored ballots failed verification; the operation refuses to go on.
    #[error("Integrity violation: {0}")]
    Integrity(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::Status(Status::BadRequest, msg.into())
    }

    pub fn status(&self) -> Status {
        match self {
            Self::NotFound(_) => Status::NotFound,
            Self::Status(status, _) => *status,
            Self::Integrity(_) => Status::Conflict,
            Self::Store(StoreError::DuplicateVote { .. } | StoreError::Duplicate(_)) => {
                Status::Conflict
            }
            Self::Store(_) | Self::Crypto(_) | Self::Json(_) => Status::InternalServerError,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        Err(status)
    }
}
