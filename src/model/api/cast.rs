use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::model::{
    api::receipt::Receipt,
    common::{ElectionId, PositionId, VoteChoice, VoterId},
};

/// Body of a cast-vote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastVoteRequest {
    pub position_id: PositionId,
    pub choice: VoteChoice,
    #[serde(default)]
    pub justification: Option<String>,
    /// Extra client-reported device data, folded into the fingerprint.
    #[serde(default)]
    pub device: BTreeMap<String, String>,
}

/// Where a request came from, as seen by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestOrigin {
    pub ip_address: String,
    pub user_agent: String,
}

/// Everything the voting workflow needs to attempt one cast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastVote {
    pub voter_id: VoterId,
    pub election_id: ElectionId,
    pub position_id: PositionId,
    pub choice: VoteChoice,
    pub justification: Option<String>,
    pub device: BTreeMap<String, String>,
    pub origin: RequestOrigin,
}

impl CastVote {
    pub fn from_request(
        voter_id: VoterId,
        election_id: ElectionId,
        request: CastVoteRequest,
        origin: RequestOrigin,
    ) -> Self {
        Self {
            voter_id,
            election_id,
            position_id: request.position_id,
            choice: request.choice,
            justification: request.justification,
            device: request.device,
            origin,
        }
    }
}

/// Which class of expected failure a rejection belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionKind {
    /// Bad or unknown target.
    Validation,
    /// The voter or election is not in a state that allows voting.
    Eligibility,
}

/// Why a vote was not accepted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    VoterNotFound,
    VoterInactive,
    ElectionNotFound,
    ElectionNotActive,
    ElectionNotSealed,
    NotStarted,
    Ended,
    InvalidTimezone,
    AlreadyVoted,
    InvalidPosition,
    InvalidCandidate,
}

impl Rejection {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Self::InvalidPosition | Self::InvalidCandidate => RejectionKind::Validation,
            _ => RejectionKind::Eligibility,
        }
    }
}

impl Display for Rejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::VoterNotFound => "Voter not found",
            Self::VoterInactive => "Voter is inactive",
            Self::ElectionNotFound => "Election not found",
            Self::ElectionNotActive => "Election is not active",
            Self::ElectionNotSealed => "Election is not sealed for voting",
            Self::NotStarted => "Election has not started yet",
            Self::Ended => "Election has already ended",
            Self::InvalidTimezone => "Election has an unknown timezone",
            Self::AlreadyVoted => "You have already voted in this election",
            Self::InvalidPosition => "Invalid position for this election",
            Self::InvalidCandidate => "Invalid candidate for this position",
        };
        f.write_str(msg)
    }
}

/// The terminal state of one cast attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum CastOutcome {
    Accepted {
        receipt: Receipt,
    },
    Rejected {
        reason: Rejection,
        kind: RejectionKind,
        message: String,
    },
}

impl CastOutcome {
    pub fn rejected(rejection: Rejection) -> Self {
        Self::Rejected {
            kind: rejection.kind(),
            message: rejection.to_string(),
            reason: rejection,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// The rejection reason, if any.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Accepted { .. } => None,
            Self::Rejected { reason, .. } => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json;

    use super::*;

    #[test]
    fn rejection_kinds() {
        assert_eq!(Rejection::InvalidCandidate.kind(), RejectionKind::Validation);
        assert_eq!(Rejection::AlreadyVoted.kind(), RejectionKind::Eligibility);
        assert_eq!(Rejection::ElectionNotSealed.kind(), RejectionKind::Eligibility);
    }

    #[test]
    fn rejected_outcome_wire_format() {
        let outcome = CastOutcome::rejected(Rejection::AlreadyVoted);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "rejected");
        assert_eq!(json["reason"], "already_voted");
        assert_eq!(json["kind"], "eligibility");
        assert_eq!(json["message"], "You have already voted in this election");
    }
}
