use chrono::{DateTime, Utc};
use rocket::serde::json::serde_json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::crypto::digest::sha256_hex;
use crate::model::common::{CandidateId, ElectionId, PositionId};

/// Votes counted for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub candidate_id: CandidateId,
    pub candidate_name: String,
    pub candidate_number: Option<String>,
    pub votes: u64,
    /// Sum of the weights of the ballots counted for this candidate.
    pub weighted_votes: Decimal,
    /// Share of all ballots cast for the position, in percent, two places.
    pub percentage: Decimal,
}

/// The tally for one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionCount {
    pub position_id: PositionId,
    pub position_name: String,
    pub max_candidates: u32,
    /// Every valid ballot cast for this position, counted or not.
    pub total_votes: u64,
    pub blank_votes: u64,
    pub null_votes: u64,
    /// Candidate ballots that could not be counted; see the excluded list.
    pub excluded_votes: u64,
    /// Ranked: most votes first, ties broken by lowest candidate ID.
    pub candidates: Vec<CandidateTally>,
}

impl PositionCount {
    pub fn rank(&mut self) {
        self.candidates.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
    }

    /// Fill in every candidate's percentage of `total_votes`.
    pub fn compute_percentages(&mut self) {
        let total = self.total_votes;
        for tally in self.candidates.iter_mut() {
            tally.percentage = percentage(tally.votes, total);
        }
    }

    /// The top `max_candidates` of the ranking, and whether the candidate
    /// just outside the cutoff has the same count as the last winner.
    pub fn winners(&self) -> (Vec<CandidateId>, bool) {
        let seats = self.max_candidates as usize;
        let winners = self
            .candidates
            .iter()
            .take(seats)
            .map(|tally| tally.candidate_id)
            .collect::<Vec<_>>();
        let tie_at_cutoff = seats > 0
            && self.candidates.len() > seats
            && self.candidates[seats - 1].votes == self.candidates[seats].votes;
        (winners, tie_at_cutoff)
    }

    fn counted_votes(&self) -> u64 {
        self.candidates.iter().map(|tally| tally.votes).sum::<u64>()
            + self.blank_votes
            + self.null_votes
            + self.excluded_votes
    }

    fn is_ranked(&self) -> bool {
        self.candidates.windows(2).all(|pair| {
            pair[0].votes > pair[1].votes
                || (pair[0].votes == pair[1].votes && pair[0].candidate_id < pair[1].candidate_id)
        })
    }
}

/// `votes / total * 100`, rounded to two places. Zero when nothing was cast.
pub fn percentage(votes: u64, total: u64) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(votes) * Decimal::ONE_HUNDRED / Decimal::from(total)).round_dp(2)
}

/// Why a ballot was left out of a tally.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// The ballot was cast under a seal that is no longer the election's.
    SealMismatch,
    /// The ballot's seal no longer verifies against the election's state.
    SealInvalidated,
    DecryptionFailed,
    SignatureMismatch,
    VoteHashMismatch,
    CreationHashMismatch,
    /// The decrypted candidate does not stand for the ballot's position.
    UnknownCandidate,
    /// The ballot's position is not part of the election.
    UnknownPosition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedBallot {
    pub vote_id: String,
    pub position_id: PositionId,
    pub reason: ExclusionReason,
}

/// A full tally of an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCountResult {
    pub election_id: ElectionId,
    pub election_title: String,
    pub counted_at: DateTime<Utc>,
    pub total_votes: u64,
    pub total_blank_votes: u64,
    pub total_null_votes: u64,
    pub positions: Vec<PositionCount>,
    pub excluded: Vec<ExcludedBallot>,
}

impl VoteCountResult {
    pub fn position(&self, position_id: PositionId) -> Option<&PositionCount> {
        self.positions.iter().find(|p| p.position_id == position_id)
    }
}

/// A position's tally together with its winners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionResult {
    #[serde(flatten)]
    pub count: PositionCount,
    pub winners: Vec<CandidateId>,
    /// Set when a tie straddles the winner cutoff. Resolution is left to the
    /// election's own rules.
    pub tie_at_cutoff: bool,
}

impl From<PositionCount> for PositionResult {
    fn from(count: PositionCount) -> Self {
        let (winners, tie_at_cutoff) = count.winners();
        Self {
            count,
            winners,
            tie_at_cutoff,
        }
    }
}

/// Published election results, hashed for tamper evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election_id: ElectionId,
    pub election_title: String,
    pub generated_at: DateTime<Utc>,
    pub total_votes: u64,
    pub total_blank_votes: u64,
    pub total_null_votes: u64,
    pub positions: Vec<PositionResult>,
    pub excluded: Vec<ExcludedBallot>,
    /// SHA-256 over every other field.
    pub result_hash: String,
}

/// The hashed part of [`ElectionResults`].
#[derive(Serialize)]
struct HashedResults<'a> {
    election_id: ElectionId,
    election_title: &'a str,
    generated_at: &'a DateTime<Utc>,
    total_votes: u64,
    total_blank_votes: u64,
    total_null_votes: u64,
    positions: &'a [PositionResult],
    excluded: &'a [ExcludedBallot],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// The published hash does not match the content.
    ResultHash { published: String, computed: String },
    /// A position's tallies do not add up to its total.
    PositionTotals { position_id: PositionId },
    /// Position totals do not add up to the election totals.
    ElectionTotals,
    /// A candidate's percentage is wrong.
    Percentage {
        position_id: PositionId,
        candidate_id: CandidateId,
    },
    /// Candidates are not listed in rank order.
    Ranking { position_id: PositionId },
    /// The listed winners are not the top of the ranking.
    Winners { position_id: PositionId },
}

impl ElectionResults {
    pub fn new(count: VoteCountResult, generated_at: DateTime<Utc>) -> Self {
        let mut results = Self {
            election_id: count.election_id,
            election_title: count.election_title,
            generated_at,
            total_votes: count.total_votes,
            total_blank_votes: count.total_blank_votes,
            total_null_votes: count.total_null_votes,
            positions: count.positions.into_iter().map(PositionResult::from).collect(),
            excluded: count.excluded,
            result_hash: String::new(),
        };
        results.result_hash = results.compute_hash();
        results
    }

    /// Hash the results as they currently stand.
    pub fn compute_hash(&self) -> String {
        sha256_hex(&self.hashed_json())
    }

    /// The exact string [`compute_hash`](Self::compute_hash) hashes.
    pub fn hashed_json(&self) -> String {
        let hashed = HashedResults {
            election_id: self.election_id,
            election_title: &self.election_title,
            generated_at: &self.generated_at,
            total_votes: self.total_votes,
            total_blank_votes: self.total_blank_votes,
            total_null_votes: self.total_null_votes,
            positions: &self.positions,
            excluded: &self.excluded,
        };
        serde_json::to_string(&hashed).expect("Serialisation is infallible")
    }

    /// Check the published hash and the internal consistency of the results.
    pub fn verify(&self) -> Result<(), VerificationError> {
        let computed = self.compute_hash();
        if !computed.eq_ignore_ascii_case(&self.result_hash) {
            return Err(VerificationError::ResultHash {
                published: self.result_hash.clone(),
                computed,
            });
        }

        let mut blank = 0;
        let mut null = 0;
        for position in &self.positions {
            let count = &position.count;
            if count.counted_votes() != count.total_votes {
                return Err(VerificationError::PositionTotals {
                    position_id: count.position_id,
                });
            }
            for tally in &count.candidates {
                if tally.percentage != percentage(tally.votes, count.total_votes) {
                    return Err(VerificationError::Percentage {
                        position_id: count.position_id,
                        candidate_id: tally.candidate_id,
                    });
                }
            }
            if !count.is_ranked() {
                return Err(VerificationError::Ranking {
                    position_id: count.position_id,
                });
            }
            if count.winners() != (position.winners.clone(), position.tie_at_cutoff) {
                return Err(VerificationError::Winners {
                    position_id: count.position_id,
                });
            }
            blank += count.blank_votes;
            null += count.null_votes;
        }

        let total: u64 = self.positions.iter().map(|p| p.count.total_votes).sum();
        if total != self.total_votes || blank != self.total_blank_votes || null != self.total_null_votes
        {
            return Err(VerificationError::ElectionTotals);
        }
        Ok(())
    }
}

/// Example data for tests.
#[cfg(test)]
pub(crate) mod examples {
    use chrono::TimeZone;

    use super::*;

    fn tally(candidate_id: CandidateId, name: &str, votes: u64, total: u64) -> CandidateTally {
        CandidateTally {
            candidate_id,
            candidate_name: name.to_string(),
            candidate_number: None,
            votes,
            weighted_votes: Decimal::from(votes),
            percentage: percentage(votes, total),
        }
    }

    impl VoteCountResult {
        pub fn example() -> Self {
            let mut president = PositionCount {
                position_id: 10,
                position_name: "President".to_string(),
                max_candidates: 1,
                total_votes: 6,
                blank_votes: 1,
                null_votes: 0,
                excluded_votes: 0,
                candidates: vec![tally(101, "Bruno Lima", 2, 6), tally(100, "Ana Souza", 3, 6)],
            };
            president.rank();
            let mut treasurer = PositionCount {
                position_id: 20,
                position_name: "Treasurer".to_string(),
                max_candidates: 1,
                total_votes: 4,
                blank_votes: 0,
                null_votes: 1,
                excluded_votes: 1,
                candidates: vec![tally(200, "Carla Dias", 1, 4), tally(201, "Davi Rocha", 1, 4)],
            };
            treasurer.rank();
            Self {
                election_id: 1,
                election_title: "Board election".to_string(),
                counted_at: Utc.with_ymd_and_hms(2024, 11, 1, 9, 0, 0).unwrap(),
                total_votes: 10,
                total_blank_votes: 1,
                total_null_votes: 1,
                positions: vec![president, treasurer],
                excluded: vec![ExcludedBallot {
                    vote_id: "DEADBEEF".to_string(),
                    position_id: 20,
                    reason: ExclusionReason::DecryptionFailed,
                }],
            }
        }
    }

    impl ElectionResults {
        pub fn example() -> Self {
            let count = VoteCountResult::example();
            let generated_at = count.counted_at;
            Self::new(count, generated_at)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_breaks_ties_by_candidate_id() {
        let results = ElectionResults::example();
        let president = &results.positions[0];
        assert_eq!(president.winners, vec![100]);
        assert!(!president.tie_at_cutoff);

        let treasurer = &results.positions[1];
        assert_eq!(
            treasurer
                .count
                .candidates
                .iter()
                .map(|t| t.candidate_id)
                .collect::<Vec<_>>(),
            vec![200, 201]
        );
        assert_eq!(treasurer.winners, vec![200]);
        assert!(treasurer.tie_at_cutoff);
    }

    #[test]
    fn percentages() {
        assert_eq!(percentage(1, 3), Decimal::new(3333, 2));
        assert_eq!(percentage(0, 0), Decimal::ZERO);
        assert_eq!(percentage(2, 2), Decimal::ONE_HUNDRED);
    }

    #[test]
    fn example_verifies() {
        assert_eq!(ElectionResults::example().verify(), Ok(()));
    }

    #[test]
    fn hash_survives_json() {
        let results = ElectionResults::example();
        let json = serde_json::to_string(&results).unwrap();
        let back: ElectionResults = serde_json::from_str(&json).unwrap();
        assert_eq!(back, results);
        assert_eq!(back.compute_hash(), results.result_hash);
    }

    #[test]
    fn edited_tally_breaks_hash() {
        let mut results = ElectionResults::example();
        results.positions[0].count.candidates[0].votes += 1;
        assert!(matches!(
            results.verify(),
            Err(VerificationError::ResultHash { .. })
        ));
    }

    #[test]
    fn rehashed_edit_is_still_caught() {
        let mut results = ElectionResults::example();
        results.positions[0].count.candidates[0].votes += 1;
        results.result_hash = results.compute_hash();
        assert_eq!(
            results.verify(),
            Err(VerificationError::PositionTotals { position_id: 10 })
        );

        let mut results = ElectionResults::example();
        results.positions[0].winners = vec![101];
        results.result_hash = results.compute_hash();
        assert_eq!(
            results.verify(),
            Err(VerificationError::Winners { position_id: 10 })
        );

        let mut results = ElectionResults::example();
        results.total_votes += 1;
        results.result_hash = results.compute_hash();
        assert_eq!(results.verify(), Err(VerificationError::ElectionTotals));
    }
}
