//! A simple CLI tool for verifying published election results offline.
//! This uses the server's own verification implementation, and is by definition
//! compatible with the output of `POST /elections/<election_id>/results`.

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::BufReader;

use clap::{Arg, ArgAction, ArgMatches, Command};
use rocket::serde::json::serde_json;

use ballot_seal::model::api::results::{ElectionResults, PositionResult, VerificationError};

const PROGRAM_NAME: &str = "verify-results";

const ABOUT_TEXT: &str = "Verify the integrity of published election results.

EXIT CODES:
     0: Verification succeeded.
   255: Ran successfully, but verification failed.
 Other: Error.";

const RESULTS_PATH: &str = "RESULTS_PATH";

const RESULTS_PATH_HELP: &str = "The path to a JSON copy of the results,\n\
as returned by `POST /elections/<election_id>/results`";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME).about(ABOUT_TEXT).arg(
        Arg::new(RESULTS_PATH)
            .help(RESULTS_PATH_HELP)
            .action(ArgAction::Set)
            .required(true),
    )
}

/// Errors that this program may produce.
#[derive(Debug, Eq, PartialEq)]
enum Error {
    /// IO error described by the inner message.
    IO(String),
    /// Failed to decode the JSON document.
    Format(String),
    /// Verification failed due to the contained reason.
    Verification(VerificationError),
}

/// A human-readable summary of one position.
#[derive(Debug, Eq, PartialEq)]
struct FriendlyPosition {
    pub position_name: String,
    /// `(name, votes, percentage)`, in rank order.
    pub candidates: Vec<(String, u64, String)>,
    pub winners: Vec<String>,
    pub tie_at_cutoff: bool,
}

impl From<&PositionResult> for FriendlyPosition {
    fn from(position: &PositionResult) -> Self {
        let count = &position.count;
        let name_of = |id| {
            count
                .candidates
                .iter()
                .find(|t| t.candidate_id == id)
                .map(|t| t.candidate_name.clone())
                .unwrap_or_else(|| format!("#{id}"))
        };
        Self {
            position_name: count.position_name.clone(),
            candidates: count
                .candidates
                .iter()
                .map(|t| (t.candidate_name.clone(), t.votes, t.percentage.to_string()))
                .collect(),
            winners: position.winners.iter().copied().map(name_of).collect(),
            tie_at_cutoff: position.tie_at_cutoff,
        }
    }
}

impl Display for FriendlyPosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}:", self.position_name)?;
        for (name, votes, percentage) in &self.candidates {
            writeln!(
                f,
                "  {name}: {votes} vote{} ({percentage}%)",
                if *votes != 1 { "s" } else { "" }
            )?;
        }
        write!(f, "  Elected: {}", self.winners.join(", "))?;
        if self.tie_at_cutoff {
            write!(f, " (tied at the cutoff)")?;
        }
        Ok(())
    }
}

/// Run verification.
fn verify(path: &str) -> Result<Vec<FriendlyPosition>, Error> {
    // Load the file.
    let file = BufReader::new(File::open(path).map_err(|e| Error::IO(e.to_string()))?);
    let results: ElectionResults =
        serde_json::from_reader(file).map_err(|e| Error::Format(e.to_string()))?;

    // Run verification.
    results.verify().map_err(Error::Verification)?;

    Ok(results.positions.iter().map(FriendlyPosition::from).collect())
}

/// Run verification, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    let Some(path) = args.get_one::<String>(RESULTS_PATH) else {
        println!("Missing {RESULTS_PATH}");
        return 1;
    };
    match verify(path) {
        Ok(positions) => {
            println!("Verification succeeded.");
            for position in positions {
                println!("{position}");
            }
            0
        }
        Err(Error::IO(msg)) => {
            println!("IO error: {msg}");
            1
        }
        Err(Error::Format(msg)) => {
            println!("Invalid JSON: {msg}");
            1
        }
        Err(Error::Verification(err)) => {
            let msg = match err {
                VerificationError::ResultHash {
                    published,
                    computed,
                } => format!("The published hash {published} does not match the content ({computed})."),
                VerificationError::PositionTotals { position_id } => {
                    format!("The tallies for position {position_id} do not add up to its total.")
                }
                VerificationError::ElectionTotals => String::from(
                    "The position totals do not add up to the election totals.",
                ),
                VerificationError::Percentage {
                    position_id,
                    candidate_id,
                } => format!(
                    "The percentage for candidate {candidate_id} in position {position_id} is incorrect."
                ),
                VerificationError::Ranking { position_id } => {
                    format!("The candidates for position {position_id} are not in rank order.")
                }
                VerificationError::Winners { position_id } => {
                    format!("The winners of position {position_id} are not the top of its ranking.")
                }
            };
            println!("Verification failed: {msg}");
            255
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}
