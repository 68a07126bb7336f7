use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::common::VoterId;

/// A registered voter, as maintained by the voter manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: VoterId,
    pub name: String,
    /// Brazilian taxpayer number, 11 digits, possibly punctuated.
    pub cpf: String,
    pub is_active: bool,
    /// Multiplier applied to this voter's ballot in weighted totals.
    pub vote_weight: Decimal,
}

impl Voter {
    /// The CPF with all but the first three and last two digits hidden,
    /// e.g. `123.***.**01`.
    pub fn masked_cpf(&self) -> String {
        let digits: Vec<char> = self.cpf.chars().filter(char::is_ascii_digit).collect();
        if digits.len() != 11 {
            return "***.***.***-**".to_string();
        }
        format!(
            "{}.***.**{}",
            digits[..3].iter().collect::<String>(),
            digits[9..].iter().collect::<String>()
        )
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Voter {
        pub fn example() -> Self {
            Self {
                id: 1,
                name: "Maria Oliveira".to_string(),
                cpf: "12345678901".to_string(),
                is_active: true,
                vote_weight: Decimal::ONE,
            }
        }

        pub fn example2() -> Self {
            Self {
                id: 2,
                name: "João Pereira".to_string(),
                cpf: "987.654.321-00".to_string(),
                is_active: true,
                vote_weight: Decimal::new(25, 1),
            }
        }
    }
}
