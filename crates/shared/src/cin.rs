use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MIN_LETTERS: usize = 1;
const MAX_LETTERS: usize = 2;
const MIN_DIGITS: usize = 5;
const MAX_DIGITS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CinError {
    #[error("CIN is empty")]
    Empty,
    #[error("CIN must start with 1 or 2 letters (ex: AE112456)")]
    InvalidPrefix,
    #[error("CIN must end with 5 or 6 digits (ex: AE112456)")]
    InvalidDigits,
}

/// A validated, uppercase CIN: 1-2 ASCII letters followed by 5-6 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cin(String);

impl Cin {
    pub fn parse(raw: &str) -> Result<Self, CinError> {
        let value = raw.trim().to_ascii_uppercase();
        if value.is_empty() {
            return Err(CinError::Empty);
        }

        let letters = value.chars().take_while(char::is_ascii_alphabetic).count();
        if !(MIN_LETTERS..=MAX_LETTERS).contains(&letters) {
            return Err(CinError::InvalidPrefix);
        }

        let digits = &value[letters..];
        if !digits.chars().all(|c| c.is_ascii_digit())
            || !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len())
        {
            return Err(CinError::InvalidDigits);
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Cin {
    type Err = CinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Cin {
    type Error = CinError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Cin> for String {
    fn from(value: Cin) -> Self {
        value.0
    }
}

impl fmt::Display for Cin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
