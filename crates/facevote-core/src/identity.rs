//! Voter identity records and enrollment input validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const VOTER_ID_DIGITS: usize = 12;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("voter ID must be exactly 12 digits, got {0:?}")]
    VoterId(String),
    #[error("{field} must contain only letters{}, got {value:?}", spaces_hint(.spaces_allowed))]
    NotAlphabetic {
        field: &'static str,
        value: String,
        spaces_allowed: bool,
    },
    #[error("ballot option {0:?} is not allowed")]
    BallotOption(String),
    #[error("ballot must list at least one candidate option")]
    EmptyBallot,
}

fn spaces_hint(allowed: &bool) -> &'static str {
    if *allowed {
        " and spaces"
    } else {
        ""
    }
}

/// Whether whitespace may appear inside names and constituencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamePolicy {
    /// Letters only, no whitespace at all.
    #[default]
    Strict,
    /// Letters with interior spaces ("New Delhi").
    AllowSpaces,
}

/// A 12-digit voter identification number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterId(String);

impl VoterId {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw.len() == VOTER_ID_DIGITS && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(raw.to_string()))
        } else {
            Err(ValidationError::VoterId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for VoterId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Static identifying information for one voter. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    voter_id: VoterId,
    name: String,
    constituency: String,
}

impl IdentityProfile {
    pub fn new(
        voter_id: VoterId,
        name: &str,
        constituency: &str,
        policy: NamePolicy,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            voter_id,
            name: alphabetic_field("name", name, policy)?,
            constituency: alphabetic_field("constituency", constituency, policy)?,
        })
    }

    pub fn voter_id(&self) -> &VoterId {
        &self.voter_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constituency(&self) -> &str {
        &self.constituency
    }
}

fn alphabetic_field(
    field: &'static str,
    raw: &str,
    policy: NamePolicy,
) -> Result<String, ValidationError> {
    let value = raw.trim();
    let spaces_allowed = policy == NamePolicy::AllowSpaces;
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_alphabetic() || (spaces_allowed && c == ' '));

    if valid {
        Ok(value.to_string())
    } else {
        Err(ValidationError::NotAlphabetic {
            field,
            value: raw.to_string(),
            spaces_allowed,
        })
    }
}
