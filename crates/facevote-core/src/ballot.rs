//! Ballot options and the voter's choice.

use crate::identity::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label of the "none of the above" choice, always offered last.
pub const NOTA: &str = "NOTA";

/// A single recorded choice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Choice {
    Candidate(String),
    Nota,
}

impl Choice {
    /// Parse a label as written in the vote ledger.
    pub fn from_label(label: &str) -> Self {
        if label == NOTA {
            Choice::Nota
        } else {
            Choice::Candidate(label.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Choice::Candidate(name) => name,
            Choice::Nota => NOTA,
        }
    }

    /// Check that the label can be written as a ledger field and reads
    /// back as the same choice.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Choice::Candidate(label) => check_candidate_label(label),
            Choice::Nota => Ok(()),
        }
    }
}

/// A candidate label must be non-empty, free of separators, quotes and line
/// breaks, and distinct from `NOTA` in any case.
pub fn check_candidate_label(label: &str) -> Result<(), ValidationError> {
    let bad_char = label.chars().any(|c| matches!(c, ',' | '"' | '\n' | '\r'));
    if label.trim().is_empty() || bad_char || label.trim().eq_ignore_ascii_case(NOTA) {
        return Err(ValidationError::BallotOption(label.to_string()));
    }
    Ok(())
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The fixed, ordered set of options offered at this station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    candidates: Vec<String>,
}

impl Ballot {
    /// Build a ballot from candidate labels. `NOTA` is appended implicitly.
    ///
    /// Labels are trimmed and checked with [`check_candidate_label`];
    /// duplicates are rejected.
    pub fn new<I, S>(candidates: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut labels: Vec<String> = Vec::new();
        for raw in candidates {
            let label = raw.as_ref().trim();
            if check_candidate_label(label).is_err() || labels.iter().any(|l| l == label) {
                return Err(ValidationError::BallotOption(raw.as_ref().to_string()));
            }
            labels.push(label.to_string());
        }

        if labels.is_empty() {
            return Err(ValidationError::EmptyBallot);
        }

        Ok(Self { candidates: labels })
    }

    /// All choices in display order, `NOTA` last.
    pub fn choices(&self) -> Vec<Choice> {
        self.candidates
            .iter()
            .cloned()
            .map(Choice::Candidate)
            .chain(std::iter::once(Choice::Nota))
            .collect()
    }

    /// Choice by 1-based position, as keyed at the prompt.
    pub fn choice(&self, position: usize) -> Option<Choice> {
        match position {
            0 => None,
            p if p <= self.candidates.len() => Some(Choice::Candidate(self.candidates[p - 1].clone())),
            p if p == self.candidates.len() + 1 => Some(Choice::Nota),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}
