//! facevote-store: durable state for enrollment and voting.
//!
//! Both stores write through a temp file that is renamed into place, so a
//! crash mid-write leaves the previous contents intact.

mod atomic;
pub mod enrollment;
pub mod ledger;

pub use enrollment::{EnrollmentSet, EnrollmentStore, StoreError, ENROLLMENT_FILE};
pub use ledger::{LedgerError, VoteLedger, VoteRecord, LEDGER_HEADER};

/// File name of the vote ledger inside the data directory.
pub const LEDGER_FILE: &str = "votes.csv";
