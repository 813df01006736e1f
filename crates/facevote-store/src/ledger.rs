//! Exactly-once vote ledger.
//!
//! A header line followed by one comma-separated row per vote:
//!
//! ```text
//! Voter ID,Name,Constituency,Vote,Time,Date
//! 123456789012,Asha,Pune,AAP,14:03:22,2024-05-13
//! ```
//!
//! Rows are written unquoted, so every field is checked for separators,
//! quotes and line breaks before anything is written. The set of voters who have voted is rebuilt from the
//! rows on open and is only updated after a row is durably on disk.

use crate::atomic::replace_file;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use facevote_core::{Choice, IdentityProfile, VoterId};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const LEDGER_HEADER: &str = "Voter ID,Name,Constituency,Vote,Time,Date";

const FIELD_COUNT: usize = 6;
const TIME_FORMAT: &str = "%H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("voter {0} has already voted")]
    DuplicateVote(VoterId),
    #[error("cannot record {field} {value:?}: not a valid ledger field")]
    InvalidField { field: &'static str, value: String },
    #[error("malformed ledger {path} at line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

fn check_field(field: &'static str, value: &str) -> Result<(), LedgerError> {
    if value.is_empty() || value.chars().any(|c| matches!(c, ',' | '"' | '\n' | '\r')) {
        return Err(LedgerError::InvalidField {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// One row of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
    pub voter_id: VoterId,
    pub name: String,
    pub constituency: String,
    pub choice: Choice,
    /// Second precision; that is all the ledger keeps.
    pub cast_at: NaiveDateTime,
}

impl VoteRecord {
    fn to_row(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.voter_id,
            self.name,
            self.constituency,
            self.choice,
            self.cast_at.format(TIME_FORMAT),
            self.cast_at.format(DATE_FORMAT),
        )
    }

    fn from_row(row: &str) -> Result<Self, String> {
        let fields: Vec<&str> = row.split(',').collect();
        if fields.len() != FIELD_COUNT {
            return Err(format!("expected {FIELD_COUNT} fields, found {}", fields.len()));
        }

        let voter_id = VoterId::parse(fields[0]).map_err(|e| e.to_string())?;
        let time = NaiveTime::parse_from_str(fields[4], TIME_FORMAT)
            .map_err(|e| format!("time {:?}: {e}", fields[4]))?;
        let date = NaiveDate::parse_from_str(fields[5], DATE_FORMAT)
            .map_err(|e| format!("date {:?}: {e}", fields[5]))?;

        Ok(Self {
            voter_id,
            name: fields[1].to_string(),
            constituency: fields[2].to_string(),
            choice: Choice::from_label(fields[3]),
            cast_at: date.and_time(time),
        })
    }
}

pub struct VoteLedger {
    path: PathBuf,
    records: Vec<VoteRecord>,
    voted: HashSet<VoterId>,
}

impl VoteLedger {
    /// Open the ledger at `path`, reading every recorded vote.
    ///
    /// A missing or empty file is a fresh ledger; it is created on the
    /// first vote.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let malformed = |line: usize, reason: String| LedgerError::Malformed {
            path: path.clone(),
            line,
            reason,
        };

        let mut records = Vec::new();
        let mut voted = HashSet::new();
        let mut lines = content.lines().enumerate().map(|(i, l)| (i + 1, l.trim_end_matches('\r')));

        if let Some((line, header)) = lines.next() {
            if header != LEDGER_HEADER {
                return Err(malformed(line, format!("unexpected header {header:?}")));
            }
        }

        for (line, row) in lines {
            if row.trim().is_empty() {
                continue;
            }
            let record = VoteRecord::from_row(row).map_err(|reason| malformed(line, reason))?;
            if !voted.insert(record.voter_id.clone()) {
                tracing::error!(
                    path = %path.display(),
                    line,
                    voter_id = %record.voter_id,
                    "ledger lists a voter twice"
                );
                return Err(LedgerError::DuplicateVote(record.voter_id));
            }
            records.push(record);
        }

        tracing::info!(path = %path.display(), votes = records.len(), "vote ledger opened");
        Ok(Self {
            path,
            records,
            voted,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_voted(&self, voter_id: &VoterId) -> bool {
        self.voted.contains(voter_id)
    }

    /// Record `profile`'s vote.
    ///
    /// Fails with `DuplicateVote` without touching the file if the voter is
    /// already in the ledger. The whole ledger is rewritten and renamed into
    /// place; memory is updated only once that succeeds.
    pub fn record_vote(
        &mut self,
        profile: &IdentityProfile,
        choice: Choice,
        cast_at: NaiveDateTime,
    ) -> Result<&VoteRecord, LedgerError> {
        let voter_id = profile.voter_id();
        if self.has_voted(voter_id) {
            tracing::warn!(voter_id = %voter_id, "duplicate vote rejected");
            return Err(LedgerError::DuplicateVote(voter_id.clone()));
        }
        if choice.validate().is_err() {
            return Err(LedgerError::InvalidField {
                field: "choice",
                value: choice.label().to_string(),
            });
        }
        check_field("name", profile.name())?;
        check_field("constituency", profile.constituency())?;

        let record = VoteRecord {
            voter_id: voter_id.clone(),
            name: profile.name().to_string(),
            constituency: profile.constituency().to_string(),
            choice,
            cast_at: cast_at.with_nanosecond(0).unwrap_or(cast_at),
        };

        let new_row = record.to_row();
        replace_file(&self.path, |w| {
            writeln!(w, "{LEDGER_HEADER}")?;
            for existing in &self.records {
                writeln!(w, "{}", existing.to_row())?;
            }
            writeln!(w, "{new_row}")
        })?;

        tracing::info!(voter_id = %record.voter_id, choice = %record.choice, "vote recorded");
        self.voted.insert(record.voter_id.clone());
        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    /// Recorded votes in the order they were cast.
    pub fn records(&self) -> &[VoteRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Votes per choice label.
    pub fn tally(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.choice.label().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facevote_core::NamePolicy;

    fn profile(id: &str, name: &str) -> IdentityProfile {
        IdentityProfile::new(VoterId::parse(id).unwrap(), name, "Pune", NamePolicy::Strict).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 13)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_missing_file_is_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = VoteLedger::open(dir.path().join("votes.csv")).unwrap();
        assert!(ledger.is_empty());
        assert!(!ledger.path().exists());
    }

    #[test]
    fn test_record_then_has_voted() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = VoteLedger::open(dir.path().join("votes.csv")).unwrap();
        let asha = profile("123456789012", "Asha");

        assert!(!ledger.has_voted(asha.voter_id()));
        let record = ledger
            .record_vote(&asha, Choice::Candidate("AAP".into()), at(14, 3, 22))
            .unwrap();
        assert_eq!(record.name, "Asha");
        assert!(ledger.has_voted(asha.voter_id()));

        let text = fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(
            text,
            "Voter ID,Name,Constituency,Vote,Time,Date\n\
             123456789012,Asha,Pune,AAP,14:03:22,2024-05-13\n"
        );
    }

    #[test]
    fn test_duplicate_vote_leaves_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = VoteLedger::open(dir.path().join("votes.csv")).unwrap();
        let asha = profile("123456789012", "Asha");
        ledger.record_vote(&asha, Choice::Nota, at(9, 0, 0)).unwrap();
        let before = fs::read(ledger.path()).unwrap();

        let err = ledger
            .record_vote(&asha, Choice::Candidate("BJP".into()), at(9, 5, 0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateVote(ref id) if id == asha.voter_id()));
        assert_eq!(fs::read(ledger.path()).unwrap(), before);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_unwritable_choice_rejected_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("votes.csv");
        let mut ledger = VoteLedger::open(&path).unwrap();
        let asha = profile("123456789012", "Asha");

        for label in ["A,B", "say \"hi\"", "A\nB", "", "NOTA"] {
            let err = ledger
                .record_vote(&asha, Choice::Candidate(label.into()), at(9, 0, 0))
                .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidField { field: "choice", .. }), "{label:?}");
        }
        assert!(!ledger.has_voted(asha.voter_id()));
        assert!(ledger.is_empty());
        assert!(!path.exists());

        ledger
            .record_vote(&asha, Choice::Candidate("AAP".into()), at(9, 0, 1))
            .unwrap();
        let reopened = VoteLedger::open(&path).unwrap();
        assert_eq!(reopened.records(), ledger.records());
    }

    #[test]
    fn test_failed_write_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let station = dir.path().join("station");
        let mut ledger = VoteLedger::open(station.join("votes.csv")).unwrap();
        let asha = profile("123456789012", "Asha");
        let ravi = profile("210987654321", "Ravi");
        ledger
            .record_vote(&asha, Choice::Candidate("AAP".into()), at(9, 0, 0))
            .unwrap();
        let before = ledger.records().to_vec();

        // A regular file where the ledger directory was makes the write fail.
        fs::remove_dir_all(&station).unwrap();
        fs::write(&station, "not a directory").unwrap();

        let err = ledger.record_vote(&ravi, Choice::Nota, at(9, 5, 0)).unwrap_err();
        assert!(matches!(err, LedgerError::Io(_)));
        assert!(!ledger.has_voted(ravi.voter_id()));
        assert!(ledger.has_voted(asha.voter_id()));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.records(), &before[..]);
        assert_eq!(fs::read_to_string(&station).unwrap(), "not a directory");
    }

    #[test]
    fn test_reopen_rebuilds_voted_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("votes.csv");
        fs::write(
            &path,
            "Voter ID,Name,Constituency,Vote,Time,Date\n\
             123456789012,Asha,Pune,AAP,14:03:22,2024-05-13\n",
        )
        .unwrap();

        let mut ledger = VoteLedger::open(&path).unwrap();
        let asha = profile("123456789012", "Asha");
        assert!(ledger.has_voted(asha.voter_id()));
        assert!(ledger.record_vote(&asha, Choice::Nota, at(15, 0, 0)).is_err());
        assert_eq!(ledger.records()[0].cast_at, at(14, 3, 22));
    }

    #[test]
    fn test_rows_survive_reopen_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("votes.csv");
        {
            let mut ledger = VoteLedger::open(&path).unwrap();
            ledger
                .record_vote(&profile("123456789012", "Asha"), Choice::Nota, at(10, 0, 0))
                .unwrap();
            ledger
                .record_vote(
                    &profile("210987654321", "Ravi"),
                    Choice::Candidate("BJP".into()),
                    at(10, 1, 0),
                )
                .unwrap();
        }

        let ledger = VoteLedger::open(&path).unwrap();
        let ids: Vec<&str> = ledger.records().iter().map(|r| r.voter_id.as_str()).collect();
        assert_eq!(ids, ["123456789012", "210987654321"]);
        assert_eq!(ledger.records()[0].choice, Choice::Nota);
    }

    #[test]
    fn test_sub_second_precision_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = VoteLedger::open(dir.path().join("votes.csv")).unwrap();
        let precise = at(8, 30, 15).with_nanosecond(123_456_789).unwrap();
        let record = ledger
            .record_vote(&profile("123456789012", "Asha"), Choice::Nota, precise)
            .unwrap()
            .clone();

        let reopened = VoteLedger::open(ledger.path()).unwrap();
        assert_eq!(reopened.records()[0], record);
    }

    #[test]
    fn test_bad_header_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("votes.csv");
        fs::write(&path, "id,vote\n123456789012,AAP\n").unwrap();
        assert!(matches!(
            VoteLedger::open(&path),
            Err(LedgerError::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn test_bad_row_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("votes.csv");

        fs::write(&path, format!("{LEDGER_HEADER}\n123456789012,Asha,Pune,AAP\n")).unwrap();
        assert!(matches!(
            VoteLedger::open(&path),
            Err(LedgerError::Malformed { line: 2, .. })
        ));

        fs::write(
            &path,
            format!("{LEDGER_HEADER}\n123456789012,Asha,Pune,AAP,25:61:00,2024-05-13\n"),
        )
        .unwrap();
        assert!(matches!(VoteLedger::open(&path), Err(LedgerError::Malformed { .. })));
    }

    #[test]
    fn test_repeated_voter_in_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("votes.csv");
        fs::write(
            &path,
            format!(
                "{LEDGER_HEADER}\n\
                 123456789012,Asha,Pune,AAP,14:03:22,2024-05-13\n\
                 123456789012,Asha,Pune,BJP,14:04:00,2024-05-13\n"
            ),
        )
        .unwrap();
        assert!(matches!(VoteLedger::open(&path), Err(LedgerError::DuplicateVote(_))));
    }

    #[test]
    fn test_crlf_rows_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("votes.csv");
        fs::write(
            &path,
            format!("{LEDGER_HEADER}\r\n123456789012,Asha,Pune,AAP,14:03:22,2024-05-13\r\n"),
        )
        .unwrap();
        assert_eq!(VoteLedger::open(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_tally_counts_per_choice() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = VoteLedger::open(dir.path().join("votes.csv")).unwrap();
        let ids = ["100000000001", "100000000002", "100000000003"];
        let choices = [Choice::Candidate("AAP".into()), Choice::Nota, Choice::Candidate("AAP".into())];
        for (id, choice) in ids.iter().zip(choices) {
            ledger.record_vote(&profile(id, "Voter"), choice, at(11, 0, 0)).unwrap();
        }

        let tally = ledger.tally();
        assert_eq!(tally["AAP"], 2);
        assert_eq!(tally["NOTA"], 1);
        assert_eq!(tally.len(), 2);
    }
}
