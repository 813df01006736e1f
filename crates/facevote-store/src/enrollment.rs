//! Enrollment store: captured signatures bound to voter profiles.
//!
//! Persisted as one bincode file, `enrollment.bin`, holding two parallel
//! collections: one `IdentityProfile` per captured sample (repeated, not
//! deduplicated) and the signatures in the same order. Entry `i` of one
//! belongs to entry `i` of the other, so the two lengths must always match.
//!
//! Writes are read-modify-write: `append` stages samples in memory and
//! `commit` rewrites the file with a single atomic rename, so both
//! collections always change together.

use crate::atomic::replace_file;
use facevote_core::{IdentityProfile, Signature, VoterId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENROLLMENT_FILE: &str = "enrollment.bin";

/// On-disk layout of [`ENROLLMENT_FILE`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredEnrollment {
    profiles: Vec<IdentityProfile>,
    signatures: Vec<Signature>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("corrupt enrollment store: {signatures} signatures but {profiles} profile entries")]
    CorruptStore { signatures: usize, profiles: usize },
    #[error("signature width {actual} does not match enrolled width {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("voter {0} is already enrolled with a different name or constituency")]
    ProfileConflict(VoterId),
    #[error("encoding: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

/// Everything persisted in the store, ready for classifier fitting.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentSet {
    /// Signatures in enrollment order.
    pub signatures: Vec<Signature>,
    /// `labels[i]` is the voter that `signatures[i]` belongs to.
    pub labels: Vec<VoterId>,
    /// One profile per enrolled voter.
    pub profiles: HashMap<VoterId, IdentityProfile>,
}

impl EnrollmentSet {
    /// Build from the two persisted collections, checking they pair 1:1.
    pub fn from_entries(
        signatures: Vec<Signature>,
        entries: Vec<IdentityProfile>,
    ) -> Result<Self, StoreError> {
        if signatures.len() != entries.len() {
            return Err(StoreError::CorruptStore {
                signatures: signatures.len(),
                profiles: entries.len(),
            });
        }

        let mut labels = Vec::with_capacity(entries.len());
        let mut profiles: HashMap<VoterId, IdentityProfile> = HashMap::new();
        for entry in entries {
            labels.push(entry.voter_id().clone());
            match profiles.get(entry.voter_id()) {
                Some(existing) if *existing != entry => {
                    return Err(StoreError::ProfileConflict(entry.voter_id().clone()));
                }
                Some(_) => {}
                None => {
                    profiles.insert(entry.voter_id().clone(), entry);
                }
            }
        }

        Ok(Self {
            signatures,
            labels,
            profiles,
        })
    }

    pub fn lookup(&self, voter_id: &VoterId) -> Option<&IdentityProfile> {
        self.profiles.get(voter_id)
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Signature width, if anything is enrolled.
    pub fn dimensions(&self) -> Option<usize> {
        self.signatures.first().map(Signature::len)
    }

    /// Samples per voter, ordered by voter ID.
    pub fn sample_counts(&self) -> BTreeMap<VoterId, usize> {
        let mut counts = BTreeMap::new();
        for id in &self.labels {
            *counts.entry(id.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Handle on an enrollment directory plus the batch staged for commit.
pub struct EnrollmentStore {
    dir: PathBuf,
    pending_signatures: Vec<Signature>,
    pending_profiles: Vec<IdentityProfile>,
}

impl EnrollmentStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "enrollment store opened");
        Ok(Self {
            dir,
            pending_signatures: Vec::new(),
            pending_profiles: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stage one sample. Nothing reaches disk until [`commit`](Self::commit).
    pub fn append(&mut self, signature: Signature, profile: &IdentityProfile) {
        self.pending_signatures.push(signature);
        self.pending_profiles.push(profile.clone());
    }

    pub fn pending(&self) -> usize {
        self.pending_signatures.len()
    }

    /// Drop the staged batch without writing it.
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending_signatures.len();
        self.pending_signatures.clear();
        self.pending_profiles.clear();
        dropped
    }

    /// Merge the staged batch into the persisted collections.
    ///
    /// Returns the number of samples written. On error the staged batch is
    /// kept and the file on disk is unchanged.
    pub fn commit(&mut self) -> Result<usize, StoreError> {
        if self.pending_signatures.is_empty() {
            return Ok(0);
        }

        let stored = self.read()?;
        let existing =
            EnrollmentSet::from_entries(stored.signatures.clone(), stored.profiles.clone())?;
        let expected = existing
            .dimensions()
            .unwrap_or_else(|| self.pending_signatures[0].len());
        if let Some(bad) = self.pending_signatures.iter().find(|s| s.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        let mut staged: HashMap<&VoterId, &IdentityProfile> = HashMap::new();
        for profile in &self.pending_profiles {
            let known = existing
                .lookup(profile.voter_id())
                .or_else(|| staged.get(profile.voter_id()).copied());
            if known.is_some_and(|k| k != profile) {
                return Err(StoreError::ProfileConflict(profile.voter_id().clone()));
            }
            staged.insert(profile.voter_id(), profile);
        }

        let mut updated = stored;
        updated.signatures.extend(self.pending_signatures.iter().cloned());
        updated.profiles.extend(self.pending_profiles.iter().cloned());
        self.write(&updated)?;

        let written = self.discard_pending();
        tracing::info!(
            written,
            total = updated.signatures.len(),
            dir = %self.dir.display(),
            "enrollment batch committed"
        );
        Ok(written)
    }

    /// Load every persisted sample. Staged samples are not included.
    pub fn load_all(&self) -> Result<EnrollmentSet, StoreError> {
        let stored = self.read()?;
        EnrollmentSet::from_entries(stored.signatures, stored.profiles)
    }

    fn path(&self) -> PathBuf {
        self.dir.join(ENROLLMENT_FILE)
    }

    fn read(&self) -> Result<StoredEnrollment, StoreError> {
        let reader = match File::open(self.path()) {
            Ok(file) => BufReader::new(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StoredEnrollment::default()),
            Err(e) => return Err(e.into()),
        };
        Ok(bincode::deserialize_from(reader)?)
    }

    fn write(&self, stored: &StoredEnrollment) -> Result<(), StoreError> {
        replace_file(&self.path(), |w| {
            bincode::serialize_into(w, stored).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        })?;
        Ok(())
    }
}
