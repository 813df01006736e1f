//! Voting session state.
//!
//! Everything needed to identify a voter and record their vote, built up
//! front so that any fatal condition surfaces before a camera is opened.

use crate::config::Config;
use crate::error::SessionError;
use chrono::NaiveDateTime;
use facevote_core::{
    Ballot, Choice, Classification, ClassifierError, IdentityProfile, KnnClassifier, Signature,
    VoterId,
};
use facevote_store::{EnrollmentSet, EnrollmentStore, VoteLedger, VoteRecord};

/// What the classifier's answer means for this station.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    /// Identified and not yet voted.
    Eligible {
        profile: IdentityProfile,
        classification: Classification,
    },
    AlreadyVoted(VoterId),
    /// Classified to an ID with no enrolled profile.
    Unknown(VoterId),
}

pub struct VotingSession {
    enrollment: EnrollmentSet,
    classifier: KnnClassifier,
    ledger: VoteLedger,
    ballot: Ballot,
}

impl VotingSession {
    /// Load the enrollment store and ledger named by `config` and fit the
    /// classifier.
    pub fn open(config: &Config) -> Result<Self, SessionError> {
        let enrollment = EnrollmentStore::open(config.enrollment_dir())?.load_all()?;
        let ledger = VoteLedger::open(config.ledger_path())?;
        let ballot = config.parsed_ballot()?;
        Self::new(enrollment, ledger, ballot, config.neighbors)
    }

    pub fn new(
        enrollment: EnrollmentSet,
        ledger: VoteLedger,
        ballot: Ballot,
        neighbors: usize,
    ) -> Result<Self, SessionError> {
        for (voter_id, samples) in enrollment.sample_counts() {
            if samples < neighbors {
                tracing::warn!(
                    voter_id = %voter_id,
                    samples,
                    k = neighbors,
                    "voter has fewer samples than the neighbor count"
                );
            }
        }

        let classifier =
            KnnClassifier::fit(enrollment.signatures.clone(), &enrollment.labels, neighbors)?;

        tracing::info!(
            voters = enrollment.profiles.len(),
            samples = enrollment.len(),
            votes = ledger.len(),
            k = neighbors,
            "voting session ready"
        );

        Ok(Self {
            enrollment,
            classifier,
            ledger,
            ballot,
        })
    }

    /// Classify `signature` and check the result against the ledger.
    pub fn identify(&self, signature: &Signature) -> Result<Recognition, ClassifierError> {
        let classification = self.classifier.classify(signature)?;
        let voter_id = &classification.voter_id;

        if self.ledger.has_voted(voter_id) {
            return Ok(Recognition::AlreadyVoted(voter_id.clone()));
        }
        match self.enrollment.lookup(voter_id) {
            Some(profile) => Ok(Recognition::Eligible {
                profile: profile.clone(),
                classification,
            }),
            None => Ok(Recognition::Unknown(voter_id.clone())),
        }
    }

    /// Record `voter_id`'s vote for `choice`.
    pub fn cast_vote(
        &mut self,
        voter_id: &VoterId,
        choice: Choice,
        cast_at: NaiveDateTime,
    ) -> Result<VoteRecord, SessionError> {
        if !self.ballot.choices().contains(&choice) {
            return Err(SessionError::NotOnBallot(choice.label().to_string()));
        }
        let profile = self
            .enrollment
            .lookup(voter_id)
            .ok_or_else(|| SessionError::UnknownVoter(voter_id.clone()))?;
        Ok(self.ledger.record_vote(profile, choice, cast_at)?.clone())
    }

    pub fn has_voted(&self, voter_id: &VoterId) -> bool {
        self.ledger.has_voted(voter_id)
    }

    pub fn ballot(&self) -> &Ballot {
        &self.ballot
    }

    pub fn classifier(&self) -> &KnnClassifier {
        &self.classifier
    }

    pub fn enrollment(&self) -> &EnrollmentSet {
        &self.enrollment
    }

    pub fn ledger(&self) -> &VoteLedger {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facevote_core::NamePolicy;
    use facevote_store::LedgerError;

    fn profile(id: &str, name: &str) -> IdentityProfile {
        IdentityProfile::new(VoterId::parse(id).unwrap(), name, "Pune", NamePolicy::Strict).unwrap()
    }

    fn two_voter_set() -> EnrollmentSet {
        let asha = profile("123456789012", "Asha");
        let ravi = profile("210987654321", "Ravi");
        let mut signatures = Vec::new();
        let mut entries = Vec::new();
        for i in 0..5 {
            signatures.push(Signature::new(vec![0.1 + i as f32 * 0.01; 4]));
            entries.push(asha.clone());
            signatures.push(Signature::new(vec![0.9 - i as f32 * 0.01; 4]));
            entries.push(ravi.clone());
        }
        EnrollmentSet::from_entries(signatures, entries).unwrap()
    }

    fn session(dir: &std::path::Path) -> VotingSession {
        let ledger = VoteLedger::open(dir.join("votes.csv")).unwrap();
        let ballot = Ballot::new(["BJP", "AAP"]).unwrap();
        VotingSession::new(two_voter_set(), ledger, ballot, 5).unwrap()
    }

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 5, 13)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_identify_then_vote_then_already_voted() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let query = Signature::new(vec![0.12; 4]);

        let id = match session.identify(&query).unwrap() {
            Recognition::Eligible { profile, classification } => {
                assert_eq!(profile.name(), "Asha");
                assert_eq!(classification.support, 5);
                profile.voter_id().clone()
            }
            other => panic!("expected Eligible, got {other:?}"),
        };

        let record = session.cast_vote(&id, Choice::Candidate("AAP".into()), now()).unwrap();
        assert_eq!(record.constituency, "Pune");
        assert!(session.has_voted(&id));
        assert_eq!(session.identify(&query).unwrap(), Recognition::AlreadyVoted(id));
    }

    #[test]
    fn test_second_cast_is_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let id = VoterId::parse("210987654321").unwrap();
        session.cast_vote(&id, Choice::Nota, now()).unwrap();

        let err = session.cast_vote(&id, Choice::Nota, now()).unwrap_err();
        assert!(matches!(err, SessionError::Ledger(LedgerError::DuplicateVote(_))));
        assert_eq!(session.ledger().len(), 1);
    }

    #[test]
    fn test_choice_must_be_on_ballot() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let id = VoterId::parse("123456789012").unwrap();
        let err = session
            .cast_vote(&id, Choice::Candidate("CONGRESS".into()), now())
            .unwrap_err();
        assert!(matches!(err, SessionError::NotOnBallot(_)));
        assert!(!session.has_voted(&id));
    }

    #[test]
    fn test_unenrolled_voter_cannot_cast() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let stranger = VoterId::parse("999999999999").unwrap();
        assert!(matches!(
            session.cast_vote(&stranger, Choice::Nota, now()),
            Err(SessionError::UnknownVoter(_))
        ));
    }

    #[test]
    fn test_too_few_samples_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = VoteLedger::open(dir.path().join("votes.csv")).unwrap();
        let ballot = Ballot::new(["BJP"]).unwrap();
        let result = VotingSession::new(EnrollmentSet::default(), ledger, ballot, 5);
        assert!(matches!(
            result,
            Err(SessionError::Classifier(ClassifierError::InsufficientTrainingData { samples: 0, k: 5 }))
        ));
    }

    #[test]
    fn test_restart_sees_prior_votes() {
        let dir = tempfile::tempdir().unwrap();
        let id = VoterId::parse("123456789012").unwrap();
        session(dir.path()).cast_vote(&id, Choice::Nota, now()).unwrap();

        let reopened = session(dir.path());
        assert!(reopened.has_voted(&id));
        assert_eq!(
            reopened.identify(&Signature::new(vec![0.1; 4])).unwrap(),
            Recognition::AlreadyVoted(id)
        );
    }

    #[test]
    fn test_open_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let mut store = EnrollmentStore::open(config.enrollment_dir()).unwrap();
        let asha = profile("123456789012", "Asha");
        for i in 0..6 {
            store.append(Signature::new(vec![i as f32; 3]), &asha);
        }
        store.commit().unwrap();

        let session = VotingSession::open(&config).unwrap();
        assert_eq!(session.classifier().sample_count(), 6);
        assert_eq!(session.ballot().len(), 4);
        assert!(session.ledger().is_empty());
    }
}
