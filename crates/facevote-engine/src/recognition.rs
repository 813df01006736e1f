//! The recognition loop: frames in, votes out.
//!
//! Each frame is reduced to one [`FrameOutcome`]. Only the first detected
//! face is considered, and the operator prompt blocks the loop, so at most
//! one voter is ever in flight. Per-frame problems become outcomes; only
//! store, ledger and frame source failures end the run with an error.

use crate::error::SessionError;
use crate::session::{Recognition, VotingSession};
use facevote_core::{Ballot, Choice, FaceDetector, IdentityProfile, SignatureExtractor, VoterId};
use facevote_hw::{Frame, FrameSource};
use facevote_store::{LedgerError, VoteRecord};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Dark,
    NoFace,
    DetectionFailed,
    InvalidRegion,
    AlreadyVoted(VoterId),
    Unknown(VoterId),
    Voted(VoteRecord),
    /// The operator skipped the prompt for this voter.
    Abstained(VoterId),
    /// The operator ended the session at the prompt.
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptResponse {
    Cast(Choice),
    Skip,
    Quit,
}

/// Asks the operator for an identified voter's choice.
pub trait ChoicePrompt {
    fn choose(&mut self, profile: &IdentityProfile, ballot: &Ballot) -> PromptResponse;
}

/// Totals for one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: usize,
    pub votes: usize,
    pub already_voted: usize,
    pub unknown: usize,
    pub abstained: usize,
    /// Dark frames, frames without a face, and unusable detections.
    pub skipped: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &FrameOutcome) {
        if *outcome == FrameOutcome::Quit {
            return;
        }
        self.frames += 1;
        match outcome {
            FrameOutcome::Voted(_) => self.votes += 1,
            FrameOutcome::AlreadyVoted(_) => self.already_voted += 1,
            FrameOutcome::Unknown(_) => self.unknown += 1,
            FrameOutcome::Abstained(_) => self.abstained += 1,
            _ => self.skipped += 1,
        }
    }
}

pub struct RecognitionLoop<D, E, P> {
    session: VotingSession,
    detector: D,
    extractor: E,
    prompt: P,
}

impl<D, E, P> RecognitionLoop<D, E, P>
where
    D: FaceDetector,
    E: SignatureExtractor,
    P: ChoicePrompt,
{
    pub fn new(
        session: VotingSession,
        detector: D,
        extractor: E,
        prompt: P,
    ) -> Result<Self, SessionError> {
        let enrolled = session.classifier().dimensions();
        if enrolled != extractor.dimensions() {
            return Err(SessionError::ExtractorMismatch {
                enrolled,
                extractor: extractor.dimensions(),
            });
        }
        Ok(Self {
            session,
            detector,
            extractor,
            prompt,
        })
    }

    pub fn session(&self) -> &VotingSession {
        &self.session
    }

    /// Run one frame through detect, extract, identify and vote.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameOutcome, SessionError> {
        if frame.is_dark {
            return Ok(FrameOutcome::Dark);
        }

        let faces = match self.detector.detect(&frame.data, frame.width, frame.height) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(error = %e, sequence = frame.sequence, "face detection failed");
                return Ok(FrameOutcome::DetectionFailed);
            }
        };
        let Some(face) = faces.first() else {
            return Ok(FrameOutcome::NoFace);
        };
        if faces.len() > 1 {
            tracing::debug!(faces = faces.len(), "several faces in frame, using the first");
        }

        let signature = match self
            .extractor
            .extract(&frame.data, frame.width, frame.height, face)
        {
            Ok(signature) => signature,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unusable face region");
                return Ok(FrameOutcome::InvalidRegion);
            }
        };

        let (profile, classification) = match self.session.identify(&signature)? {
            Recognition::AlreadyVoted(voter_id) => {
                tracing::debug!(voter_id = %voter_id, "already voted");
                return Ok(FrameOutcome::AlreadyVoted(voter_id));
            }
            Recognition::Unknown(voter_id) => {
                tracing::warn!(voter_id = %voter_id, "classified voter has no profile");
                return Ok(FrameOutcome::Unknown(voter_id));
            }
            Recognition::Eligible {
                profile,
                classification,
            } => (profile, classification),
        };

        tracing::info!(
            voter_id = %profile.voter_id(),
            support = classification.support,
            k = classification.k,
            distance = classification.nearest_distance,
            "voter identified"
        );

        let choice = match self.prompt.choose(&profile, self.session.ballot()) {
            PromptResponse::Cast(choice) => choice,
            PromptResponse::Skip => {
                tracing::info!(voter_id = %profile.voter_id(), "prompt skipped");
                return Ok(FrameOutcome::Abstained(profile.voter_id().clone()));
            }
            PromptResponse::Quit => return Ok(FrameOutcome::Quit),
        };

        let now = chrono::Local::now().naive_local();
        match self.session.cast_vote(profile.voter_id(), choice, now) {
            Ok(record) => Ok(FrameOutcome::Voted(record)),
            Err(SessionError::Ledger(LedgerError::DuplicateVote(voter_id))) => {
                tracing::warn!(voter_id = %voter_id, "duplicate vote refused");
                Ok(FrameOutcome::AlreadyVoted(voter_id))
            }
            Err(e) => Err(e),
        }
    }

    /// Pull frames from `source` until `cancel` is set, the operator quits,
    /// or a fatal error occurs.
    pub fn run<S>(&mut self, source: &mut S, cancel: &AtomicBool) -> Result<RunSummary, SessionError>
    where
        S: FrameSource + ?Sized,
    {
        self.run_with(source, cancel, |_| {})
    }

    /// Like [`run`](Self::run), handing every outcome to `on_outcome` as it
    /// happens.
    pub fn run_with<S, F>(
        &mut self,
        source: &mut S,
        cancel: &AtomicBool,
        mut on_outcome: F,
    ) -> Result<RunSummary, SessionError>
    where
        S: FrameSource + ?Sized,
        F: FnMut(&FrameOutcome),
    {
        tracing::info!(voters = self.session.enrollment().profiles.len(), "recognition started");
        let mut summary = RunSummary::default();

        while !cancel.load(Ordering::Relaxed) {
            let frame = source
                .next_frame()
                .map_err(|e| SessionError::FrameSource(Box::new(e)))?;
            let outcome = self.process_frame(&frame)?;
            on_outcome(&outcome);
            summary.record(&outcome);
            if outcome == FrameOutcome::Quit {
                break;
            }
        }

        tracing::info!(
            frames = summary.frames,
            votes = summary.votes,
            already_voted = summary.already_voted,
            unknown = summary.unknown,
            "recognition stopped"
        );
        Ok(summary)
    }
}
