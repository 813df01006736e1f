//! facevote-engine: the station's operational phases.
//!
//! Enrollment captures signatures for one voter into the enrollment store.
//! Voting builds a [`VotingSession`] (store loaded, classifier fitted, ledger
//! opened) and drives it with a [`RecognitionLoop`] over a frame source.
//! Both phases are blocking and run on a single thread; cancellation is a
//! shared flag polled between frames.

pub mod config;
pub mod enroll;
pub mod error;
pub mod recognition;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::{Config, ConfigError};
pub use enroll::{
    check_enrollable, run_enrollment, CaptureEvent, CapturePolicy, EnrollmentCapture,
    EnrollmentOutcome,
};
pub use error::SessionError;
pub use recognition::{ChoicePrompt, FrameOutcome, PromptResponse, RecognitionLoop, RunSummary};
pub use session::{Recognition, VotingSession};
