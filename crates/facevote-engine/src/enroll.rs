//! Enrollment capture: collect face signatures for one voter.
//!
//! One sample is taken every `stride` frames that contain a usable face,
//! starting with the first, until `target_samples` are collected or the
//! operator cancels. Only the first detected face of a frame is used.

use crate::config::Config;
use crate::error::SessionError;
use facevote_core::{FaceDetector, IdentityProfile, Signature, SignatureExtractor};
use facevote_hw::{Frame, FrameSource};
use facevote_store::{EnrollmentStore, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePolicy {
    pub target_samples: usize,
    pub stride: usize,
    /// A cancelled session keeps its batch only if it reached this size.
    pub min_samples: usize,
}

impl CapturePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_samples: config.target_samples,
            stride: config.capture_stride.max(1),
            min_samples: config.min_samples,
        }
    }
}

/// What one frame contributed to the capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Dark,
    NoFace,
    DetectionFailed,
    InvalidRegion,
    /// A face was seen but fell between stride steps.
    Skipped,
    Captured { collected: usize },
    /// Target already reached; the frame was ignored.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentOutcome {
    Committed { samples: usize },
    /// Cancelled below the minimum; nothing was written.
    Discarded { samples: usize },
}

pub struct EnrollmentCapture {
    profile: IdentityProfile,
    policy: CapturePolicy,
    faces_seen: usize,
    samples: Vec<Signature>,
}

impl EnrollmentCapture {
    pub fn new(profile: IdentityProfile, policy: CapturePolicy) -> Self {
        Self {
            profile,
            policy,
            faces_seen: 0,
            samples: Vec::with_capacity(policy.target_samples),
        }
    }

    pub fn profile(&self) -> &IdentityProfile {
        &self.profile
    }

    pub fn collected(&self) -> usize {
        self.samples.len()
    }

    pub fn is_complete(&self) -> bool {
        self.samples.len() >= self.policy.target_samples
    }

    /// Feed one frame through detection and extraction.
    pub fn observe<D, E>(&mut self, frame: &Frame, detector: &mut D, extractor: &E) -> CaptureEvent
    where
        D: FaceDetector + ?Sized,
        E: SignatureExtractor + ?Sized,
    {
        if self.is_complete() {
            return CaptureEvent::Complete;
        }
        if frame.is_dark {
            return CaptureEvent::Dark;
        }

        let faces = match detector.detect(&frame.data, frame.width, frame.height) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(error = %e, sequence = frame.sequence, "face detection failed");
                return CaptureEvent::DetectionFailed;
            }
        };
        let Some(face) = faces.first() else {
            return CaptureEvent::NoFace;
        };

        let signature = match extractor.extract(&frame.data, frame.width, frame.height, face) {
            Ok(signature) => signature,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unusable face region");
                return CaptureEvent::InvalidRegion;
            }
        };

        let take = self.faces_seen % self.policy.stride == 0;
        self.faces_seen += 1;
        if !take {
            return CaptureEvent::Skipped;
        }

        self.samples.push(signature);
        let collected = self.samples.len();
        tracing::debug!(collected, target = self.policy.target_samples, "sample captured");
        CaptureEvent::Captured { collected }
    }

    /// Persist the batch, or drop it if it is below the minimum.
    pub fn finish(self, store: &mut EnrollmentStore) -> Result<EnrollmentOutcome, SessionError> {
        let samples = self.samples.len();
        if samples < self.policy.min_samples {
            tracing::info!(
                voter_id = %self.profile.voter_id(),
                samples,
                min = self.policy.min_samples,
                "enrollment batch below minimum, discarding"
            );
            return Ok(EnrollmentOutcome::Discarded { samples });
        }

        for signature in self.samples {
            store.append(signature, &self.profile);
        }
        if let Err(e) = store.commit() {
            store.discard_pending();
            return Err(e.into());
        }
        tracing::info!(voter_id = %self.profile.voter_id(), samples, "voter enrolled");
        Ok(EnrollmentOutcome::Committed { samples })
    }
}

/// Refuse a profile that conflicts with an enrolled voter of the same ID.
///
/// Runs before any capture so that the operator learns about the conflict
/// before sitting in front of the camera.
pub fn check_enrollable(
    store: &EnrollmentStore,
    profile: &IdentityProfile,
) -> Result<(), SessionError> {
    let enrolled = store.load_all()?;
    match enrolled.lookup(profile.voter_id()) {
        Some(existing) if existing != profile => {
            Err(StoreError::ProfileConflict(profile.voter_id().clone()).into())
        }
        Some(_) => {
            let samples = enrolled.sample_counts().get(profile.voter_id()).copied();
            tracing::info!(
                voter_id = %profile.voter_id(),
                existing = samples.unwrap_or_default(),
                "voter already enrolled, adding samples"
            );
            Ok(())
        }
        None => Ok(()),
    }
}

/// Capture frames from `source` until the target is reached or `cancel` is
/// set, then persist the batch according to the policy.
pub fn run_enrollment<S, D, E>(
    source: &mut S,
    detector: &mut D,
    extractor: &E,
    mut capture: EnrollmentCapture,
    store: &mut EnrollmentStore,
    cancel: &AtomicBool,
) -> Result<EnrollmentOutcome, SessionError>
where
    S: FrameSource + ?Sized,
    D: FaceDetector + ?Sized,
    E: SignatureExtractor + ?Sized,
{
    tracing::info!(
        voter_id = %capture.profile().voter_id(),
        target = capture.policy.target_samples,
        stride = capture.policy.stride,
        "enrollment capture started"
    );

    while !capture.is_complete() {
        if cancel.load(Ordering::Relaxed) {
            tracing::info!(collected = capture.collected(), "enrollment cancelled");
            break;
        }
        let frame = source
            .next_frame()
            .map_err(|e| SessionError::FrameSource(Box::new(e)))?;
        capture.observe(&frame, detector, extractor);
    }

    capture.finish(store)
}
