//! Synthetic frame sources and detectors for engine tests.

use facevote_core::{BoundingBox, DetectorError, FaceDetector, IdentityProfile, NamePolicy, VoterId};
use facevote_hw::{Frame, FrameSource};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const FRAME_SIDE: u32 = 16;

pub fn profile(id: &str, name: &str) -> IdentityProfile {
    IdentityProfile::new(VoterId::parse(id).unwrap(), name, "Pune", NamePolicy::Strict).unwrap()
}

/// A uniform frame; `0` gives a dark frame.
pub fn face_frame(value: u8) -> Frame {
    Frame::from_gray(vec![value; (FRAME_SIDE * FRAME_SIDE) as usize], FRAME_SIDE, FRAME_SIDE, 0)
}

/// Plays back a fixed list of frames and raises `cancel` after the last.
pub struct ScriptedSource {
    frames: VecDeque<Frame>,
    cancel: Arc<AtomicBool>,
    delivered: usize,
}

impl ScriptedSource {
    pub fn new(frames: Vec<Frame>, cancel: Arc<AtomicBool>) -> Self {
        if frames.is_empty() {
            cancel.store(true, Ordering::Relaxed);
        }
        Self {
            frames: frames.into(),
            cancel,
            delivered: 0,
        }
    }

    pub fn repeat(frame: Frame, count: usize, cancel: Arc<AtomicBool>) -> Self {
        Self::new(vec![frame; count], cancel)
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }
}

impl FrameSource for ScriptedSource {
    type Error = io::Error;

    fn next_frame(&mut self) -> Result<Frame, io::Error> {
        let mut frame = self
            .frames
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))?;
        self.delivered += 1;
        frame.sequence = self.delivered as u32;
        if self.frames.is_empty() {
            self.cancel.store(true, Ordering::Relaxed);
        }
        Ok(frame)
    }
}

/// Reports the same boxes for every frame.
pub struct StubDetector {
    faces: Vec<BoundingBox>,
    fail: bool,
}

impl StubDetector {
    pub fn with_box(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            faces: vec![BoundingBox {
                x,
                y,
                width,
                height,
                confidence: 0.9,
            }],
            fail: false,
        }
    }

    pub fn full_frame() -> Self {
        let side = FRAME_SIDE as f32;
        Self::with_box(0.0, 0.0, side, side)
    }

    pub fn no_faces() -> Self {
        Self {
            faces: Vec::new(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            faces: Vec::new(),
            fail: true,
        }
    }
}

impl FaceDetector for StubDetector {
    fn detect(
        &mut self,
        _frame: &[u8],
        _width: u32,
        _height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        if self.fail {
            return Err(DetectorError::InferenceFailed("stub failure".into()));
        }
        Ok(self.faces.clone())
    }
}
