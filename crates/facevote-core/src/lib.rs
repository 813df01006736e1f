//! facevote-core: voter identity, face signatures and identification.
//!
//! Turns detected face regions into fixed-width signatures and identifies
//! them against enrolled voters with a k-nearest-neighbor vote. Detection
//! runs through the `FaceDetector` trait; an SCRFD ONNX adapter is bundled.

pub mod ballot;
pub mod classifier;
pub mod detector;
pub mod identity;
pub mod signature;
pub mod types;

pub use ballot::{check_candidate_label, Ballot, Choice, NOTA};
pub use classifier::{Classification, ClassifierError, KnnClassifier};
pub use detector::{DetectorError, FaceDetector, ScrfdDetector};
pub use identity::{IdentityProfile, NamePolicy, ValidationError, VoterId};
pub use signature::{PixelGridExtractor, SignatureError, SignatureExtractor};
pub use types::{BoundingBox, Signature};

use std::path::PathBuf;

/// File name of the SCRFD detection model inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

/// Default directory searched for ONNX models.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/facevote/models")
}
