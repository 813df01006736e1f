use crate::config::ConfigError;
use facevote_core::{ClassifierError, DetectorError, SignatureError, ValidationError, VoterId};
use facevote_hw::CameraError;
use facevote_store::{LedgerError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("enrollment store error: {0}")]
    Store(#[from] StoreError),
    #[error("vote ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("frame source failed: {0}")]
    FrameSource(Box<dyn std::error::Error + Send + Sync>),
    #[error("enrolled signatures are {enrolled} wide but the extractor produces {extractor}")]
    ExtractorMismatch { enrolled: usize, extractor: usize },
    #[error("voter {0} is not enrolled")]
    UnknownVoter(VoterId),
    #[error("{0:?} is not on the ballot")]
    NotOnBallot(String),
}
