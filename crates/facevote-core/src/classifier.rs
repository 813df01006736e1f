//! k-nearest-neighbor voter identification.
//!
//! The classifier is fitted once from every enrolled (signature, voter ID)
//! pair and is immutable afterwards. Classification takes the `k` enrolled
//! signatures closest to the query by Euclidean distance and returns the
//! voter ID holding the most of them.
//!
//! Ordering rules, so that identical inputs always give identical answers:
//! - neighbors at equal distance are taken in enrollment order;
//! - label indices are the sorted unique voter IDs, and when two voters hold
//!   the same number of neighbors the lower index wins.

use crate::identity::VoterId;
use crate::types::Signature;
use thiserror::Error;

/// Neighbor count used when none is configured.
pub const DEFAULT_NEIGHBORS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("insufficient training data: {samples} samples, need at least {k}")]
    InsufficientTrainingData { samples: usize, k: usize },
    #[error("neighbor count must be at least 1")]
    InvalidNeighbors,
    #[error("{signatures} signatures but {labels} labels")]
    LabelMismatch { signatures: usize, labels: usize },
    #[error("signature width {actual} does not match trained width {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result of classifying one query signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub voter_id: VoterId,
    /// How many of the `k` nearest neighbors carry `voter_id`.
    pub support: usize,
    pub k: usize,
    /// Euclidean distance to the closest neighbor carrying `voter_id`.
    pub nearest_distance: f32,
}

impl Classification {
    /// Fraction of the neighborhood that agreed, in (0, 1].
    pub fn confidence(&self) -> f32 {
        self.support as f32 / self.k as f32
    }
}

pub struct KnnClassifier {
    k: usize,
    dimensions: usize,
    samples: Vec<Signature>,
    /// Per-sample index into `classes`.
    labels: Vec<usize>,
    /// Sorted unique voter IDs.
    classes: Vec<VoterId>,
}

impl KnnClassifier {
    /// Fit from parallel signature and label slices.
    pub fn fit(
        samples: Vec<Signature>,
        labels: &[VoterId],
        k: usize,
    ) -> Result<Self, ClassifierError> {
        if k == 0 {
            return Err(ClassifierError::InvalidNeighbors);
        }
        if samples.len() != labels.len() {
            return Err(ClassifierError::LabelMismatch {
                signatures: samples.len(),
                labels: labels.len(),
            });
        }
        if samples.len() < k {
            return Err(ClassifierError::InsufficientTrainingData {
                samples: samples.len(),
                k,
            });
        }

        let dimensions = samples[0].len();
        if let Some(bad) = samples.iter().find(|s| s.len() != dimensions) {
            return Err(ClassifierError::DimensionMismatch {
                expected: dimensions,
                actual: bad.len(),
            });
        }

        let mut classes = labels.to_vec();
        classes.sort();
        classes.dedup();

        let labels = labels
            .iter()
            .map(|id| classes.binary_search(id).unwrap_or_default())
            .collect();

        tracing::debug!(
            samples = samples.len(),
            voters = classes.len(),
            dimensions,
            k,
            "k-NN classifier fitted"
        );

        Ok(Self {
            k,
            dimensions,
            samples,
            labels,
            classes,
        })
    }

    /// Classify a query signature into the best-matching voter ID.
    pub fn classify(&self, query: &Signature) -> Result<Classification, ClassifierError> {
        if query.len() != self.dimensions {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut distances: Vec<(f32, usize)> = self
            .samples
            .iter()
            .enumerate()
            .map(|(i, s)| (query.squared_distance(s), i))
            .collect();
        // Stable on equal distance: enrollment order breaks ties.
        distances.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut counts = vec![0usize; self.classes.len()];
        let mut nearest = vec![f32::INFINITY; self.classes.len()];
        for &(dist, idx) in distances.iter().take(self.k) {
            let class = self.labels[idx];
            counts[class] += 1;
            nearest[class] = nearest[class].min(dist);
        }

        // First maximum wins, i.e. the lowest label index on equal counts.
        let mut best = 0;
        for class in 1..counts.len() {
            if counts[class] > counts[best] {
                best = class;
            }
        }

        Ok(Classification {
            voter_id: self.classes[best].clone(),
            support: counts[best],
            k: self.k,
            nearest_distance: nearest[best].sqrt(),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Sorted unique voter IDs the classifier can answer with.
    pub fn voters(&self) -> &[VoterId] {
        &self.classes
    }
}
