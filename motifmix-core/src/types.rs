use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while building, scoring or training mixture models.
///
/// Configuration and precondition failures surface at construction time and
/// name the offending component or motif. Numerical failures inside one EM
/// start abort only that start; see [`crate::training::EmTrainer`].
#[derive(Error, Debug)]
pub enum MixtureError {
    /// A model or trainer was built from an invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A value was requested before all parameter dimensions were resolved.
    #[error("Model not initialized: {0}")]
    Uninitialized(String),

    /// The requested algorithm branch is not available.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A motif index outside `0..motifs` was used.
    #[error("Motif index {index} out of bounds for a model with {motifs} motif(s)")]
    MotifIndexOutOfBounds { index: usize, motifs: usize },

    /// A window or weight vector did not have the expected length.
    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Sequence weights were negative, not finite, or all zero.
    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    /// A parameter vector was too short for the model it was applied to.
    #[error("Parameter count mismatch: expected {expected}, got {actual}")]
    ParameterCount { expected: usize, actual: usize },

    /// A training step produced a NaN objective or parameter.
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// A character outside the alphabet was encountered while encoding.
    #[error("Invalid symbol {symbol:?} at position {position}")]
    InvalidSymbol { symbol: char, position: usize },

    /// Every independent EM start failed.
    #[error("All {starts} EM start(s) failed, last error: {last}")]
    AllStartsFailed {
        starts: usize,
        last: Box<MixtureError>,
    },
}

/// Parameterization of the hidden (component-selection) distribution.
///
/// # Examples
///
/// ```rust
/// use motifmix_core::types::HiddenParameterization;
///
/// assert_eq!(HiddenParameterization::Free.free_parameters(4), 3);
/// assert_eq!(HiddenParameterization::Full.free_parameters(4), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HiddenParameterization {
    /// The last hidden value is pinned to 0, leaving a `K - 1` dimensional
    /// simplex.
    #[default]
    Free,
    /// All `K` values are free potentials of an unnormalized random field.
    Full,
}

impl HiddenParameterization {
    /// Number of exposed parameters for `k` categories.
    #[must_use]
    pub const fn free_parameters(self, k: usize) -> usize {
        match self {
            Self::Free => k.saturating_sub(1),
            Self::Full => k,
        }
    }
}

/// Kind of per-offset profile returned by
/// [`crate::motif::MotifOccurrenceModel::profile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    /// Joint log score of the window, the motif component and the offset.
    UnnormalizedJoint,
    /// Per-offset log score of the motif slot alone, without the hidden
    /// potential or the whole-window background.
    UnnormalizedConditional,
    /// Log posterior of each offset given the motif slot.
    NormalizedConditional,
}

/// Sparse gradient accumulator of `(index, value)` pairs.
///
/// Indices may repeat; consumers sum duplicate entries.
///
/// # Examples
///
/// ```rust
/// use motifmix_core::types::SparseGradient;
///
/// let mut gradient = SparseGradient::new();
/// gradient.push(3, 0.5);
/// gradient.push(3, 0.25);
///
/// let mut dense = vec![0.0; 4];
/// gradient.add_to_dense(&mut dense, 2.0);
/// assert_eq!(dense[3], 1.5);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseGradient {
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseGradient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            indices: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, index: usize, value: f64) {
        self.indices.push(index);
        self.values.push(value);
    }

    pub fn clear(&mut self) {
        self.indices.clear();
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Appends every entry of `other`, shifting indices by `offset` and
    /// scaling values by `factor`.
    pub fn extend_scaled(&mut self, other: &SparseGradient, offset: usize, factor: f64) {
        self.indices.reserve(other.len());
        self.values.reserve(other.len());
        for (index, value) in other.iter() {
            self.push(index + offset, value * factor);
        }
    }

    /// Adds `factor` times every entry into a dense buffer.
    pub fn add_to_dense(&self, dense: &mut [f64], factor: f64) {
        for (index, value) in self.iter() {
            dense[index] += factor * value;
        }
    }

    /// Sums duplicate indices into a dense vector of length `dimension`.
    pub fn to_dense(&self, dimension: usize) -> Vec<f64> {
        let mut dense = vec![0.0; dimension];
        self.add_to_dense(&mut dense, 1.0);
        dense
    }
}

impl fmt::Display for SparseGradient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (position, (index, value)) in self.iter().enumerate() {
            if position > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{index}:{value:.4}")?;
        }
        write!(f, "]")
    }
}
