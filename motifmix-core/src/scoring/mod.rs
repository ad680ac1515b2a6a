//! Component scoring models.
//!
//! Every model that can be placed inside a mixture implements
//! [`SequenceScore`]. The concrete models shipped with the crate are bundled
//! in the tagged [`Component`] enum so mixtures can hold heterogeneous
//! components without trait objects.

pub mod homogeneous;
pub mod pwm;
pub mod uniform;

use std::fmt;

use rand::Rng;

use crate::sequence::{DataSet, Sequence, WeightedSegment};
use crate::types::{MixtureError, SparseGradient};

pub use homogeneous::HomogeneousMarkovModel;
pub use pwm::PositionWeightMatrix;
pub use uniform::UniformModel;

/// A differentiable log-score over sequence windows.
///
/// Scores are unnormalized log values; [`is_normalized`] reports whether the
/// model is an internally normalized distribution, in which case
/// [`log_normalization_constant`] is `0`.
///
/// Gradients are written with local parameter indices into a
/// [`SparseGradient`]; callers shift them into a global layout.
///
/// [`is_normalized`]: SequenceScore::is_normalized
/// [`log_normalization_constant`]: SequenceScore::log_normalization_constant
pub trait SequenceScore: Clone + Send + fmt::Debug {
    /// Fixed window length, or `0` for models scoring any length.
    fn length(&self) -> usize;

    fn alphabet_size(&self) -> usize;

    /// Log score of `sequence[start..end]`.
    ///
    /// Fixed-length models read exactly [`length`](Self::length) symbols
    /// starting at `start`.
    fn log_score(&self, sequence: &Sequence, start: usize, end: usize) -> f64;

    /// Log score plus its gradient, appended to `gradient`.
    fn log_score_and_gradient(
        &self,
        sequence: &Sequence,
        start: usize,
        end: usize,
        gradient: &mut SparseGradient,
    ) -> f64;

    /// Number of free parameters, `None` while unresolved.
    fn parameter_count(&self) -> Option<usize>;

    /// # Errors
    ///
    /// Returns [`MixtureError::Uninitialized`] if the parameter count is not
    /// yet resolved.
    fn parameters(&self) -> Result<Vec<f64>, MixtureError>;

    /// Reads `parameter_count()` values from `params[offset..]`.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::ParameterCount`] if the slice is too short.
    fn set_parameters(&mut self, params: &[f64], offset: usize) -> Result<(), MixtureError>;

    fn is_normalized(&self) -> bool;

    fn log_normalization_constant(&self) -> f64;

    /// Adds `factor` times the gradient of the log normalization constant to
    /// `gradient[offset..]`.
    fn add_gradient_of_log_normalization_constant(
        &self,
        gradient: &mut [f64],
        offset: usize,
        factor: f64,
    );

    fn log_prior_term(&self) -> f64;

    /// Adds the gradient of [`log_prior_term`](Self::log_prior_term) to
    /// `gradient[offset..]`.
    fn add_gradient_of_log_prior_term(&self, gradient: &mut [f64], offset: usize);

    /// Equivalent sample size of the model's prior.
    fn ess(&self) -> f64;

    fn is_initialized(&self) -> bool {
        self.parameter_count().is_some()
    }

    /// Re-estimates the parameters from weighted windows (MAP under the
    /// model's prior).
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] if a fixed-length model is
    /// handed a window of the wrong length.
    fn estimate(&mut self, segments: &[WeightedSegment<'_>]) -> Result<(), MixtureError>;

    /// Plug-in initialization from whole sequences.
    ///
    /// # Errors
    ///
    /// Propagates estimation errors.
    fn initialize_from_data(
        &mut self,
        data: &DataSet,
        weights: &[f64],
    ) -> Result<(), MixtureError> {
        let segments: Vec<_> = data
            .iter()
            .zip(weights)
            .map(|(sequence, &weight)| WeightedSegment::whole(sequence, weight))
            .collect();
        self.estimate(&segments)
    }

    /// Draws parameters from the model's prior.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] if the prior cannot be sampled.
    fn initialize_randomly<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), MixtureError>;

    /// Grows or shrinks a fixed-length model so that it covers old positions
    /// `[offset_left, length + offset_right)`. Returns `false` if the model
    /// cannot be resized.
    fn modify(&mut self, _offset_left: isize, _offset_right: isize) -> bool {
        false
    }
}

/// The component models available to mixtures.
#[derive(Debug, Clone)]
pub enum Component {
    Pwm(PositionWeightMatrix),
    Homogeneous(HomogeneousMarkovModel),
    Uniform(UniformModel),
}

macro_rules! dispatch {
    ($component:expr, $model:ident => $body:expr) => {
        match $component {
            Component::Pwm($model) => $body,
            Component::Homogeneous($model) => $body,
            Component::Uniform($model) => $body,
        }
    };
}

impl From<PositionWeightMatrix> for Component {
    fn from(model: PositionWeightMatrix) -> Self {
        Self::Pwm(model)
    }
}

impl From<HomogeneousMarkovModel> for Component {
    fn from(model: HomogeneousMarkovModel) -> Self {
        Self::Homogeneous(model)
    }
}

impl From<UniformModel> for Component {
    fn from(model: UniformModel) -> Self {
        Self::Uniform(model)
    }
}

impl SequenceScore for Component {
    fn length(&self) -> usize {
        dispatch!(self, model => model.length())
    }

    fn alphabet_size(&self) -> usize {
        dispatch!(self, model => model.alphabet_size())
    }

    fn log_score(&self, sequence: &Sequence, start: usize, end: usize) -> f64 {
        dispatch!(self, model => model.log_score(sequence, start, end))
    }

    fn log_score_and_gradient(
        &self,
        sequence: &Sequence,
        start: usize,
        end: usize,
        gradient: &mut SparseGradient,
    ) -> f64 {
        dispatch!(self, model => model.log_score_and_gradient(sequence, start, end, gradient))
    }

    fn parameter_count(&self) -> Option<usize> {
        dispatch!(self, model => model.parameter_count())
    }

    fn parameters(&self) -> Result<Vec<f64>, MixtureError> {
        dispatch!(self, model => model.parameters())
    }

    fn set_parameters(&mut self, params: &[f64], offset: usize) -> Result<(), MixtureError> {
        dispatch!(self, model => model.set_parameters(params, offset))
    }

    fn is_normalized(&self) -> bool {
        dispatch!(self, model => model.is_normalized())
    }

    fn log_normalization_constant(&self) -> f64 {
        dispatch!(self, model => model.log_normalization_constant())
    }

    fn add_gradient_of_log_normalization_constant(
        &self,
        gradient: &mut [f64],
        offset: usize,
        factor: f64,
    ) {
        dispatch!(self, model => model.add_gradient_of_log_normalization_constant(gradient, offset, factor))
    }

    fn log_prior_term(&self) -> f64 {
        dispatch!(self, model => model.log_prior_term())
    }

    fn add_gradient_of_log_prior_term(&self, gradient: &mut [f64], offset: usize) {
        dispatch!(self, model => model.add_gradient_of_log_prior_term(gradient, offset))
    }

    fn ess(&self) -> f64 {
        dispatch!(self, model => model.ess())
    }

    fn is_initialized(&self) -> bool {
        dispatch!(self, model => model.is_initialized())
    }

    fn estimate(&mut self, segments: &[WeightedSegment<'_>]) -> Result<(), MixtureError> {
        dispatch!(self, model => model.estimate(segments))
    }

    fn initialize_from_data(
        &mut self,
        data: &DataSet,
        weights: &[f64],
    ) -> Result<(), MixtureError> {
        dispatch!(self, model => model.initialize_from_data(data, weights))
    }

    fn initialize_randomly<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), MixtureError> {
        dispatch!(self, model => model.initialize_randomly(rng))
    }

    fn modify(&mut self, offset_left: isize, offset_right: isize) -> bool {
        dispatch!(self, model => model.modify(offset_left, offset_right))
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, model => fmt::Display::fmt(model, f))
    }
}

/// Reads a block of `count` parameters from `params[offset..]`.
pub(crate) fn parameter_block(
    params: &[f64],
    offset: usize,
    count: usize,
) -> Result<&[f64], MixtureError> {
    params
        .get(offset..offset + count)
        .ok_or(MixtureError::ParameterCount {
            expected: offset + count,
            actual: params.len(),
        })
}

/// Log probabilities of one categorical distribution given its potentials.
pub(crate) fn log_softmax_into(potentials: &[f64], log_probabilities: &mut [f64]) -> f64 {
    let norm = crate::math::log_sum_exp(potentials);
    for (log_probability, &potential) in log_probabilities.iter_mut().zip(potentials) {
        *log_probability = if norm == f64::NEG_INFINITY {
            f64::NEG_INFINITY
        } else {
            potential - norm
        };
    }
    norm
}

/// Natural parameters of a categorical distribution; the last entry is
/// pinned to 0 when `pin_last` is set.
pub(crate) fn potentials_from_probabilities(probabilities: &[f64], pin_last: bool) -> Vec<f64> {
    let mut potentials: Vec<f64> = probabilities
        .iter()
        .map(|&p| if pin_last { p.max(f64::MIN_POSITIVE) } else { p }.ln())
        .collect();
    if pin_last {
        if let Some(&last) = potentials.last() {
            potentials.iter_mut().for_each(|potential| *potential -= last);
        }
    }
    potentials
}
