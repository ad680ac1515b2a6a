//! Position priors over the start offset of a motif occurrence.
//!
//! A duration prior is a distribution over the integer domain
//! `[min, max]`, typically `[0, L - width]` for windows of length `L`. It can
//! be enumerated any number of times through [`DurationPrior::positions`] or
//! stepped explicitly with a [`DurationCursor`].

pub mod gaussian;
pub mod uniform;

use std::fmt;
use std::iter::FusedIterator;

use rand::Rng;

use crate::types::{MixtureError, SparseGradient};

pub use gaussian::GaussianDuration;
pub use uniform::UniformDuration;

/// A trainable, enumerable distribution over integer offsets.
pub trait DurationPrior: Clone + Send + fmt::Debug {
    fn min(&self) -> usize;

    fn max(&self) -> usize;

    /// Number of admissible offsets.
    fn domain_size(&self) -> usize {
        self.max() - self.min() + 1
    }

    /// Log probability of `offset`, negative infinity outside the domain.
    fn log_probability(&self, offset: usize) -> f64;

    /// Log probability plus its gradient with local parameter indices.
    fn log_probability_and_gradient(&self, offset: usize, gradient: &mut SparseGradient) -> f64;

    fn parameter_count(&self) -> usize;

    fn parameters(&self) -> Vec<f64>;

    /// # Errors
    ///
    /// Returns [`MixtureError::ParameterCount`] if the slice is too short.
    fn set_parameters(&mut self, params: &[f64], offset: usize) -> Result<(), MixtureError>;

    fn log_prior_term(&self) -> f64;

    fn add_gradient_of_log_prior_term(&self, gradient: &mut [f64], offset: usize);

    /// Moves the upper domain bound by `delta_left - delta_right`, following
    /// a motif that now covers old positions `[delta_left, width +
    /// delta_right)`.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] if the domain would be empty.
    fn resize(&mut self, delta_left: isize, delta_right: isize) -> Result<(), MixtureError>;

    /// Re-estimates the parameters from per-offset weights; `weights[i]`
    /// belongs to offset `min + i`.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] if `weights` does not cover
    /// the domain.
    fn adjust(&mut self, weights: &[f64]) -> Result<(), MixtureError>;

    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] if the prior cannot be sampled.
    fn initialize_randomly<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), MixtureError>;

    /// Restartable enumeration of `(offset, log_probability)` pairs.
    fn positions(&self) -> Positions<'_, Self>
    where
        Self: Sized,
    {
        Positions {
            prior: self,
            next: self.min(),
        }
    }

    /// Explicit reset/advance stepping over the domain.
    fn cursor(&self) -> DurationCursor<'_, Self>
    where
        Self: Sized,
    {
        DurationCursor {
            prior: self,
            current: None,
        }
    }
}

/// Iterator over the admissible offsets of a [`DurationPrior`].
#[derive(Debug, Clone)]
pub struct Positions<'a, D> {
    prior: &'a D,
    next: usize,
}

impl<D: DurationPrior> Iterator for Positions<'_, D> {
    type Item = (usize, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.prior.max() {
            return None;
        }
        let offset = self.next;
        self.next += 1;
        Some((offset, self.prior.log_probability(offset)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.prior.max() + 1).saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl<D: DurationPrior> ExactSizeIterator for Positions<'_, D> {}

impl<D: DurationPrior> FusedIterator for Positions<'_, D> {}

/// Stateful stepping over a duration domain.
///
/// # Examples
///
/// ```rust
/// use motifmix_core::duration::{DurationPrior, UniformDuration};
///
/// let prior = UniformDuration::new(0, 2)?;
/// let mut cursor = prior.cursor();
/// let mut offsets = Vec::new();
/// while cursor.advance() {
///     offsets.push(cursor.current_offset());
/// }
/// assert_eq!(offsets, vec![0, 1, 2]);
///
/// cursor.reset();
/// assert!(cursor.advance());
/// assert_eq!(cursor.current_offset(), 0);
/// # Ok::<(), motifmix_core::types::MixtureError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DurationCursor<'a, D> {
    prior: &'a D,
    current: Option<usize>,
}

impl<D: DurationPrior> DurationCursor<'_, D> {
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Moves to the next offset; `false` once the domain is exhausted.
    pub fn advance(&mut self) -> bool {
        let next = match self.current {
            None => self.prior.min(),
            Some(offset) if offset > self.prior.max() => offset,
            Some(offset) => offset + 1,
        };
        self.current = Some(next);
        next <= self.prior.max()
    }

    /// Offset the cursor points at; the domain minimum before the first
    /// advance.
    pub fn current_offset(&self) -> usize {
        self.current.unwrap_or_else(|| self.prior.min())
    }

    pub fn log_probability(&self) -> f64 {
        self.prior.log_probability(self.current_offset())
    }

    pub fn log_probability_and_gradient(&self, gradient: &mut SparseGradient) -> f64 {
        self.prior
            .log_probability_and_gradient(self.current_offset(), gradient)
    }
}

/// The duration priors available to motif slots.
#[derive(Debug, Clone)]
pub enum DurationModel {
    Uniform(UniformDuration),
    Gaussian(GaussianDuration),
}

macro_rules! dispatch {
    ($duration:expr, $model:ident => $body:expr) => {
        match $duration {
            DurationModel::Uniform($model) => $body,
            DurationModel::Gaussian($model) => $body,
        }
    };
}

impl From<UniformDuration> for DurationModel {
    fn from(model: UniformDuration) -> Self {
        Self::Uniform(model)
    }
}

impl From<GaussianDuration> for DurationModel {
    fn from(model: GaussianDuration) -> Self {
        Self::Gaussian(model)
    }
}

impl DurationPrior for DurationModel {
    fn min(&self) -> usize {
        dispatch!(self, model => model.min())
    }

    fn max(&self) -> usize {
        dispatch!(self, model => model.max())
    }

    fn log_probability(&self, offset: usize) -> f64 {
        dispatch!(self, model => model.log_probability(offset))
    }

    fn log_probability_and_gradient(&self, offset: usize, gradient: &mut SparseGradient) -> f64 {
        dispatch!(self, model => model.log_probability_and_gradient(offset, gradient))
    }

    fn parameter_count(&self) -> usize {
        dispatch!(self, model => model.parameter_count())
    }

    fn parameters(&self) -> Vec<f64> {
        dispatch!(self, model => model.parameters())
    }

    fn set_parameters(&mut self, params: &[f64], offset: usize) -> Result<(), MixtureError> {
        dispatch!(self, model => model.set_parameters(params, offset))
    }

    fn log_prior_term(&self) -> f64 {
        dispatch!(self, model => model.log_prior_term())
    }

    fn add_gradient_of_log_prior_term(&self, gradient: &mut [f64], offset: usize) {
        dispatch!(self, model => model.add_gradient_of_log_prior_term(gradient, offset))
    }

    fn resize(&mut self, delta_left: isize, delta_right: isize) -> Result<(), MixtureError> {
        dispatch!(self, model => model.resize(delta_left, delta_right))
    }

    fn adjust(&mut self, weights: &[f64]) -> Result<(), MixtureError> {
        dispatch!(self, model => model.adjust(weights))
    }

    fn initialize_randomly<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), MixtureError> {
        dispatch!(self, model => model.initialize_randomly(rng))
    }
}

/// Upper bound after a resize by `(delta_left, delta_right)`.
pub(crate) fn resized_max(
    min: usize,
    max: usize,
    delta_left: isize,
    delta_right: isize,
) -> Result<usize, MixtureError> {
    let new_max = max as isize + delta_left - delta_right;
    if new_max < min as isize {
        return Err(MixtureError::Configuration(format!(
            "resizing by ({delta_left}, {delta_right}) leaves no admissible offset in [{min}, {max}]"
        )));
    }
    Ok(new_max as usize)
}
