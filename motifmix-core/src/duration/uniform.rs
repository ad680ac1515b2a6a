use rand::Rng;

use crate::duration::{DurationPrior, resized_max};
use crate::types::{MixtureError, SparseGradient};

/// Every offset in `[min, max]` is equally likely.
#[derive(Debug, Clone)]
pub struct UniformDuration {
    min: usize,
    max: usize,
    log_probability: f64,
}

impl UniformDuration {
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] if `min > max`.
    pub fn new(min: usize, max: usize) -> Result<Self, MixtureError> {
        if min > max {
            return Err(MixtureError::Configuration(format!(
                "empty duration domain [{min}, {max}]"
            )));
        }
        Ok(Self {
            min,
            max,
            log_probability: -((max - min + 1) as f64).ln(),
        })
    }
}

impl DurationPrior for UniformDuration {
    fn min(&self) -> usize {
        self.min
    }

    fn max(&self) -> usize {
        self.max
    }

    fn log_probability(&self, offset: usize) -> f64 {
        if (self.min..=self.max).contains(&offset) {
            self.log_probability
        } else {
            f64::NEG_INFINITY
        }
    }

    fn log_probability_and_gradient(&self, offset: usize, _: &mut SparseGradient) -> f64 {
        self.log_probability(offset)
    }

    fn parameter_count(&self) -> usize {
        0
    }

    fn parameters(&self) -> Vec<f64> {
        Vec::new()
    }

    fn set_parameters(&mut self, _: &[f64], _: usize) -> Result<(), MixtureError> {
        Ok(())
    }

    fn log_prior_term(&self) -> f64 {
        0.0
    }

    fn add_gradient_of_log_prior_term(&self, _: &mut [f64], _: usize) {}

    fn resize(&mut self, delta_left: isize, delta_right: isize) -> Result<(), MixtureError> {
        let max = resized_max(self.min, self.max, delta_left, delta_right)?;
        *self = Self::new(self.min, max)?;
        Ok(())
    }

    fn adjust(&mut self, weights: &[f64]) -> Result<(), MixtureError> {
        if weights.len() != self.domain_size() {
            return Err(MixtureError::LengthMismatch {
                expected: self.domain_size(),
                actual: weights.len(),
            });
        }
        Ok(())
    }

    fn initialize_randomly<R: Rng + ?Sized>(&mut self, _: &mut R) -> Result<(), MixtureError> {
        Ok(())
    }
}
