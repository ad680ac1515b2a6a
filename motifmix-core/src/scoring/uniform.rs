use std::fmt;

use rand::Rng;

use crate::scoring::SequenceScore;
use crate::sequence::{Sequence, WeightedSegment};
use crate::types::{MixtureError, SparseGradient};

/// Parameter-free uniform distribution over symbols.
#[derive(Debug, Clone)]
pub struct UniformModel {
    alphabet_size: usize,
    length: usize,
    log_symbol_probability: f64,
}

impl UniformModel {
    /// `length == 0` scores windows of any length.
    pub fn new(alphabet_size: usize, length: usize) -> Self {
        Self {
            alphabet_size,
            length,
            log_symbol_probability: -(alphabet_size as f64).ln(),
        }
    }

    fn window(&self, start: usize, end: usize) -> usize {
        if self.length > 0 {
            self.length
        } else {
            end - start
        }
    }
}

impl SequenceScore for UniformModel {
    fn length(&self) -> usize {
        self.length
    }

    fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    fn log_score(&self, _: &Sequence, start: usize, end: usize) -> f64 {
        self.window(start, end) as f64 * self.log_symbol_probability
    }

    fn log_score_and_gradient(
        &self,
        sequence: &Sequence,
        start: usize,
        end: usize,
        _: &mut SparseGradient,
    ) -> f64 {
        self.log_score(sequence, start, end)
    }

    fn parameter_count(&self) -> Option<usize> {
        Some(0)
    }

    fn parameters(&self) -> Result<Vec<f64>, MixtureError> {
        Ok(Vec::new())
    }

    fn set_parameters(&mut self, _: &[f64], _: usize) -> Result<(), MixtureError> {
        Ok(())
    }

    fn is_normalized(&self) -> bool {
        true
    }

    fn log_normalization_constant(&self) -> f64 {
        0.0
    }

    fn add_gradient_of_log_normalization_constant(&self, _: &mut [f64], _: usize, _: f64) {}

    fn log_prior_term(&self) -> f64 {
        0.0
    }

    fn add_gradient_of_log_prior_term(&self, _: &mut [f64], _: usize) {}

    fn ess(&self) -> f64 {
        0.0
    }

    fn estimate(&mut self, _: &[WeightedSegment<'_>]) -> Result<(), MixtureError> {
        Ok(())
    }

    fn initialize_randomly<R: Rng + ?Sized>(&mut self, _: &mut R) -> Result<(), MixtureError> {
        Ok(())
    }
}

impl fmt::Display for UniformModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uniform(alphabet={}, length={})", self.alphabet_size, self.length)
    }
}
