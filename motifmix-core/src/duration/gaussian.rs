use rand::Rng;

use crate::constants::{DURATION_PRIOR_SPREAD, MIN_DURATION_VARIANCE};
use crate::duration::{DurationPrior, resized_max};
use crate::math::log_sum_exp;
use crate::scoring::parameter_block;
use crate::types::{MixtureError, SparseGradient};

/// A Gaussian discretized onto `[min, max]`.
///
/// Two parameters: the location `l`, mapped onto the domain as
/// `mean = min + (max - min) * sigmoid(l)`, and the log precision. Each
/// offset receives `exp(-precision / 2 * (offset - mean)^2)`, normalized over
/// the domain.
#[derive(Debug, Clone)]
pub struct GaussianDuration {
    min: usize,
    max: usize,
    location: f64,
    log_precision: f64,
    ess: f64,
    log_probabilities: Vec<f64>,
    location_gradient: Vec<f64>,
    precision_gradient: Vec<f64>,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl GaussianDuration {
    /// Centered on the domain with the prior's target spread.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] if `min > max`.
    pub fn new(min: usize, max: usize, ess: f64) -> Result<Self, MixtureError> {
        if min > max {
            return Err(MixtureError::Configuration(format!(
                "empty duration domain [{min}, {max}]"
            )));
        }
        let mut prior = Self {
            min,
            max,
            location: 0.0,
            log_precision: 0.0,
            ess,
            log_probabilities: Vec::new(),
            location_gradient: Vec::new(),
            precision_gradient: Vec::new(),
        };
        prior.log_precision = prior.target_precision().ln();
        prior.refresh();
        Ok(prior)
    }

    pub fn mean(&self) -> f64 {
        self.min as f64 + self.delta() * sigmoid(self.location)
    }

    pub fn precision(&self) -> f64 {
        self.log_precision.exp()
    }

    fn delta(&self) -> f64 {
        (self.max - self.min) as f64
    }

    fn target_precision(&self) -> f64 {
        let spread = (DURATION_PRIOR_SPREAD * self.delta()).max(1.0);
        1.0 / (spread * spread)
    }

    fn refresh(&mut self) {
        let size = self.domain_size();
        let mean = self.mean();
        let precision = self.precision();
        let s = sigmoid(self.location);
        let mean_slope = self.delta() * s * (1.0 - s);

        let mut scores = Vec::with_capacity(size);
        let mut location_gradient = Vec::with_capacity(size);
        let mut precision_gradient = Vec::with_capacity(size);
        for offset in self.min..=self.max {
            let distance = offset as f64 - mean;
            scores.push(-0.5 * precision * distance * distance);
            location_gradient.push(precision * distance * mean_slope);
            precision_gradient.push(-0.5 * precision * distance * distance);
        }

        let norm = log_sum_exp(&scores);
        let mut expected_location = 0.0;
        let mut expected_precision = 0.0;
        for (i, score) in scores.iter_mut().enumerate() {
            *score -= norm;
            let p = score.exp();
            expected_location += p * location_gradient[i];
            expected_precision += p * precision_gradient[i];
        }
        location_gradient
            .iter_mut()
            .for_each(|g| *g -= expected_location);
        precision_gradient
            .iter_mut()
            .for_each(|g| *g -= expected_precision);

        self.log_probabilities = scores;
        self.location_gradient = location_gradient;
        self.precision_gradient = precision_gradient;
    }

    fn index(&self, offset: usize) -> Option<usize> {
        (self.min..=self.max)
            .contains(&offset)
            .then(|| offset - self.min)
    }
}

impl DurationPrior for GaussianDuration {
    fn min(&self) -> usize {
        self.min
    }

    fn max(&self) -> usize {
        self.max
    }

    fn log_probability(&self, offset: usize) -> f64 {
        self.index(offset)
            .map_or(f64::NEG_INFINITY, |i| self.log_probabilities[i])
    }

    fn log_probability_and_gradient(&self, offset: usize, gradient: &mut SparseGradient) -> f64 {
        match self.index(offset) {
            Some(i) => {
                gradient.push(0, self.location_gradient[i]);
                gradient.push(1, self.precision_gradient[i]);
                self.log_probabilities[i]
            }
            None => f64::NEG_INFINITY,
        }
    }

    fn parameter_count(&self) -> usize {
        2
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.location, self.log_precision]
    }

    fn set_parameters(&mut self, params: &[f64], offset: usize) -> Result<(), MixtureError> {
        let block = parameter_block(params, offset, 2)?;
        self.location = block[0];
        self.log_precision = block[1];
        self.refresh();
        Ok(())
    }

    /// Normal prior on the location and a Gamma prior on the precision
    /// centered on a quarter of the domain width.
    fn log_prior_term(&self) -> f64 {
        if self.ess <= 0.0 {
            return 0.0;
        }
        let rate = self.ess / self.target_precision();
        -0.5 * self.ess * self.location * self.location + self.ess * self.log_precision
            - rate * self.precision()
    }

    fn add_gradient_of_log_prior_term(&self, gradient: &mut [f64], offset: usize) {
        if self.ess <= 0.0 {
            return;
        }
        let rate = self.ess / self.target_precision();
        gradient[offset] -= self.ess * self.location;
        gradient[offset + 1] += self.ess - rate * self.precision();
    }

    fn resize(&mut self, delta_left: isize, delta_right: isize) -> Result<(), MixtureError> {
        self.max = resized_max(self.min, self.max, delta_left, delta_right)?;
        self.refresh();
        Ok(())
    }

    fn adjust(&mut self, weights: &[f64]) -> Result<(), MixtureError> {
        if weights.len() != self.domain_size() {
            return Err(MixtureError::LengthMismatch {
                expected: self.domain_size(),
                actual: weights.len(),
            });
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 || self.max == self.min {
            return Ok(());
        }
        if total.is_nan() {
            return Err(MixtureError::Numerical(
                "duration weights contain NaN".to_string(),
            ));
        }

        let mean = weights
            .iter()
            .enumerate()
            .map(|(i, w)| w * (self.min + i) as f64)
            .sum::<f64>()
            / total;
        let variance = weights
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let distance = (self.min + i) as f64 - mean;
                w * distance * distance
            })
            .sum::<f64>()
            / total;

        let fraction = ((mean - self.min as f64) / self.delta()).clamp(1e-6, 1.0 - 1e-6);
        self.location = (fraction / (1.0 - fraction)).ln();
        self.log_precision = -variance.max(MIN_DURATION_VARIANCE).ln();
        self.refresh();
        Ok(())
    }

    fn initialize_randomly<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), MixtureError> {
        self.location = rng.gen_range(-2.0..2.0);
        self.log_precision = self.target_precision().ln();
        self.refresh();
        Ok(())
    }
}
