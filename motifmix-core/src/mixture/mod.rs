//! Mixtures of sequence-scoring components under a categorical hidden
//! variable.
//!
//! [`MixtureCore`] owns the hidden block and everything derived from it; it
//! is shared by composition between the generic [`MixtureModel`] and
//! [`crate::motif::MotifOccurrenceModel`].

pub mod layout;
pub mod model;

use std::cell::Cell;

use rand::Rng;

use crate::math::{dirichlet_log_normalizer, log_sum_exp, sample_dirichlet};
use crate::types::{HiddenParameterization, MixtureError, SparseGradient};

pub use layout::{ParameterLayout, ParameterLocation};
pub use model::{MixtureModel, MixtureScratch};

/// Cached global log normalization constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizationState {
    /// Invalidated by a parameter change.
    NotComputed,
    /// Valid until the next parameter change.
    Computed(f64),
    /// The model is normalized; the constant is 0 for every parameter value.
    IdenticallyZero,
}

/// Hidden-parameter block of a `K`-component mixture.
///
/// Keeps the raw hidden values, the derived log potentials and potentials,
/// and the lazily computed global normalization constant. For a normalized
/// mixture the log potentials are `hidden - logsumexp(hidden)` and sum to 1
/// after exponentiation; otherwise they equal the hidden values and the
/// normalization constant must be tracked explicitly.
#[derive(Debug, Clone)]
pub struct MixtureCore {
    hidden: Vec<f64>,
    log_potentials: Vec<f64>,
    potentials: Vec<f64>,
    log_hidden_norm: f64,
    parameterization: HiddenParameterization,
    normalized: bool,
    optimize_hidden: bool,
    hyperparameters: Vec<f64>,
    log_gamma_sum: f64,
    starts: usize,
    normalization: Cell<NormalizationState>,
}

impl MixtureCore {
    /// Creates a core with uniform potentials.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] for zero components, zero
    /// starts, or hyperparameters that are negative or not one per component.
    pub fn new(
        components: usize,
        parameterization: HiddenParameterization,
        normalized: bool,
        hyperparameters: Vec<f64>,
        starts: usize,
    ) -> Result<Self, MixtureError> {
        if components == 0 {
            return Err(MixtureError::Configuration(
                "a mixture needs at least one component".to_string(),
            ));
        }
        if starts == 0 {
            return Err(MixtureError::Configuration(
                "the number of starts must be positive".to_string(),
            ));
        }
        if hyperparameters.len() != components {
            return Err(MixtureError::Configuration(format!(
                "expected {components} hidden hyperparameters, got {}",
                hyperparameters.len()
            )));
        }
        if let Some(index) = hyperparameters.iter().position(|h| h.is_nan() || *h < 0.0) {
            return Err(MixtureError::Configuration(format!(
                "hidden hyperparameter of component {index} must be non-negative"
            )));
        }

        let mut core = Self {
            hidden: vec![0.0; components],
            log_potentials: vec![0.0; components],
            potentials: vec![0.0; components],
            log_hidden_norm: 0.0,
            parameterization,
            normalized,
            optimize_hidden: true,
            log_gamma_sum: dirichlet_log_normalizer(&hyperparameters),
            hyperparameters,
            starts,
            normalization: Cell::new(NormalizationState::NotComputed),
        };
        core.refresh();
        Ok(core)
    }

    pub fn components(&self) -> usize {
        self.hidden.len()
    }

    pub fn parameterization(&self) -> HiddenParameterization {
        self.parameterization
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn starts(&self) -> usize {
        self.starts
    }

    pub fn hyperparameters(&self) -> &[f64] {
        &self.hyperparameters
    }

    /// Sum of the hidden hyperparameters.
    pub fn ess(&self) -> f64 {
        self.hyperparameters.iter().sum()
    }

    /// Excludes the hidden block from the exposed parameter vector when
    /// `false`.
    pub fn set_optimize_hidden(&mut self, optimize: bool) {
        self.optimize_hidden = optimize;
    }

    pub fn optimizes_hidden(&self) -> bool {
        self.optimize_hidden
    }

    /// Number of exposed hidden parameters.
    pub fn hidden_parameter_count(&self) -> usize {
        if self.optimize_hidden {
            self.parameterization.free_parameters(self.components())
        } else {
            0
        }
    }

    /// All `K` hidden values, including a pinned last one.
    pub fn hidden(&self) -> &[f64] {
        &self.hidden
    }

    /// The exposed hidden parameters.
    pub fn hidden_parameters(&self) -> Vec<f64> {
        self.hidden[..self.hidden_parameter_count()].to_vec()
    }

    pub fn log_potential(&self, component: usize) -> f64 {
        self.log_potentials[component]
    }

    pub fn log_potentials(&self) -> &[f64] {
        &self.log_potentials
    }

    pub fn potentials(&self) -> &[f64] {
        &self.potentials
    }

    pub fn log_hidden_norm(&self) -> f64 {
        self.log_hidden_norm
    }

    pub fn normalization_state(&self) -> NormalizationState {
        self.normalization.get()
    }

    /// Replaces all `K` hidden values. With free parameterization the values
    /// are shifted so that the last one is 0.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] unless exactly `K` values are
    /// given.
    pub fn set_hidden_parameters(&mut self, values: &[f64]) -> Result<(), MixtureError> {
        if values.len() != self.components() {
            return Err(MixtureError::LengthMismatch {
                expected: self.components(),
                actual: values.len(),
            });
        }
        self.hidden.copy_from_slice(values);
        self.pin_last();
        self.refresh();
        Ok(())
    }

    /// Reads the exposed hidden parameters from `params[offset..]`.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::ParameterCount`] if the slice is too short.
    pub fn set_hidden_from(&mut self, params: &[f64], offset: usize) -> Result<(), MixtureError> {
        let count = self.hidden_parameter_count();
        let block = crate::scoring::parameter_block(params, offset, count)?;
        self.hidden[..count].copy_from_slice(block);
        if self.parameterization == HiddenParameterization::Free && count > 0 {
            let last = self.components() - 1;
            self.hidden[last] = 0.0;
        }
        self.refresh();
        Ok(())
    }

    /// Adds `delta` to the hidden value of `component`, keeping the pinned
    /// entry at 0 under free parameterization.
    pub fn shift_hidden(&mut self, component: usize, delta: f64) {
        let last = self.components() - 1;
        if self.parameterization == HiddenParameterization::Free && component == last {
            for value in &mut self.hidden[..last] {
                *value -= delta;
            }
        } else {
            self.hidden[component] += delta;
        }
        self.refresh();
    }

    /// Closed-form hidden update from aggregated responsibility mass
    /// `statistics`, optionally adding the Dirichlet hyperparameters.
    ///
    /// `component_log_norms` holds every component's own log normalization
    /// constant so that unnormalized components end up with the estimated
    /// mixing proportions.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] for wrongly sized inputs and
    /// [`MixtureError::Numerical`] for NaN statistics.
    pub fn compute_hidden_parameter(
        &mut self,
        statistics: &[f64],
        add_hyperparameters: bool,
        component_log_norms: &[f64],
    ) -> Result<(), MixtureError> {
        let k = self.components();
        if statistics.len() != k || component_log_norms.len() != k {
            return Err(MixtureError::LengthMismatch {
                expected: k,
                actual: statistics.len().min(component_log_norms.len()),
            });
        }
        let mut proportions: Vec<f64> = statistics
            .iter()
            .zip(&self.hyperparameters)
            .map(|(&s, &h)| if add_hyperparameters { s + h } else { s })
            .collect();
        let total: f64 = proportions.iter().sum();
        if total.is_nan() {
            return Err(MixtureError::Numerical(
                "hidden statistics contain NaN".to_string(),
            ));
        }
        if total > 0.0 {
            proportions.iter_mut().for_each(|p| *p /= total);
        } else {
            proportions.fill(1.0 / k as f64);
        }
        self.set_from_proportions(&proportions, component_log_norms);
        Ok(())
    }

    pub fn initialize_hidden_uniformly(&mut self, component_log_norms: &[f64]) {
        let proportions = vec![1.0 / self.components() as f64; self.components()];
        self.set_from_proportions(&proportions, component_log_norms);
    }

    /// Uses the mean of the Dirichlet prior, or uniform proportions if every
    /// hyperparameter is 0.
    pub fn initialize_hidden_from_hyperparameters(&mut self, component_log_norms: &[f64]) {
        let k = self.components();
        let total = self.ess();
        let proportions: Vec<f64> = if total > 0.0 {
            self.hyperparameters.iter().map(|h| h / total).collect()
        } else {
            vec![1.0 / k as f64; k]
        };
        self.set_from_proportions(&proportions, component_log_norms);
    }

    /// Draws proportions from the Dirichlet prior, or from `Dirichlet(1, ..,
    /// 1)` when some hyperparameter is 0.
    ///
    /// # Errors
    ///
    /// Propagates sampling errors.
    pub fn initialize_hidden_randomly<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        component_log_norms: &[f64],
    ) -> Result<(), MixtureError> {
        let alpha: Vec<f64> = if self.hyperparameters.iter().all(|&h| h > 0.0) {
            self.hyperparameters.clone()
        } else {
            vec![1.0; self.components()]
        };
        let proportions = sample_dirichlet(&alpha, rng)?;
        self.set_from_proportions(&proportions, component_log_norms);
        Ok(())
    }

    /// Marks the cached normalization constant stale.
    pub fn invalidate_normalization(&self) {
        if self.normalized {
            self.normalization.set(NormalizationState::IdenticallyZero);
        } else {
            self.normalization.set(NormalizationState::NotComputed);
        }
    }

    /// Global log normalization constant; `component_log_norms` is only
    /// evaluated on a cache miss.
    pub fn log_normalization_constant<F>(&self, component_log_norms: F) -> f64
    where
        F: FnOnce() -> Vec<f64>,
    {
        match self.normalization.get() {
            NormalizationState::IdenticallyZero => 0.0,
            NormalizationState::Computed(value) => value,
            NormalizationState::NotComputed => {
                let terms: Vec<f64> = component_log_norms()
                    .iter()
                    .zip(&self.log_potentials)
                    .map(|(norm, log_potential)| norm + log_potential)
                    .collect();
                let value = log_sum_exp(&terms);
                self.normalization.set(NormalizationState::Computed(value));
                value
            }
        }
    }

    /// Share of the normalization constant owned by every component, the
    /// factor its own normalization gradient enters with.
    pub fn normalization_shares(&self, component_log_norms: &[f64]) -> Vec<f64> {
        let log_norm = self.log_normalization_constant(|| component_log_norms.to_vec());
        component_log_norms
            .iter()
            .zip(&self.log_potentials)
            .map(|(norm, log_potential)| (norm + log_potential - log_norm).exp())
            .collect()
    }

    /// Hidden part of the log prior: `Σ hidden_i * h_i - (Σ h) * logHiddenNorm`
    /// for normalized mixtures, plus the Dirichlet log-gamma constant.
    pub fn hidden_log_prior_term(&self) -> f64 {
        let mut term: f64 = self
            .hidden
            .iter()
            .zip(&self.hyperparameters)
            .filter(|(_, h)| **h != 0.0)
            .map(|(value, h)| value * h)
            .sum();
        if self.normalized {
            term -= self.ess() * self.log_hidden_norm;
        }
        term + self.log_gamma_sum
    }

    /// Adds `h_i - ess * potential_i` (normalized) or `h_i` to every exposed
    /// hidden slot of `gradient[offset..]`.
    pub fn add_hidden_prior_gradient(&self, gradient: &mut [f64], offset: usize) {
        let ess = self.ess();
        for j in 0..self.hidden_parameter_count() {
            let mut value = self.hyperparameters[j];
            if self.normalized {
                value -= ess * self.potentials[j];
            }
            gradient[offset + j] += value;
        }
    }

    /// Pushes the score gradient of every exposed hidden parameter given the
    /// component responsibilities of one window.
    pub fn push_hidden_gradient(
        &self,
        responsibilities: &[f64],
        offset: usize,
        gradient: &mut SparseGradient,
    ) {
        for j in 0..self.hidden_parameter_count() {
            let mut value = responsibilities[j];
            if self.normalized {
                value -= self.potentials[j];
            }
            gradient.push(offset + j, value);
        }
    }

    /// Adds `factor` times the gradient of the normalization constant with
    /// respect to the exposed hidden parameters.
    pub fn add_hidden_normalization_gradient(
        &self,
        shares: &[f64],
        gradient: &mut [f64],
        offset: usize,
        factor: f64,
    ) {
        if self.normalized {
            return;
        }
        for j in 0..self.hidden_parameter_count() {
            gradient[offset + j] += factor * shares[j];
        }
    }

    fn set_from_proportions(&mut self, proportions: &[f64], component_log_norms: &[f64]) {
        for ((value, &p), &norm) in self
            .hidden
            .iter_mut()
            .zip(proportions)
            .zip(component_log_norms)
        {
            *value = p.max(f64::MIN_POSITIVE).ln() - norm;
        }
        self.pin_last();
        self.refresh();
    }

    fn pin_last(&mut self) {
        if self.parameterization != HiddenParameterization::Free {
            return;
        }
        if let Some(&last) = self.hidden.last() {
            if last.is_finite() {
                self.hidden.iter_mut().for_each(|value| *value -= last);
            }
        }
    }

    fn refresh(&mut self) {
        if self.normalized {
            self.log_hidden_norm = log_sum_exp(&self.hidden);
            for (log_potential, &value) in self.log_potentials.iter_mut().zip(&self.hidden) {
                *log_potential = value - self.log_hidden_norm;
            }
        } else {
            self.log_hidden_norm = 0.0;
            self.log_potentials.copy_from_slice(&self.hidden);
        }
        for (potential, &log_potential) in self.potentials.iter_mut().zip(&self.log_potentials) {
            *potential = log_potential.exp();
        }
        self.invalidate_normalization();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample_core(parameterization: HiddenParameterization, normalized: bool) -> MixtureCore {
        MixtureCore::new(3, parameterization, normalized, vec![1.0, 2.0, 3.0], 1).unwrap()
    }

    #[test]
    fn test_construction_errors() {
        let free = HiddenParameterization::Free;
        assert!(MixtureCore::new(0, free, true, vec![], 1).is_err());
        assert!(MixtureCore::new(2, free, true, vec![1.0, 1.0], 0).is_err());
        assert!(MixtureCore::new(2, free, true, vec![1.0], 1).is_err());
        let error = MixtureCore::new(2, free, true, vec![1.0, -1.0], 1).unwrap_err();
        assert!(error.to_string().contains("component 1"));
    }

    #[test]
    fn test_uniform_potentials_sum_to_one() {
        let core = sample_core(HiddenParameterization::Full, true);
        let total: f64 = core.potentials().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(core.normalization_state(), NormalizationState::IdenticallyZero);
        assert_eq!(core.log_normalization_constant(|| vec![5.0; 3]), 0.0);
    }

    #[test]
    fn test_free_and_full_give_identical_potentials() {
        let mut free = sample_core(HiddenParameterization::Free, true);
        let mut full = sample_core(HiddenParameterization::Full, true);
        full.set_hidden_parameters(&[0.3, -1.2, 2.0]).unwrap();
        free.set_hidden_parameters(&[0.3, -1.2, 2.0]).unwrap();

        assert_eq!(free.hidden()[2], 0.0);
        assert_eq!(free.hidden_parameters().len(), 2);
        assert_eq!(full.hidden_parameters().len(), 3);
        for (a, b) in free.log_potentials().iter().zip(full.log_potentials()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_normalization_cache_lifecycle() {
        let mut core = sample_core(HiddenParameterization::Full, false);
        assert_eq!(core.normalization_state(), NormalizationState::NotComputed);

        let norms = vec![0.0, 1.0, 2.0];
        let value = core.log_normalization_constant(|| norms.clone());
        let expected = log_sum_exp(&[0.0, 1.0, 2.0]);
        assert!((value - expected).abs() < 1e-12);
        assert_eq!(core.normalization_state(), NormalizationState::Computed(value));

        // cache hit does not evaluate the closure
        let cached = core.log_normalization_constant(|| panic!("recomputed"));
        assert_eq!(cached, value);

        core.set_hidden_parameters(&[1.0, 0.0, 0.0]).unwrap();
        assert_eq!(core.normalization_state(), NormalizationState::NotComputed);
    }

    #[test]
    fn test_compute_hidden_parameter_matches_proportions() {
        for parameterization in [HiddenParameterization::Free, HiddenParameterization::Full] {
            let mut core = sample_core(parameterization, true);
            core.compute_hidden_parameter(&[3.0, 2.0, 1.0], true, &[0.0; 3])
                .unwrap();
            // (3 + 1, 2 + 2, 1 + 3) / 12
            for potential in core.potentials() {
                assert!((potential - 4.0 / 12.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_unnormalized_proportions_account_for_component_norms() {
        let mut core = sample_core(HiddenParameterization::Full, false);
        let norms = [1.0, -2.0, 0.5];
        core.compute_hidden_parameter(&[1.0, 1.0, 2.0], false, &norms)
            .unwrap();
        let shares = core.normalization_shares(&norms);
        assert!((shares[0] - 0.25).abs() < 1e-12);
        assert!((shares[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_shift_hidden_respects_pinned_entry() {
        let mut core = sample_core(HiddenParameterization::Free, true);
        let before = core.log_potentials().to_vec();
        core.shift_hidden(2, 0.5);
        assert_eq!(core.hidden()[2], 0.0);
        // equivalent to raising the last component
        let mut full = sample_core(HiddenParameterization::Full, true);
        full.set_hidden_parameters(&[0.0, 0.0, 0.5]).unwrap();
        for (a, b) in core.log_potentials().iter().zip(full.log_potentials()) {
            assert!((a - b).abs() < 1e-12);
        }
        assert!(core.log_potentials()[2] > before[2]);
    }

    #[test]
    fn test_prior_gradient_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut core = sample_core(HiddenParameterization::Free, true);
        core.initialize_hidden_randomly(&mut rng, &[0.0; 3]).unwrap();

        let mut gradient = vec![0.0; 2];
        core.add_hidden_prior_gradient(&mut gradient, 0);

        let params = core.hidden_parameters();
        let h = 1e-6;
        for index in 0..2 {
            let mut plus = params.clone();
            plus[index] += h;
            let mut minus = params.clone();
            minus[index] -= h;
            let mut a = core.clone();
            a.set_hidden_from(&plus, 0).unwrap();
            let mut b = core.clone();
            b.set_hidden_from(&minus, 0).unwrap();
            let numeric = (a.hidden_log_prior_term() - b.hidden_log_prior_term()) / (2.0 * h);
            assert!((gradient[index] - numeric).abs() < 1e-6);
        }
    }

    #[test]
    fn test_hidden_prior_is_dirichlet_log_density() {
        let mut core = sample_core(HiddenParameterization::Full, true);
        core.set_hidden_parameters(&[0.2f64.ln(), 0.3f64.ln(), 0.5f64.ln()])
            .unwrap();
        let expected = dirichlet_log_normalizer(&[1.0, 2.0, 3.0])
            + 0.2f64.ln()
            + 2.0 * 0.3f64.ln()
            + 3.0 * 0.5f64.ln();
        assert!((core.hidden_log_prior_term() - expected).abs() < 1e-9);
    }
}
