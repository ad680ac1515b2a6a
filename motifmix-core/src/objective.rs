//! Differentiable log posterior for gradient-based optimizers.
//!
//! The optimizer itself lives outside this crate; it only needs the
//! parameter vector of a model, the objective and its dense gradient.

use crate::mixture::MixtureModel;
use crate::motif::MotifOccurrenceModel;
use crate::scoring::SequenceScore;
use crate::sequence::{DataSet, Sequence, resolve_weights};
use crate::types::{MixtureError, SparseGradient};

/// The surface an external numerical optimizer drives.
pub trait DifferentiableModel: Clone + Send {
    /// # Errors
    ///
    /// Returns an error if the window does not fit the sequence.
    fn score(&self, sequence: &Sequence, start: usize) -> Result<f64, MixtureError>;

    /// # Errors
    ///
    /// Returns an error if the window does not fit the sequence or the
    /// layout is unresolved.
    fn score_and_gradient(
        &self,
        sequence: &Sequence,
        start: usize,
        gradient: &mut SparseGradient,
    ) -> Result<f64, MixtureError>;

    /// # Errors
    ///
    /// Returns [`MixtureError::Uninitialized`] while the layout is unresolved.
    fn current_parameter_values(&self) -> Result<Vec<f64>, MixtureError>;

    /// # Errors
    ///
    /// Returns [`MixtureError::ParameterCount`] for a short slice.
    fn set_parameters(&mut self, params: &[f64], offset: usize) -> Result<(), MixtureError>;

    /// `None` while some dimension is unresolved.
    fn number_of_parameters(&self) -> Option<usize>;

    fn log_normalization_constant(&self) -> f64;

    /// # Errors
    ///
    /// Returns [`MixtureError::Uninitialized`] while the layout is unresolved.
    fn add_gradient_of_log_normalization_constant(
        &self,
        gradient: &mut [f64],
        offset: usize,
        factor: f64,
    ) -> Result<(), MixtureError>;

    fn log_prior_term(&self) -> f64;

    /// # Errors
    ///
    /// Returns [`MixtureError::Uninitialized`] while the layout is unresolved.
    fn add_gradient_of_log_prior_term(
        &self,
        gradient: &mut [f64],
        offset: usize,
    ) -> Result<(), MixtureError>;

    fn is_initialized(&self) -> bool;
}

impl<C: SequenceScore> DifferentiableModel for MixtureModel<C> {
    fn score(&self, sequence: &Sequence, start: usize) -> Result<f64, MixtureError> {
        MixtureModel::score(self, sequence, start)
    }

    fn score_and_gradient(
        &self,
        sequence: &Sequence,
        start: usize,
        gradient: &mut SparseGradient,
    ) -> Result<f64, MixtureError> {
        MixtureModel::score_and_gradient(self, sequence, start, gradient)
    }

    fn current_parameter_values(&self) -> Result<Vec<f64>, MixtureError> {
        MixtureModel::current_parameter_values(self)
    }

    fn set_parameters(&mut self, params: &[f64], offset: usize) -> Result<(), MixtureError> {
        MixtureModel::set_parameters(self, params, offset)
    }

    fn number_of_parameters(&self) -> Option<usize> {
        MixtureModel::number_of_parameters(self)
    }

    fn log_normalization_constant(&self) -> f64 {
        MixtureModel::log_normalization_constant(self)
    }

    fn add_gradient_of_log_normalization_constant(
        &self,
        gradient: &mut [f64],
        offset: usize,
        factor: f64,
    ) -> Result<(), MixtureError> {
        MixtureModel::add_gradient_of_log_normalization_constant(self, gradient, offset, factor)
    }

    fn log_prior_term(&self) -> f64 {
        MixtureModel::log_prior_term(self)
    }

    fn add_gradient_of_log_prior_term(
        &self,
        gradient: &mut [f64],
        offset: usize,
    ) -> Result<(), MixtureError> {
        MixtureModel::add_gradient_of_log_prior_term(self, gradient, offset)
    }

    fn is_initialized(&self) -> bool {
        MixtureModel::is_initialized(self)
    }
}

impl<M: SequenceScore> DifferentiableModel for MotifOccurrenceModel<M> {
    fn score(&self, sequence: &Sequence, start: usize) -> Result<f64, MixtureError> {
        MotifOccurrenceModel::score(self, sequence, start)
    }

    fn score_and_gradient(
        &self,
        sequence: &Sequence,
        start: usize,
        gradient: &mut SparseGradient,
    ) -> Result<f64, MixtureError> {
        MotifOccurrenceModel::score_and_gradient(self, sequence, start, gradient)
    }

    fn current_parameter_values(&self) -> Result<Vec<f64>, MixtureError> {
        MotifOccurrenceModel::current_parameter_values(self)
    }

    fn set_parameters(&mut self, params: &[f64], offset: usize) -> Result<(), MixtureError> {
        MotifOccurrenceModel::set_parameters(self, params, offset)
    }

    fn number_of_parameters(&self) -> Option<usize> {
        MotifOccurrenceModel::number_of_parameters(self)
    }

    fn log_normalization_constant(&self) -> f64 {
        MotifOccurrenceModel::log_normalization_constant(self)
    }

    fn add_gradient_of_log_normalization_constant(
        &self,
        gradient: &mut [f64],
        offset: usize,
        factor: f64,
    ) -> Result<(), MixtureError> {
        MotifOccurrenceModel::add_gradient_of_log_normalization_constant(
            self, gradient, offset, factor,
        )
    }

    fn log_prior_term(&self) -> f64 {
        MotifOccurrenceModel::log_prior_term(self)
    }

    fn add_gradient_of_log_prior_term(
        &self,
        gradient: &mut [f64],
        offset: usize,
    ) -> Result<(), MixtureError> {
        MotifOccurrenceModel::add_gradient_of_log_prior_term(self, gradient, offset)
    }

    fn is_initialized(&self) -> bool {
        MotifOccurrenceModel::is_initialized(self)
    }
}

/// Weighted log posterior `Σ wₙ (score(xₙ) − log Z) + log prior`.
///
/// Every sequence is scored from position 0.
///
/// # Errors
///
/// Returns [`MixtureError::LengthMismatch`] for a wrongly sized weight
/// vector and propagates scoring errors.
pub fn log_posterior<M: DifferentiableModel>(
    model: &M,
    data: &DataSet,
    weights: Option<&[f64]>,
) -> Result<f64, MixtureError> {
    let weights = resolve_weights(data, weights)?;
    let log_norm = model.log_normalization_constant();
    let mut value = 0.0;
    for (sequence, &weight) in data.iter().zip(&weights) {
        value += weight * (model.score(sequence, 0)? - log_norm);
    }
    Ok(value + model.log_prior_term())
}

/// [`log_posterior`] together with its dense gradient over
/// [`DifferentiableModel::current_parameter_values`].
///
/// # Errors
///
/// Returns [`MixtureError::Uninitialized`] while the parameter count is
/// unresolved and propagates scoring errors.
pub fn log_posterior_and_gradient<M: DifferentiableModel>(
    model: &M,
    data: &DataSet,
    weights: Option<&[f64]>,
) -> Result<(f64, Vec<f64>), MixtureError> {
    let weights = resolve_weights(data, weights)?;
    let dimension = model.number_of_parameters().ok_or_else(|| {
        MixtureError::Uninitialized("parameter count is not resolved".to_string())
    })?;

    let log_norm = model.log_normalization_constant();
    let mut gradient = vec![0.0; dimension];
    let mut sparse = SparseGradient::new();
    let mut value = 0.0;
    let mut total_weight = 0.0;
    for (sequence, &weight) in data.iter().zip(&weights) {
        sparse.clear();
        let score = model.score_and_gradient(sequence, 0, &mut sparse)?;
        sparse.add_to_dense(&mut gradient, weight);
        value += weight * (score - log_norm);
        total_weight += weight;
    }
    model.add_gradient_of_log_normalization_constant(&mut gradient, 0, -total_weight)?;
    model.add_gradient_of_log_prior_term(&mut gradient, 0)?;
    Ok((value + model.log_prior_term(), gradient))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OccurrenceMode;
    use crate::duration::UniformDuration;
    use crate::motif::MotifSlot;
    use crate::scoring::{Component, HomogeneousMarkovModel, PositionWeightMatrix};
    use crate::types::HiddenParameterization;

    fn data() -> DataSet {
        DataSet::new(
            4,
            vec![
                Sequence::from_ranks(vec![0, 1, 2, 3, 0, 1]),
                Sequence::from_ranks(vec![2, 2, 1, 0, 3, 3]),
                Sequence::from_ranks(vec![1, 0, 0, 2, 3, 1]),
            ],
        )
        .unwrap()
    }

    fn check_gradient<M: DifferentiableModel>(model: &M, weights: Option<&[f64]>) {
        let data = data();
        let (value, gradient) = log_posterior_and_gradient(model, &data, weights).unwrap();
        assert!((value - log_posterior(model, &data, weights).unwrap()).abs() < 1e-10);

        let params = model.current_parameter_values().unwrap();
        let step = 1e-6;
        for i in 0..params.len() {
            let mut plus = model.clone();
            let mut shifted = params.clone();
            shifted[i] += step;
            plus.set_parameters(&shifted, 0).unwrap();
            let mut minus = model.clone();
            shifted[i] -= 2.0 * step;
            minus.set_parameters(&shifted, 0).unwrap();
            let numeric = (log_posterior(&plus, &data, weights).unwrap()
                - log_posterior(&minus, &data, weights).unwrap())
                / (2.0 * step);
            assert!(
                (numeric - gradient[i]).abs() < 1e-4,
                "parameter {i}: analytic {} vs numeric {numeric}",
                gradient[i]
            );
        }
    }

    fn unnormalized_mixture() -> MixtureModel {
        let first = PositionWeightMatrix::from_potentials(
            6,
            4,
            &[
                0.3, -0.2, 0.1, 0.0, 0.5, 0.2, -0.4, 0.0, -0.1, 0.0, 0.6, 0.0, 0.2, 0.2, 0.2, 0.0,
                0.0, -0.3, 0.4, 0.0, 0.1, 0.1, -0.2, 0.0,
            ],
            2.0,
        )
        .unwrap()
        .with_normalization(false);
        let second = PositionWeightMatrix::new(6, 4, 2.0).with_normalization(false);
        let mut mixture = MixtureModel::new(
            vec![Component::from(first), Component::from(second)],
            HiddenParameterization::Full,
        )
        .unwrap();
        mixture.set_hidden_parameters(&[0.4, -0.3]).unwrap();
        mixture
    }

    #[test]
    fn test_mixture_gradient_includes_normalization() {
        let mixture = unnormalized_mixture();
        assert!(!mixture.is_normalized());
        check_gradient(&mixture, Some(&[1.0, 0.5, 2.0]));
    }

    #[test]
    fn test_occurrence_gradient_matches_finite_differences() {
        let motif = PositionWeightMatrix::from_probabilities(
            3,
            4,
            &[0.7, 0.1, 0.1, 0.1, 0.1, 0.6, 0.2, 0.1, 0.25, 0.25, 0.25, 0.25],
            2.0,
        )
        .unwrap();
        let model = MotifOccurrenceModel::new(
            vec![MotifSlot::new(
                Component::from(motif),
                UniformDuration::new(0, 3).unwrap(),
            )],
            HomogeneousMarkovModel::new(1, 4, 4.0),
            OccurrenceMode::Sometimes,
            6,
            HiddenParameterization::Free,
        )
        .unwrap();
        check_gradient(&model, None);
    }

    #[test]
    fn test_weight_vector_length_checked() {
        let model = unnormalized_mixture();
        assert!(matches!(
            log_posterior(&model, &data(), Some(&[1.0])),
            Err(MixtureError::LengthMismatch { .. })
        ));
        assert!(matches!(
            log_posterior_and_gradient(&model, &data(), Some(&[1.0, 1.0])),
            Err(MixtureError::LengthMismatch { .. })
        ));
    }
}
