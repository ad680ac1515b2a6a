use std::fmt;

use rand::Rng;

use crate::math::{ln_gamma, sample_dirichlet};
use crate::scoring::{
    SequenceScore, log_softmax_into, parameter_block, potentials_from_probabilities,
};
use crate::sequence::{DataSet, Sequence, WeightedSegment};
use crate::types::{HiddenParameterization, MixtureError, SparseGradient};

/// Position weight matrix: an inhomogeneous order-0 model of a fixed-width
/// motif.
///
/// Each column holds `alphabet_size` potentials. A normalized matrix scores
/// the softmax of each column; an unnormalized one scores the raw potentials
/// and reports `Σ_columns logsumexp(column)` as its normalization constant.
/// With [`HiddenParameterization::Free`] the last potential of every column
/// is pinned to 0.
///
/// # Examples
///
/// ```rust
/// use motifmix_core::scoring::{PositionWeightMatrix, SequenceScore};
/// use motifmix_core::sequence::Sequence;
///
/// let pwm = PositionWeightMatrix::from_probabilities(2, 2, &[0.75, 0.25, 0.5, 0.5], 0.0)?;
/// let sequence = Sequence::from_ranks(vec![0, 1]);
/// let score = pwm.log_score(&sequence, 0, 2);
/// assert!((score - (0.75f64 * 0.5).ln()).abs() < 1e-12);
/// # Ok::<(), motifmix_core::types::MixtureError>(())
/// ```
#[derive(Debug, Clone)]
pub struct PositionWeightMatrix {
    width: usize,
    alphabet_size: usize,
    potentials: Vec<f64>,
    log_probabilities: Vec<f64>,
    column_norms: Vec<f64>,
    parameterization: HiddenParameterization,
    normalized: bool,
    ess: f64,
}

impl PositionWeightMatrix {
    /// A normalized, uniform matrix with free parameterization.
    pub fn new(width: usize, alphabet_size: usize, ess: f64) -> Self {
        let mut pwm = Self {
            width,
            alphabet_size,
            potentials: vec![0.0; width * alphabet_size],
            log_probabilities: vec![0.0; width * alphabet_size],
            column_norms: vec![0.0; width],
            parameterization: HiddenParameterization::Free,
            normalized: true,
            ess,
        };
        pwm.refresh();
        pwm
    }

    /// Builds a normalized matrix from column-major probabilities
    /// (`width * alphabet_size` values).
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] for a wrongly sized table.
    pub fn from_probabilities(
        width: usize,
        alphabet_size: usize,
        probabilities: &[f64],
        ess: f64,
    ) -> Result<Self, MixtureError> {
        let mut pwm = Self::new(width, alphabet_size, ess)
            .with_parameterization(HiddenParameterization::Full);
        if probabilities.len() != width * alphabet_size {
            return Err(MixtureError::LengthMismatch {
                expected: width * alphabet_size,
                actual: probabilities.len(),
            });
        }
        pwm.potentials = probabilities.iter().map(|p| p.ln()).collect();
        pwm.refresh();
        Ok(pwm)
    }

    /// Builds a normalized matrix with full parameterization from raw
    /// potentials; negative infinity encodes impossible symbols.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] for a wrongly sized table.
    pub fn from_potentials(
        width: usize,
        alphabet_size: usize,
        potentials: &[f64],
        ess: f64,
    ) -> Result<Self, MixtureError> {
        if potentials.len() != width * alphabet_size {
            return Err(MixtureError::LengthMismatch {
                expected: width * alphabet_size,
                actual: potentials.len(),
            });
        }
        let mut pwm = Self::new(width, alphabet_size, ess)
            .with_parameterization(HiddenParameterization::Full);
        pwm.potentials = potentials.to_vec();
        pwm.refresh();
        Ok(pwm)
    }

    #[must_use]
    pub fn with_parameterization(mut self, parameterization: HiddenParameterization) -> Self {
        self.parameterization = parameterization;
        if parameterization == HiddenParameterization::Free {
            self.pin_last_potentials();
        }
        self.refresh();
        self
    }

    /// Switches between softmax columns and raw potentials.
    #[must_use]
    pub fn with_normalization(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self.refresh();
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn parameterization(&self) -> HiddenParameterization {
        self.parameterization
    }

    /// Probabilities of column `position`.
    pub fn column_probabilities(&self, position: usize) -> Vec<f64> {
        let range = self.column(position);
        let norm = self.column_norms[position];
        self.potentials[range]
            .iter()
            .map(|&potential| (potential - norm).exp())
            .collect()
    }

    /// Most probable rank of every column.
    pub fn consensus(&self) -> Vec<u8> {
        (0..self.width)
            .map(|position| {
                let column = &self.potentials[self.column(position)];
                let mut best = 0;
                for (symbol, &potential) in column.iter().enumerate() {
                    if potential > column[best] {
                        best = symbol;
                    }
                }
                best as u8
            })
            .collect()
    }

    fn column(&self, position: usize) -> std::ops::Range<usize> {
        position * self.alphabet_size..(position + 1) * self.alphabet_size
    }

    fn free_per_column(&self) -> usize {
        self.parameterization.free_parameters(self.alphabet_size)
    }

    fn pin_last_potentials(&mut self) {
        for position in 0..self.width {
            let range = self.column(position);
            let column = &mut self.potentials[range];
            if let Some(&last) = column.last() {
                if last.is_finite() {
                    column.iter_mut().for_each(|potential| *potential -= last);
                }
            }
        }
    }

    fn refresh(&mut self) {
        for position in 0..self.width {
            let range = self.column(position);
            let norm = log_softmax_into(
                &self.potentials[range.clone()],
                &mut self.log_probabilities[range.clone()],
            );
            self.column_norms[position] = norm;
            if !self.normalized {
                self.log_probabilities[range.clone()].copy_from_slice(&self.potentials[range]);
            }
        }
    }

    fn pseudo_count(&self) -> f64 {
        self.ess / self.alphabet_size as f64
    }

    fn check_window(&self, segment: &WeightedSegment<'_>) -> Result<(), MixtureError> {
        if segment.len() != self.width || segment.end > segment.sequence.len() {
            return Err(MixtureError::LengthMismatch {
                expected: self.width,
                actual: segment.len(),
            });
        }
        Ok(())
    }

    fn set_from_probabilities(&mut self, probabilities: &[f64]) {
        let pin = self.parameterization == HiddenParameterization::Free;
        for position in 0..self.width {
            let range = self.column(position);
            let potentials = potentials_from_probabilities(&probabilities[range.clone()], pin);
            self.potentials[range].copy_from_slice(&potentials);
        }
        self.refresh();
    }
}

impl SequenceScore for PositionWeightMatrix {
    fn length(&self) -> usize {
        self.width
    }

    fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    fn log_score(&self, sequence: &Sequence, start: usize, end: usize) -> f64 {
        debug_assert_eq!(end - start, self.width);
        (0..self.width)
            .map(|position| {
                let symbol = sequence.symbol_at(start + position);
                self.log_probabilities[position * self.alphabet_size + symbol]
            })
            .sum()
    }

    fn log_score_and_gradient(
        &self,
        sequence: &Sequence,
        start: usize,
        end: usize,
        gradient: &mut SparseGradient,
    ) -> f64 {
        debug_assert_eq!(end - start, self.width);
        let free = self.free_per_column();
        let mut score = 0.0;
        for position in 0..self.width {
            let symbol = sequence.symbol_at(start + position);
            let base = position * self.alphabet_size;
            score += self.log_probabilities[base + symbol];
            if self.normalized {
                for a in 0..free {
                    let indicator = if a == symbol { 1.0 } else { 0.0 };
                    let probability = self.log_probabilities[base + a].exp();
                    gradient.push(position * free + a, indicator - probability);
                }
            } else if symbol < free {
                gradient.push(position * free + symbol, 1.0);
            }
        }
        score
    }

    fn parameter_count(&self) -> Option<usize> {
        Some(self.width * self.free_per_column())
    }

    fn parameters(&self) -> Result<Vec<f64>, MixtureError> {
        let free = self.free_per_column();
        let mut params = Vec::with_capacity(self.width * free);
        for position in 0..self.width {
            let base = position * self.alphabet_size;
            params.extend_from_slice(&self.potentials[base..base + free]);
        }
        Ok(params)
    }

    fn set_parameters(&mut self, params: &[f64], offset: usize) -> Result<(), MixtureError> {
        let free = self.free_per_column();
        let block = parameter_block(params, offset, self.width * free)?;
        for position in 0..self.width {
            let base = position * self.alphabet_size;
            self.potentials[base..base + free]
                .copy_from_slice(&block[position * free..(position + 1) * free]);
            if free < self.alphabet_size {
                self.potentials[base + self.alphabet_size - 1] = 0.0;
            }
        }
        self.refresh();
        Ok(())
    }

    fn is_normalized(&self) -> bool {
        self.normalized
    }

    fn log_normalization_constant(&self) -> f64 {
        if self.normalized {
            0.0
        } else {
            self.column_norms.iter().sum()
        }
    }

    fn add_gradient_of_log_normalization_constant(
        &self,
        gradient: &mut [f64],
        offset: usize,
        factor: f64,
    ) {
        if self.normalized {
            return;
        }
        let free = self.free_per_column();
        for position in 0..self.width {
            let base = position * self.alphabet_size;
            let norm = self.column_norms[position];
            for a in 0..free {
                gradient[offset + position * free + a] +=
                    factor * (self.potentials[base + a] - norm).exp();
            }
        }
    }

    fn log_prior_term(&self) -> f64 {
        if self.ess <= 0.0 {
            return 0.0;
        }
        let alpha = self.pseudo_count();
        let column_constant = ln_gamma(self.ess) - self.alphabet_size as f64 * ln_gamma(alpha);
        (0..self.width)
            .map(|position| {
                let base = position * self.alphabet_size;
                let norm = self.column_norms[position];
                let log_density: f64 = self.potentials[base..base + self.alphabet_size]
                    .iter()
                    .map(|&potential| alpha * (potential - norm))
                    .sum();
                log_density + column_constant
            })
            .sum()
    }

    fn add_gradient_of_log_prior_term(&self, gradient: &mut [f64], offset: usize) {
        if self.ess <= 0.0 {
            return;
        }
        let alpha = self.pseudo_count();
        let free = self.free_per_column();
        for position in 0..self.width {
            let base = position * self.alphabet_size;
            let norm = self.column_norms[position];
            for a in 0..free {
                let probability = (self.potentials[base + a] - norm).exp();
                gradient[offset + position * free + a] += alpha - self.ess * probability;
            }
        }
    }

    fn ess(&self) -> f64 {
        self.ess
    }

    fn estimate(&mut self, segments: &[WeightedSegment<'_>]) -> Result<(), MixtureError> {
        let alpha = self.pseudo_count();
        let mut counts = vec![alpha; self.width * self.alphabet_size];
        for segment in segments {
            self.check_window(segment)?;
            for position in 0..self.width {
                let symbol = segment.sequence.symbol_at(segment.start + position);
                counts[position * self.alphabet_size + symbol] += segment.weight;
            }
        }
        for position in 0..self.width {
            let range = self.column(position);
            let column = &mut counts[range];
            let total: f64 = column.iter().sum();
            if total > 0.0 {
                column.iter_mut().for_each(|count| *count /= total);
            } else {
                column.fill(1.0 / self.alphabet_size as f64);
            }
        }
        if counts.iter().any(|p| p.is_nan()) {
            return Err(MixtureError::Numerical(
                "motif re-estimation produced NaN probabilities".to_string(),
            ));
        }
        self.set_from_probabilities(&counts);
        Ok(())
    }

    fn initialize_from_data(
        &mut self,
        data: &DataSet,
        weights: &[f64],
    ) -> Result<(), MixtureError> {
        let mut segments = Vec::new();
        for (sequence, &weight) in data.iter().zip(weights) {
            if sequence.len() < self.width {
                continue;
            }
            let windows = sequence.len() - self.width + 1;
            let share = weight / windows as f64;
            segments.extend(
                (0..windows).map(|start| {
                    WeightedSegment::new(sequence, start, start + self.width, share)
                }),
            );
        }
        self.estimate(&segments)
    }

    fn initialize_randomly<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), MixtureError> {
        let alpha = if self.ess > 0.0 {
            self.pseudo_count()
        } else {
            1.0
        };
        let concentrations = vec![alpha; self.alphabet_size];
        let mut probabilities = Vec::with_capacity(self.width * self.alphabet_size);
        for _ in 0..self.width {
            probabilities.extend(sample_dirichlet(&concentrations, rng)?);
        }
        self.set_from_probabilities(&probabilities);
        Ok(())
    }

    fn modify(&mut self, offset_left: isize, offset_right: isize) -> bool {
        let new_width = self.width as isize - offset_left + offset_right;
        if new_width < 1 {
            return false;
        }
        let new_width = new_width as usize;
        let mut potentials = vec![0.0; new_width * self.alphabet_size];
        for position in 0..new_width {
            let old = position as isize + offset_left;
            if old >= 0 && (old as usize) < self.width {
                let source = self.column(old as usize);
                potentials[position * self.alphabet_size..(position + 1) * self.alphabet_size]
                    .copy_from_slice(&self.potentials[source]);
            }
        }
        self.width = new_width;
        self.potentials = potentials;
        self.log_probabilities = vec![0.0; new_width * self.alphabet_size];
        self.column_norms = vec![0.0; new_width];
        self.refresh();
        true
    }
}

impl fmt::Display for PositionWeightMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PWM(width={}, alphabet={})", self.width, self.alphabet_size)?;
        for position in 0..self.width {
            write!(f, "\ncol {position}:")?;
            for probability in self.column_probabilities(position) {
                write!(f, " {probability:.3}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::dirichlet_log_normalizer;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Prior of one column in natural-parameter space.
    fn column_log_dirichlet(probabilities: &[f64], alpha: f64) -> f64 {
        let alphas = vec![alpha; probabilities.len()];
        dirichlet_log_normalizer(&alphas) + probabilities.iter().map(|p| alpha * p.ln()).sum::<f64>()
    }

    fn finite_difference(pwm: &PositionWeightMatrix, sequence: &Sequence, index: usize) -> f64 {
        let params = pwm.parameters().unwrap();
        let h = 1e-6;
        let mut plus = params.clone();
        plus[index] += h;
        let mut minus = params;
        minus[index] -= h;
        let mut a = pwm.clone();
        a.set_parameters(&plus, 0).unwrap();
        let mut b = pwm.clone();
        b.set_parameters(&minus, 0).unwrap();
        (a.log_score(sequence, 0, pwm.width()) - b.log_score(sequence, 0, pwm.width())) / (2.0 * h)
    }

    #[test]
    fn test_uniform_pwm_score() {
        let pwm = PositionWeightMatrix::new(3, 4, 4.0);
        let sequence = Sequence::from_ranks(vec![0, 3, 2]);
        let expected = 3.0 * 0.25f64.ln();
        assert!((pwm.log_score(&sequence, 0, 3) - expected).abs() < 1e-12);
        assert_eq!(pwm.parameter_count(), Some(9));
    }

    #[test]
    fn test_point_mass_column() {
        let pwm = PositionWeightMatrix::from_potentials(1, 2, &[0.0, f64::NEG_INFINITY], 0.0)
            .unwrap();
        assert_eq!(pwm.log_score(&Sequence::from_ranks(vec![0]), 0, 1), 0.0);
        assert_eq!(
            pwm.log_score(&Sequence::from_ranks(vec![1]), 0, 1),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_parameter_roundtrip_keeps_scores() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut pwm = PositionWeightMatrix::new(4, 4, 2.0);
        pwm.initialize_randomly(&mut rng).unwrap();
        let sequence = Sequence::from_ranks(vec![1, 2, 3, 0, 1]);
        let before = pwm.log_score(&sequence, 1, 5);

        let params = pwm.parameters().unwrap();
        let mut copy = PositionWeightMatrix::new(4, 4, 2.0);
        copy.set_parameters(&params, 0).unwrap();
        assert!((copy.log_score(&sequence, 1, 5) - before).abs() < 1e-12);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let sequence = Sequence::from_ranks(vec![2, 0, 1]);
        for normalized in [true, false] {
            for parameterization in [HiddenParameterization::Free, HiddenParameterization::Full] {
                let mut rng = StdRng::seed_from_u64(11);
                let mut pwm = PositionWeightMatrix::new(3, 3, 1.0)
                    .with_parameterization(parameterization)
                    .with_normalization(normalized);
                pwm.initialize_randomly(&mut rng).unwrap();

                let mut gradient = SparseGradient::new();
                pwm.log_score_and_gradient(&sequence, 0, 3, &mut gradient);
                let count = pwm.parameter_count().unwrap();
                let dense = gradient.to_dense(count);
                for (index, &analytic) in dense.iter().enumerate() {
                    let numeric = finite_difference(&pwm, &sequence, index);
                    assert!(
                        (analytic - numeric).abs() < 1e-6,
                        "index {index}: {analytic} vs {numeric}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_prior_term_matches_dirichlet_density() {
        let probabilities = [0.7, 0.2, 0.1, 0.3, 0.3, 0.4];
        let pwm = PositionWeightMatrix::from_probabilities(2, 3, &probabilities, 3.0).unwrap();
        let expected = column_log_dirichlet(&probabilities[0..3], 1.0)
            + column_log_dirichlet(&probabilities[3..6], 1.0);
        assert!((pwm.log_prior_term() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_recovers_planted_symbols() {
        let sequence = Sequence::from_ranks(vec![3, 1, 0, 2, 1, 3]);
        let mut pwm = PositionWeightMatrix::new(3, 4, 0.4);
        pwm.estimate(&[WeightedSegment::new(&sequence, 2, 5, 1.0)])
            .unwrap();
        assert_eq!(pwm.consensus(), vec![0, 2, 1]);
        let column = pwm.column_probabilities(0);
        // (1 + 0.1) / (1 + 0.4)
        assert!((column[0] - 1.1 / 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_estimate_rejects_wrong_width() {
        let sequence = Sequence::from_ranks(vec![0, 1, 2, 3]);
        let mut pwm = PositionWeightMatrix::new(3, 4, 1.0);
        let result = pwm.estimate(&[WeightedSegment::new(&sequence, 0, 4, 1.0)]);
        assert!(matches!(result, Err(MixtureError::LengthMismatch { .. })));
    }

    #[test]
    fn test_modify_shrinks_and_grows() {
        let probabilities = [0.7, 0.3, 0.4, 0.6, 0.9, 0.1];
        let mut pwm = PositionWeightMatrix::from_probabilities(3, 2, &probabilities, 0.0).unwrap();

        assert!(pwm.modify(1, 0));
        assert_eq!(pwm.width(), 2);
        assert!((pwm.column_probabilities(0)[0] - 0.4).abs() < 1e-12);

        assert!(pwm.modify(-1, 0));
        assert_eq!(pwm.width(), 3);
        assert!((pwm.column_probabilities(0)[0] - 0.5).abs() < 1e-12);
        assert!((pwm.column_probabilities(2)[0] - 0.9).abs() < 1e-12);

        assert!(!pwm.modify(3, 0));
    }

    #[test]
    fn test_unnormalized_norm_is_sum_of_column_norms() {
        let pwm = PositionWeightMatrix::from_potentials(2, 2, &[0.0, 0.0, 1.0, 1.0], 0.0)
            .unwrap()
            .with_normalization(false);
        let expected = 2.0f64.ln() + (1.0 + 2.0f64.ln());
        assert!((pwm.log_normalization_constant() - expected).abs() < 1e-12);
        let sequence = Sequence::from_ranks(vec![0, 1]);
        assert!((pwm.log_score(&sequence, 0, 2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_display() {
        let pwm = PositionWeightMatrix::from_probabilities(2, 2, &[0.75, 0.25, 0.5, 0.5], 0.0)
            .unwrap();
        insta::assert_snapshot!(pwm.to_string(), @r"
        PWM(width=2, alphabet=2)
        col 0: 0.750 0.250
        col 1: 0.500 0.500
        ");
    }
}
