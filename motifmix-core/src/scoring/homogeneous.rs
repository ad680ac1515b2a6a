use std::fmt;

use rand::Rng;

use crate::math::{ln_gamma, sample_dirichlet};
use crate::scoring::{SequenceScore, log_softmax_into, parameter_block};
use crate::sequence::{Sequence, WeightedSegment};
use crate::types::{MixtureError, SparseGradient};

/// Homogeneous Markov model of order `k`, used as flanking background.
///
/// Holds one conditional table per order `0..=k`. The first positions of a
/// scored segment use the longest context available inside that segment, so
/// any `[start, end)` window is a normalized distribution on its own.
///
/// Parameters are the full softmax potentials of every context, concatenated
/// from order 0 upwards.
#[derive(Debug, Clone)]
pub struct HomogeneousMarkovModel {
    order: usize,
    alphabet_size: usize,
    table_offsets: Vec<usize>,
    potentials: Vec<f64>,
    log_probabilities: Vec<f64>,
    context_norms: Vec<f64>,
    ess: f64,
}

impl HomogeneousMarkovModel {
    /// A uniform model of the given order.
    pub fn new(order: usize, alphabet_size: usize, ess: f64) -> Self {
        let mut table_offsets = Vec::with_capacity(order + 2);
        let mut total = 0;
        let mut contexts = 1;
        for _ in 0..=order {
            table_offsets.push(total);
            total += contexts * alphabet_size;
            contexts *= alphabet_size;
        }
        table_offsets.push(total);

        let mut model = Self {
            order,
            alphabet_size,
            table_offsets,
            potentials: vec![0.0; total],
            log_probabilities: vec![0.0; total],
            context_norms: vec![0.0; total / alphabet_size.max(1)],
            ess,
        };
        model.refresh();
        model
    }

    /// Markov order, which is also the flank context length used around a
    /// motif.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Conditional probabilities of the next symbol after `context`
    /// (at most `order` ranks, most recent last).
    pub fn conditional_probabilities(&self, context: &[u8]) -> Vec<f64> {
        let used = &context[context.len().saturating_sub(self.order)..];
        let index = used
            .iter()
            .fold(0, |acc, &rank| acc * self.alphabet_size + usize::from(rank));
        let base = self.table_offsets[used.len()] + index * self.alphabet_size;
        self.log_probabilities[base..base + self.alphabet_size]
            .iter()
            .map(|lp| lp.exp())
            .collect()
    }

    fn refresh(&mut self) {
        let a = self.alphabet_size;
        for (context, norm) in self.context_norms.iter_mut().enumerate() {
            let range = context * a..(context + 1) * a;
            *norm = log_softmax_into(
                &self.potentials[range.clone()],
                &mut self.log_probabilities[range],
            );
        }
    }

    /// Index of the first parameter of the context preceding `position`.
    #[inline]
    fn context_base(&self, sequence: &Sequence, start: usize, position: usize) -> usize {
        let depth = self.order.min(position - start);
        let mut context = 0;
        for offset in position - depth..position {
            context = context * self.alphabet_size + sequence.symbol_at(offset);
        }
        self.table_offsets[depth] + context * self.alphabet_size
    }

    fn contexts_in_table(&self, depth: usize) -> usize {
        (self.table_offsets[depth + 1] - self.table_offsets[depth]) / self.alphabet_size
    }

    /// Pseudo count per cell of the depth-`depth` table.
    fn pseudo_count(&self, depth: usize) -> f64 {
        self.ess / (self.contexts_in_table(depth) * self.alphabet_size) as f64
    }

    fn set_from_probabilities(&mut self, probabilities: &[f64]) {
        for (potential, &p) in self.potentials.iter_mut().zip(probabilities) {
            *potential = p.ln();
        }
        self.refresh();
    }
}

impl SequenceScore for HomogeneousMarkovModel {
    fn length(&self) -> usize {
        0
    }

    fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    fn log_score(&self, sequence: &Sequence, start: usize, end: usize) -> f64 {
        (start..end)
            .map(|position| {
                let base = self.context_base(sequence, start, position);
                self.log_probabilities[base + sequence.symbol_at(position)]
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
        let mut score = 0.0;
        for position in start..end {
            let base = self.context_base(sequence, start, position);
            let symbol = sequence.symbol_at(position);
            score += self.log_probabilities[base + symbol];
            for a in 0..self.alphabet_size {
                let indicator = if a == symbol { 1.0 } else { 0.0 };
                gradient.push(base + a, indicator - self.log_probabilities[base + a].exp());
            }
        }
        score
    }

    fn parameter_count(&self) -> Option<usize> {
        Some(self.potentials.len())
    }

    fn parameters(&self) -> Result<Vec<f64>, MixtureError> {
        Ok(self.potentials.clone())
    }

    fn set_parameters(&mut self, params: &[f64], offset: usize) -> Result<(), MixtureError> {
        let block = parameter_block(params, offset, self.potentials.len())?;
        self.potentials.copy_from_slice(block);
        self.refresh();
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
        if self.ess <= 0.0 {
            return 0.0;
        }
        let a = self.alphabet_size;
        let mut term = 0.0;
        for depth in 0..=self.order {
            let contexts = self.contexts_in_table(depth);
            let alpha = self.pseudo_count(depth);
            let context_ess = alpha * a as f64;
            let constant = ln_gamma(context_ess) - a as f64 * ln_gamma(alpha);
            for context in 0..contexts {
                let base = self.table_offsets[depth] + context * a;
                let log_density: f64 = self.log_probabilities[base..base + a]
                    .iter()
                    .map(|&lp| alpha * lp)
                    .sum();
                term += log_density + constant;
            }
        }
        term
    }

    fn add_gradient_of_log_prior_term(&self, gradient: &mut [f64], offset: usize) {
        if self.ess <= 0.0 {
            return;
        }
        let a = self.alphabet_size;
        for depth in 0..=self.order {
            let alpha = self.pseudo_count(depth);
            let context_ess = alpha * a as f64;
            let begin = self.table_offsets[depth];
            let end = self.table_offsets[depth + 1];
            for index in begin..end {
                gradient[offset + index] +=
                    alpha - context_ess * self.log_probabilities[index].exp();
            }
        }
    }

    fn ess(&self) -> f64 {
        self.ess
    }

    fn estimate(&mut self, segments: &[WeightedSegment<'_>]) -> Result<(), MixtureError> {
        let a = self.alphabet_size;
        let mut counts = vec![0.0; self.potentials.len()];
        for depth in 0..=self.order {
            let alpha = self.pseudo_count(depth);
            counts[self.table_offsets[depth]..self.table_offsets[depth + 1]].fill(alpha);
        }
        for segment in segments {
            if segment.end > segment.sequence.len() {
                return Err(MixtureError::LengthMismatch {
                    expected: segment.end,
                    actual: segment.sequence.len(),
                });
            }
            let sequence = segment.sequence;
            for position in segment.start..segment.end {
                let symbol = sequence.symbol_at(position);
                // every available depth learns from this position
                let mut context = 0;
                for depth in 0..=self.order.min(position - segment.start) {
                    if depth > 0 {
                        let rank = sequence.symbol_at(position - depth);
                        context += rank * self.alphabet_size.pow(depth as u32 - 1);
                    }
                    let base = self.table_offsets[depth] + context * a;
                    counts[base + symbol] += segment.weight;
                }
            }
        }
        for context in counts.chunks_mut(a) {
            let total: f64 = context.iter().sum();
            if total > 0.0 {
                context.iter_mut().for_each(|count| *count /= total);
            } else {
                context.fill(1.0 / a as f64);
            }
        }
        if counts.iter().any(|p| p.is_nan()) {
            return Err(MixtureError::Numerical(
                "background re-estimation produced NaN probabilities".to_string(),
            ));
        }
        self.set_from_probabilities(&counts);
        Ok(())
    }

    fn initialize_randomly<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), MixtureError> {
        let a = self.alphabet_size;
        let mut probabilities = Vec::with_capacity(self.potentials.len());
        for depth in 0..=self.order {
            let alpha = if self.ess > 0.0 {
                self.pseudo_count(depth)
            } else {
                1.0
            };
            let concentrations = vec![alpha; a];
            for _ in 0..self.contexts_in_table(depth) {
                probabilities.extend(sample_dirichlet(&concentrations, rng)?);
            }
        }
        self.set_from_probabilities(&probabilities);
        Ok(())
    }
}

impl fmt::Display for HomogeneousMarkovModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Homogeneous(order={}, alphabet={})\np0:",
            self.order, self.alphabet_size
        )?;
        for probability in self.conditional_probabilities(&[]) {
            write!(f, " {probability:.3}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_parameter_layout_by_order() {
        let model = HomogeneousMarkovModel::new(2, 4, 1.0);
        assert_eq!(model.parameter_count(), Some(4 + 16 + 64));
        assert_eq!(model.order(), 2);
    }

    #[test]
    fn test_segments_are_normalized() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut model = HomogeneousMarkovModel::new(1, 2, 2.0);
        model.initialize_randomly(&mut rng).unwrap();

        // all binary strings of length 3 sum to probability 1
        let mut total = 0.0;
        for bits in 0u8..8 {
            let sequence = Sequence::from_ranks(vec![bits & 1, (bits >> 1) & 1, (bits >> 2) & 1]);
            total += model.log_score(&sequence, 0, 3).exp();
        }
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_context_restricted_to_segment() {
        let mut model = HomogeneousMarkovModel::new(1, 2, 0.0);
        let sequence = Sequence::from_ranks(vec![0, 1, 1, 0]);
        model
            .estimate(&[WeightedSegment::whole(&sequence, 1.0)])
            .unwrap();

        // position 2 scored alone uses the order-0 table
        let alone = model.log_score(&sequence, 2, 3);
        assert!((alone - 0.5f64.ln()).abs() < 1e-12);
        // in context "1" the symbol "1" follows once out of two
        let joint = model.log_score(&sequence, 1, 3) - model.log_score(&sequence, 1, 2);
        assert!((joint - 0.5f64.ln()).abs() < 1e-12);
        assert_eq!(model.conditional_probabilities(&[0]), vec![0.0, 1.0]);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut model = HomogeneousMarkovModel::new(1, 3, 1.0);
        model.initialize_randomly(&mut rng).unwrap();
        let sequence = Sequence::from_ranks(vec![2, 0, 1, 1, 2]);

        let mut gradient = SparseGradient::new();
        model.log_score_and_gradient(&sequence, 1, 5, &mut gradient);
        let dense = gradient.to_dense(model.parameter_count().unwrap());

        let params = model.parameters().unwrap();
        let h = 1e-6;
        for index in 0..params.len() {
            let mut plus = params.clone();
            plus[index] += h;
            let mut minus = params.clone();
            minus[index] -= h;
            let mut a = model.clone();
            a.set_parameters(&plus, 0).unwrap();
            let mut b = model.clone();
            b.set_parameters(&minus, 0).unwrap();
            let numeric =
                (a.log_score(&sequence, 1, 5) - b.log_score(&sequence, 1, 5)) / (2.0 * h);
            assert!((dense[index] - numeric).abs() < 1e-6, "index {index}");
        }
    }

    #[test]
    fn test_prior_gradient_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut model = HomogeneousMarkovModel::new(1, 2, 3.0);
        model.initialize_randomly(&mut rng).unwrap();
        let params = model.parameters().unwrap();
        let mut dense = vec![0.0; params.len()];
        model.add_gradient_of_log_prior_term(&mut dense, 0);

        let h = 1e-6;
        for index in 0..params.len() {
            let mut plus = params.clone();
            plus[index] += h;
            let mut minus = params.clone();
            minus[index] -= h;
            let mut a = model.clone();
            a.set_parameters(&plus, 0).unwrap();
            let mut b = model.clone();
            b.set_parameters(&minus, 0).unwrap();
            let numeric = (a.log_prior_term() - b.log_prior_term()) / (2.0 * h);
            assert!((dense[index] - numeric).abs() < 1e-6, "index {index}");
        }
    }

    #[test]
    fn test_display() {
        let model = HomogeneousMarkovModel::new(1, 4, 1.0);
        insta::assert_snapshot!(model.to_string(), @r"
        Homogeneous(order=1, alphabet=4)
        p0: 0.250 0.250 0.250 0.250
        ");
    }
}
