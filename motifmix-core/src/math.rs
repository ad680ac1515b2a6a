use rand::Rng;
use rand_distr::{Distribution, Gamma};

use crate::types::MixtureError;

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Numerically stable `log(exp(a) + exp(b))`.
pub fn log_sum_exp_pair(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == f64::NEG_INFINITY || max == f64::INFINITY {
        return max;
    }
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Numerically stable `log(sum(exp(values)))`.
///
/// An empty or all negative-infinity input yields negative infinity.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY || max == f64::INFINITY {
        return max;
    }
    let sum: f64 = values.iter().map(|value| (value - max).exp()).sum();
    max + sum.ln()
}

/// Turns log values into probabilities in place and returns their log-sum.
///
/// If every value is negative infinity the slice is filled with zeros.
pub fn log_sum_normalize(values: &mut [f64]) -> f64 {
    let total = log_sum_exp(values);
    if total == f64::NEG_INFINITY {
        values.fill(0.0);
        return total;
    }
    for value in values.iter_mut() {
        *value = (*value - total).exp();
    }
    total
}

/// Natural logarithm of the gamma function for positive arguments.
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // reflection
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + LANCZOS_G + 0.5;
    let mut series = LANCZOS_COEFFICIENTS[0];
    for (i, coefficient) in LANCZOS_COEFFICIENTS.iter().enumerate().skip(1) {
        series += coefficient / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

/// `ln Γ(Σ α) - Σ ln Γ(α)`, the log normalizer of a Dirichlet density.
///
/// Returns 0 when any hyperparameter is not strictly positive.
pub fn dirichlet_log_normalizer(alpha: &[f64]) -> f64 {
    if alpha.is_empty() || alpha.iter().any(|&a| a <= 0.0) {
        return 0.0;
    }
    let total: f64 = alpha.iter().sum();
    ln_gamma(total) - alpha.iter().map(|&a| ln_gamma(a)).sum::<f64>()
}

/// Draws one point of the probability simplex from `Dirichlet(alpha)`.
///
/// # Errors
///
/// Returns [`MixtureError::Configuration`] if any concentration parameter is
/// not strictly positive.
pub fn sample_dirichlet<R: Rng + ?Sized>(
    alpha: &[f64],
    rng: &mut R,
) -> Result<Vec<f64>, MixtureError> {
    let mut draws = Vec::with_capacity(alpha.len());
    for (index, &concentration) in alpha.iter().enumerate() {
        let gamma = Gamma::new(concentration, 1.0).map_err(|e| {
            MixtureError::Configuration(format!(
                "Dirichlet parameter {index} must be positive, got {concentration}: {e}"
            ))
        })?;
        draws.push(gamma.sample(rng));
    }

    let total: f64 = draws.iter().sum();
    if total > 0.0 && total.is_finite() {
        draws.iter_mut().for_each(|draw| *draw /= total);
    } else {
        // every draw underflowed
        let uniform = 1.0 / alpha.len() as f64;
        draws.fill(uniform);
    }
    Ok(draws)
}
