//! Multi-start expectation maximization with phase-shift correction.
//!
//! ## Overview
//!
//! Every independent start runs through the same stages:
//!
//! 1. **Initialization**: first responsibilities from the model's prior, a
//!    Dirichlet draw, or uniform placement over every offset
//! 2. **EM**: alternating M-steps (component re-estimation plus the closed
//!    form hidden update) and E-steps until the stopping predicate ends the
//!    run
//! 3. **Phase-shift correction**: every motif slot is re-estimated from
//!    circularly shifted responsibilities on a disposable copy; an improving
//!    shift is adopted and EM resumes, until no slot wants to move
//!
//! The start with the best objective (log likelihood plus log prior) is
//! kept. Starts may run on worker threads, each on its own clone of the
//! model; a start that fails numerically is logged and skipped.
//!
//! ## Examples
//!
//! ```rust
//! use motifmix_core::config::{EmConfig, Initialization};
//! use motifmix_core::mixture::MixtureModel;
//! use motifmix_core::scoring::{Component, PositionWeightMatrix};
//! use motifmix_core::sequence::Alphabet;
//! use motifmix_core::training::EmTrainer;
//! use motifmix_core::types::HiddenParameterization;
//!
//! let data = Alphabet::dna().encode_all(&["AAAA", "AAAT", "TTTT", "TTTA"])?;
//! let mut mixture = MixtureModel::new(
//!     vec![
//!         Component::from(PositionWeightMatrix::new(4, 4, 1.0)),
//!         Component::from(PositionWeightMatrix::new(4, 4, 1.0)),
//!     ],
//!     HiddenParameterization::Free,
//! )?;
//!
//! let trainer = EmTrainer::new(EmConfig {
//!     starts: 2,
//!     seed: Some(3),
//!     initialization: Initialization::dirichlet(),
//!     ..Default::default()
//! })?;
//! let report = trainer.train(&mut mixture, &data, None)?;
//! assert_eq!(report.starts.len(), 2);
//! # Ok::<(), motifmix_core::types::MixtureError>(())
//! ```

pub mod termination;

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::{Algorithm, EmConfig, Initialization};
use crate::constants::PHASE_SHIFT_TOLERANCE;
use crate::results::{StartSummary, TrainingReport};
use crate::sequence::{DataSet, resolve_weights};
use crate::types::MixtureError;

pub use termination::{
    Cancellation, Combination, CombinedCondition, IterationContext, MaxIterations,
    SmallDifference, StoppingPredicate, TimeLimit,
};

/// A model that can be trained by [`EmTrainer`].
///
/// Responsibilities are produced by the E-step already multiplied by the
/// sequence weights and consumed unchanged by the M-step.
pub trait EmModel: Clone + Send {
    type Responsibilities: Clone + Send;

    /// # Errors
    ///
    /// Returns an error if the data cannot be scored by the model.
    fn check_data(&self, data: &DataSet) -> Result<(), MixtureError>;

    /// Draws a fresh parameter set for a start using the model's priors.
    ///
    /// # Errors
    ///
    /// Propagates sampling and estimation errors.
    fn randomize<R: Rng + ?Sized>(
        &mut self,
        data: &DataSet,
        weights: &[f64],
        rng: &mut R,
    ) -> Result<(), MixtureError>;

    /// # Errors
    ///
    /// Propagates sampling errors.
    fn initial_responsibilities<R: Rng + ?Sized>(
        &self,
        data: &DataSet,
        weights: &[f64],
        initialization: Initialization,
        rng: &mut R,
    ) -> Result<Self::Responsibilities, MixtureError>;

    /// Posterior responsibilities and the weighted log likelihood.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be scored.
    fn expectation(
        &self,
        data: &DataSet,
        weights: &[f64],
    ) -> Result<(Self::Responsibilities, f64), MixtureError>;

    /// # Errors
    ///
    /// Propagates estimation errors; a failed M-step aborts the start.
    fn maximization(
        &mut self,
        data: &DataSet,
        weights: &[f64],
        responsibilities: &Self::Responsibilities,
    ) -> Result<(), MixtureError>;

    fn log_prior_term(&self) -> f64;

    /// Number of slots whose placement can be phase-shifted.
    fn phase_shift_slots(&self) -> usize {
        0
    }

    /// Largest shift tried for `slot` in either direction.
    fn max_phase_shift(&self, _slot: usize) -> usize {
        0
    }

    /// Responsibilities with `slot`'s placement moved by `shift` positions.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::MotifIndexOutOfBounds`] for an unknown slot.
    fn shift_responsibilities(
        &self,
        responsibilities: &Self::Responsibilities,
        _slot: usize,
        _shift: isize,
    ) -> Result<Self::Responsibilities, MixtureError> {
        Ok(responsibilities.clone())
    }
}

/// Best shift found by [`phase_shift_search`] together with the model
/// re-estimated under it.
#[derive(Debug, Clone)]
pub struct PhaseShift<M> {
    pub slot: usize,
    pub shift: isize,
    pub objective: f64,
    pub model: M,
}

/// Log likelihood plus log prior of `model` on the data.
///
/// # Errors
///
/// Returns [`MixtureError::Numerical`] for a NaN objective and propagates
/// E-step errors.
pub fn em_objective<M: EmModel>(
    model: &M,
    data: &DataSet,
    weights: &[f64],
) -> Result<f64, MixtureError> {
    let (_, log_likelihood) = model.expectation(data, weights)?;
    let objective = log_likelihood + model.log_prior_term();
    if objective.is_nan() {
        return Err(MixtureError::Numerical("EM objective is NaN".to_string()));
    }
    Ok(objective)
}

/// Tries every shift of `slot` within half the motif width on disposable
/// copies and returns the best one.
///
/// Shift 0 is evaluated first and a non-zero shift only wins by a relative
/// margin of [`PHASE_SHIFT_TOLERANCE`], so a model already at its best phase
/// reports shift 0 again.
///
/// # Errors
///
/// Returns [`MixtureError::MotifIndexOutOfBounds`] for an unknown slot,
/// data-validation errors of the model, and propagates EM errors.
pub fn phase_shift_search<M: EmModel>(
    model: &M,
    data: &DataSet,
    weights: &[f64],
    slot: usize,
) -> Result<PhaseShift<M>, MixtureError> {
    if slot >= model.phase_shift_slots() {
        return Err(MixtureError::MotifIndexOutOfBounds {
            index: slot,
            motifs: model.phase_shift_slots(),
        });
    }
    model.check_data(data)?;
    let (responsibilities, _) = model.expectation(data, weights)?;
    let max = model.max_phase_shift(slot) as isize;
    let shifts = std::iter::once(0).chain((1..=max).flat_map(|shift| [-shift, shift]));

    let mut best: Option<PhaseShift<M>> = None;
    for shift in shifts {
        let shifted = model.shift_responsibilities(&responsibilities, slot, shift)?;
        let mut candidate = model.clone();
        candidate.maximization(data, weights, &shifted)?;
        let objective = em_objective(&candidate, data, weights)?;
        let improves = best.as_ref().map_or(true, |current| {
            objective > current.objective + PHASE_SHIFT_TOLERANCE * current.objective.abs().max(1.0)
        });
        if improves {
            best = Some(PhaseShift {
                slot,
                shift,
                objective,
                model: candidate,
            });
        }
    }
    best.ok_or_else(|| MixtureError::Numerical("no phase shift was evaluated".to_string()))
}

/// Multi-start EM driver.
#[derive(Debug, Clone)]
pub struct EmTrainer {
    config: EmConfig,
    stopping: Arc<dyn StoppingPredicate>,
}

type StartResult<M> = (usize, u64, Result<StartOutcome<M>, MixtureError>);

struct StartOutcome<M> {
    model: M,
    objective: f64,
    iterations: usize,
    phase_shifts: usize,
}

impl EmTrainer {
    /// Builds a trainer that stops a run on the configured iteration cap or
    /// once the objective improves by less than `epsilon`.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] for invalid settings and
    /// [`MixtureError::Unsupported`] for [`Algorithm::GibbsSampling`].
    pub fn new(config: EmConfig) -> Result<Self, MixtureError> {
        config.validate()?;
        if config.algorithm == Algorithm::GibbsSampling {
            return Err(MixtureError::Unsupported(
                "Gibbs sampling is not implemented, use expectation maximization".to_string(),
            ));
        }
        let stopping = Arc::new(CombinedCondition::any(vec![
            Arc::new(MaxIterations(config.max_iterations)),
            Arc::new(SmallDifference(config.epsilon)),
        ]));
        Ok(Self { config, stopping })
    }

    /// Replaces the convergence test; the configured iteration cap still
    /// applies.
    #[must_use]
    pub fn with_stopping(mut self, stopping: Arc<dyn StoppingPredicate>) -> Self {
        self.stopping = Arc::new(CombinedCondition::any(vec![
            Arc::new(MaxIterations(self.config.max_iterations)),
            stopping,
        ]));
        self
    }

    pub fn config(&self) -> &EmConfig {
        &self.config
    }

    /// Trains `model` in place with every configured start and keeps the
    /// best one.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] for empty data,
    /// [`MixtureError::LengthMismatch`] for a wrongly sized weight vector,
    /// [`MixtureError::InvalidWeights`] for negative, non-finite or all-zero
    /// weights, data-validation errors of the model, and
    /// [`MixtureError::AllStartsFailed`] if no start succeeded; `model` is
    /// left unchanged on error.
    pub fn train<M: EmModel>(
        &self,
        model: &mut M,
        data: &DataSet,
        weights: Option<&[f64]>,
    ) -> Result<TrainingReport, MixtureError> {
        if data.is_empty() {
            return Err(MixtureError::Configuration(
                "cannot train on an empty data set".to_string(),
            ));
        }
        let weights = resolve_weights(data, weights)?;
        model.check_data(data)?;

        let starts = self.config.starts;
        let base_seed = self.config.seed.unwrap_or_else(rand::random);
        log::info!(
            "Training on {} sequences with {starts} EM start(s), seed {base_seed}",
            data.len()
        );

        let outcomes: Vec<StartResult<M>> =
            if self.config.parallel && starts > 1 {
                let templates: Vec<M> = (0..starts).map(|_| model.clone()).collect();
                let run = || -> Vec<StartResult<M>> {
                    templates
                        .into_par_iter()
                        .enumerate()
                        .map(|(index, template)| {
                            let seed = base_seed.wrapping_add(index as u64);
                            (index, seed, self.run_start(template, data, &weights, index, seed))
                        })
                        .collect()
                };
                match self.config.num_threads {
                    Some(num_threads) => rayon::ThreadPoolBuilder::new()
                        .num_threads(num_threads)
                        .build()
                        .map_err(|e| {
                            MixtureError::Configuration(format!(
                                "Failed to configure thread pool: {e}"
                            ))
                        })?
                        .install(run),
                    None => run(),
                }
            } else {
                (0..starts)
                    .map(|index| {
                        let seed = base_seed.wrapping_add(index as u64);
                        (index, seed, self.run_start(model.clone(), data, &weights, index, seed))
                    })
                    .collect()
            };

        let mut summaries = Vec::with_capacity(starts);
        let mut best: Option<(usize, f64, M)> = None;
        let mut last_error = None;
        for (index, seed, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    summaries.push(StartSummary {
                        index,
                        seed,
                        objective: Some(outcome.objective),
                        iterations: outcome.iterations,
                        phase_shifts: outcome.phase_shifts,
                        error: None,
                    });
                    if best
                        .as_ref()
                        .map_or(true, |(_, objective, _)| outcome.objective > *objective)
                    {
                        best = Some((index, outcome.objective, outcome.model));
                    }
                }
                Err(error) => {
                    log::warn!("EM start {index} (seed {seed}) failed: {error}");
                    summaries.push(StartSummary {
                        index,
                        seed,
                        objective: None,
                        iterations: 0,
                        phase_shifts: 0,
                        error: Some(error.to_string()),
                    });
                    last_error = Some(error);
                }
            }
        }

        let Some((best_start, best_objective, trained)) = best else {
            let last = last_error.unwrap_or_else(|| {
                MixtureError::Numerical("no EM start was run".to_string())
            });
            return Err(MixtureError::AllStartsFailed {
                starts,
                last: Box::new(last),
            });
        };
        *model = trained;
        log::info!("Kept EM start {best_start} with objective {best_objective:.6}");

        Ok(TrainingReport {
            starts: summaries,
            best_start,
            best_objective,
        })
    }

    fn run_start<M: EmModel>(
        &self,
        mut model: M,
        data: &DataSet,
        weights: &[f64],
        index: usize,
        seed: u64,
    ) -> Result<StartOutcome<M>, MixtureError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let initialization = self.config.initialization;
        if initialization == Initialization::Prior {
            model.randomize(data, weights, &mut rng)?;
        }
        let responsibilities =
            model.initial_responsibilities(data, weights, initialization, &mut rng)?;
        let (mut objective, mut iterations) =
            self.run_em(&mut model, data, weights, responsibilities)?;
        log::debug!("EM start {index} converged after {iterations} iterations: {objective:.6}");

        let mut phase_shifts = 0;
        if self.config.correct_phase_shift && model.phase_shift_slots() > 0 {
            for round in 0..self.config.max_phase_shift_rounds {
                let mut shifted = false;
                for slot in 0..model.phase_shift_slots() {
                    let best = phase_shift_search(&model, data, weights, slot)?;
                    if best.shift != 0 {
                        log::debug!(
                            "EM start {index}, round {round}: shifting slot {slot} by {} ({objective:.6} -> {:.6})",
                            best.shift,
                            best.objective
                        );
                        model = best.model;
                        phase_shifts += 1;
                        shifted = true;
                    }
                }
                if !shifted {
                    break;
                }
                let (responsibilities, _) = model.expectation(data, weights)?;
                let (next, more) = self.run_em(&mut model, data, weights, responsibilities)?;
                objective = next;
                iterations += more;
            }
        }

        Ok(StartOutcome {
            model,
            objective,
            iterations,
            phase_shifts,
        })
    }

    /// Alternates M- and E-steps until the stopping predicate ends the run;
    /// returns the final objective and the number of iterations.
    fn run_em<M: EmModel>(
        &self,
        model: &mut M,
        data: &DataSet,
        weights: &[f64],
        mut responsibilities: M::Responsibilities,
    ) -> Result<(f64, usize), MixtureError> {
        let started = Instant::now();
        let mut previous = f64::NEG_INFINITY;
        let mut iteration = 0;
        loop {
            model.maximization(data, weights, &responsibilities)?;
            let (next, log_likelihood) = model.expectation(data, weights)?;
            let current = log_likelihood + model.log_prior_term();
            iteration += 1;
            if current.is_nan() {
                return Err(MixtureError::Numerical(format!(
                    "EM objective became NaN in iteration {iteration}"
                )));
            }
            responsibilities = next;
            log::trace!("EM iteration {iteration}: {current:.6}");

            let context = IterationContext::new(iteration, previous, current, started.elapsed());
            if !self.stopping.should_continue(&context) {
                return Ok((current, iteration));
            }
            previous = current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixture::MixtureModel;
    use crate::scoring::{Component, PositionWeightMatrix};
    use crate::sequence::Sequence;
    use crate::types::HiddenParameterization;

    fn two_population_data() -> DataSet {
        let mut sequences = Vec::new();
        for i in 0..6 {
            sequences.push(Sequence::from_ranks(vec![0, 0, 1, (i % 2) as u8]));
            sequences.push(Sequence::from_ranks(vec![3, 3, 2, (i % 2) as u8 + 2]));
        }
        DataSet::new(4, sequences).unwrap()
    }

    fn mixture() -> MixtureModel {
        MixtureModel::new(
            vec![
                Component::from(PositionWeightMatrix::new(4, 4, 1.0)),
                Component::from(PositionWeightMatrix::new(4, 4, 1.0)),
            ],
            HiddenParameterization::Free,
        )
        .unwrap()
    }

    #[test]
    fn test_gibbs_sampling_fails_fast() {
        let config = EmConfig {
            algorithm: Algorithm::GibbsSampling,
            ..Default::default()
        };
        assert!(matches!(
            EmTrainer::new(config),
            Err(MixtureError::Unsupported(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EmConfig {
            starts: 0,
            ..Default::default()
        };
        assert!(matches!(
            EmTrainer::new(config),
            Err(MixtureError::Configuration(_))
        ));
    }

    #[test]
    fn test_em_improves_objective() {
        let data = two_population_data();
        let weights = vec![1.0; data.len()];
        let mut model = mixture();
        let mut rng = StdRng::seed_from_u64(1);
        let responsibilities = model
            .initial_responsibilities(&data, &weights, Initialization::dirichlet(), &mut rng)
            .unwrap();
        model.maximization(&data, &weights, &responsibilities).unwrap();
        let before = em_objective(&model, &data, &weights).unwrap();

        let trainer = EmTrainer::new(EmConfig::default()).unwrap();
        let (responsibilities, _) = model.expectation(&data, &weights).unwrap();
        let (after, iterations) = trainer
            .run_em(&mut model, &data, &weights, responsibilities)
            .unwrap();
        assert!(iterations >= 1);
        assert!(after >= before - 1e-9);
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let data = two_population_data();
        let config = EmConfig {
            starts: 2,
            seed: Some(17),
            ..Default::default()
        };
        let trainer = EmTrainer::new(config).unwrap();

        let mut first = mixture();
        let a = trainer.train(&mut first, &data, None).unwrap();
        let mut second = mixture();
        let b = trainer.train(&mut second, &data, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            first.current_parameter_values().unwrap(),
            second.current_parameter_values().unwrap()
        );
    }

    #[test]
    fn test_parallel_starts_match_sequential() {
        let data = two_population_data();
        let sequential = EmTrainer::new(EmConfig {
            starts: 3,
            seed: Some(5),
            ..Default::default()
        })
        .unwrap();
        let parallel = EmTrainer::new(EmConfig {
            starts: 3,
            seed: Some(5),
            parallel: true,
            num_threads: Some(2),
            ..Default::default()
        })
        .unwrap();

        let mut a = mixture();
        let mut b = mixture();
        let report_a = sequential.train(&mut a, &data, None).unwrap();
        let report_b = parallel.train(&mut b, &data, None).unwrap();
        assert_eq!(report_a, report_b);
    }

    #[test]
    fn test_weight_length_mismatch() {
        let data = two_population_data();
        let trainer = EmTrainer::new(EmConfig::default()).unwrap();
        let mut model = mixture();
        assert!(matches!(
            trainer.train(&mut model, &data, Some(&[1.0, 2.0])),
            Err(MixtureError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_phase_shift_requires_slots() {
        let data = two_population_data();
        let weights = vec![1.0; data.len()];
        assert!(matches!(
            phase_shift_search(&mixture(), &data, &weights, 0),
            Err(MixtureError::MotifIndexOutOfBounds { index: 0, motifs: 0 })
        ));
    }

    #[test]
    fn test_cancelled_run_stops_after_first_iteration() {
        let data = two_population_data();
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let trainer = EmTrainer::new(EmConfig {
            starts: 1,
            seed: Some(2),
            ..Default::default()
        })
        .unwrap()
        .with_stopping(Arc::new(cancellation));
        let mut model = mixture();
        let report = trainer.train(&mut model, &data, None).unwrap();
        assert_eq!(report.starts[0].iterations, 1);
    }
}
