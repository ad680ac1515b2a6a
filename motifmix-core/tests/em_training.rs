mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use motifmix_core::config::{Algorithm, DiscoveryConfig, EmConfig, Initialization};
use motifmix_core::engine::UntrainedDiscovery;
use motifmix_core::mixture::MixtureModel;
use motifmix_core::scoring::{Component, PositionWeightMatrix};
use motifmix_core::sequence::{Alphabet, DataSet};
use motifmix_core::training::{EmModel, EmTrainer, em_objective, phase_shift_search};
use motifmix_core::types::{HiddenParameterization, MixtureError};

use crate::common::{assert_close, planted_data};

const TATAA: [u8; 5] = [3, 0, 3, 0, 0];

fn discovery_config(starts: usize, seed: u64) -> DiscoveryConfig {
    DiscoveryConfig {
        motif_widths: vec![5],
        em: EmConfig {
            starts,
            seed: Some(seed),
            max_iterations: 100,
            max_phase_shift_rounds: 100,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Fails every other start (in call order) and otherwise converges to the
/// objective given by its call number.
#[derive(Debug, Clone)]
struct AlternatingModel {
    calls: Arc<AtomicUsize>,
    level: f64,
}

impl EmModel for AlternatingModel {
    type Responsibilities = ();

    fn check_data(&self, _: &DataSet) -> Result<(), MixtureError> {
        Ok(())
    }

    fn randomize<R: Rng + ?Sized>(
        &mut self,
        _: &DataSet,
        _: &[f64],
        _: &mut R,
    ) -> Result<(), MixtureError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call % 2 == 0 {
            return Err(MixtureError::Numerical(format!("diverged in call {call}")));
        }
        self.level = call as f64;
        Ok(())
    }

    fn initial_responsibilities<R: Rng + ?Sized>(
        &self,
        _: &DataSet,
        _: &[f64],
        _: Initialization,
        _: &mut R,
    ) -> Result<(), MixtureError> {
        Ok(())
    }

    fn expectation(&self, _: &DataSet, _: &[f64]) -> Result<((), f64), MixtureError> {
        Ok(((), self.level))
    }

    fn maximization(&mut self, _: &DataSet, _: &[f64], _: &()) -> Result<(), MixtureError> {
        Ok(())
    }

    fn log_prior_term(&self) -> f64 {
        0.0
    }
}

/// Every E-step yields a NaN objective.
#[derive(Debug, Clone)]
struct NanModel;

impl EmModel for NanModel {
    type Responsibilities = ();

    fn check_data(&self, _: &DataSet) -> Result<(), MixtureError> {
        Ok(())
    }

    fn randomize<R: Rng + ?Sized>(
        &mut self,
        _: &DataSet,
        _: &[f64],
        _: &mut R,
    ) -> Result<(), MixtureError> {
        Ok(())
    }

    fn initial_responsibilities<R: Rng + ?Sized>(
        &self,
        _: &DataSet,
        _: &[f64],
        _: Initialization,
        _: &mut R,
    ) -> Result<(), MixtureError> {
        Ok(())
    }

    fn expectation(&self, _: &DataSet, _: &[f64]) -> Result<((), f64), MixtureError> {
        Ok(((), f64::NAN))
    }

    fn maximization(&mut self, _: &DataSet, _: &[f64], _: &()) -> Result<(), MixtureError> {
        Ok(())
    }

    fn log_prior_term(&self) -> f64 {
        0.0
    }
}

fn tiny_data() -> DataSet {
    Alphabet::dna().encode_all(&["ACGT", "TGCA"]).unwrap()
}

#[test]
fn discovery_improves_on_the_untrained_model() {
    let (data, _) = planted_data(21, 16, 14, &TATAA, None, |i| i % 4 != 0);
    let discovery = UntrainedDiscovery::with_config(discovery_config(3, 5)).unwrap();
    let untrained = discovery.build_model(&data).unwrap();
    let trained = discovery.train(&data, None).unwrap();

    let report = trained.report().unwrap();
    assert_eq!(report.starts.len(), 3);
    assert_eq!(report.failed_starts(), 0);
    assert!(report.starts.iter().all(|start| start.iterations >= 1));

    let weights = vec![1.0; data.len()];
    let before = em_objective(&untrained, &data, &weights).unwrap();
    let after = em_objective(trained.model().unwrap(), &data, &weights).unwrap();
    assert!(after > before);
    assert_close(after, report.best_objective, 1e-9);
    assert!(
        report
            .starts
            .iter()
            .filter_map(|start| start.objective)
            .all(|objective| objective <= report.best_objective)
    );
}

#[test]
fn phase_shift_search_is_idempotent_after_training() {
    let (data, _) = planted_data(22, 12, 12, &TATAA, None, |_| true);
    let trained = UntrainedDiscovery::with_config(discovery_config(2, 8))
        .unwrap()
        .train(&data, None)
        .unwrap();
    let model = trained.model().unwrap();
    let weights = vec![1.0; data.len()];

    let first = phase_shift_search(model, &data, &weights, 0).unwrap();
    assert_eq!(first.shift, 0);
    let second = phase_shift_search(model, &data, &weights, 0).unwrap();
    assert_eq!(second.shift, 0);
    assert_close(first.objective, second.objective, 1e-12);
}

#[test]
fn parallel_starts_match_sequential_starts() {
    let (data, _) = planted_data(23, 10, 12, &TATAA, None, |i| i % 2 == 0);
    let sequential = discovery_config(4, 13);
    let mut parallel = sequential.clone();
    parallel.em.parallel = true;
    parallel.em.num_threads = Some(3);

    let a = UntrainedDiscovery::with_config(sequential)
        .unwrap()
        .train(&data, None)
        .unwrap();
    let b = UntrainedDiscovery::with_config(parallel)
        .unwrap()
        .train(&data, None)
        .unwrap();
    assert_eq!(a.report(), b.report());
    assert_eq!(
        a.model().unwrap().current_parameter_values().unwrap(),
        b.model().unwrap().current_parameter_values().unwrap()
    );
}

#[test]
fn weighted_training_accepts_zero_weights() {
    let (data, offsets) = planted_data(24, 10, 12, &TATAA, None, |i| i < 6);
    let weights: Vec<f64> = offsets
        .iter()
        .map(|offset| if offset.is_some() { 1.0 } else { 0.0 })
        .collect();
    let trained = UntrainedDiscovery::with_config(discovery_config(2, 3))
        .unwrap()
        .train(&data, Some(&weights))
        .unwrap();
    assert!(trained.report().unwrap().best_objective.is_finite());

    let error = UntrainedDiscovery::with_config(discovery_config(2, 3))
        .unwrap()
        .train(&data, Some(&weights[..4]))
        .unwrap_err();
    assert!(matches!(error, MixtureError::LengthMismatch { .. }));
}

#[test]
fn invalid_weights_are_rejected_before_any_start() {
    let (data, _) = planted_data(25, 6, 12, &TATAA, None, |_| true);
    let trainer = EmTrainer::new(EmConfig {
        starts: 2,
        seed: Some(4),
        ..Default::default()
    })
    .unwrap();
    let discovery = UntrainedDiscovery::with_config(discovery_config(2, 4)).unwrap();
    let untrained = discovery.build_model(&data).unwrap();

    let mut negative = vec![1.0; data.len()];
    negative[2] = -0.5;
    let mut not_a_number = vec![1.0; data.len()];
    not_a_number[0] = f64::NAN;
    for weights in [negative, not_a_number, vec![0.0; data.len()]] {
        let mut model = untrained.clone();
        let error = trainer.train(&mut model, &data, Some(&weights)).unwrap_err();
        assert!(matches!(error, MixtureError::InvalidWeights(_)));
        assert_eq!(
            model.current_parameter_values().unwrap(),
            untrained.current_parameter_values().unwrap()
        );
    }
}

#[test]
fn gibbs_sampling_is_rejected_before_training() {
    let mut config = discovery_config(1, 1);
    config.em.algorithm = Algorithm::GibbsSampling;
    let error = UntrainedDiscovery::with_config(config)
        .unwrap()
        .train(&tiny_data(), None)
        .unwrap_err();
    assert!(matches!(error, MixtureError::Unsupported(_)));
}

#[test]
fn failed_starts_are_reported_and_skipped() {
    let trainer = EmTrainer::new(EmConfig {
        starts: 4,
        seed: Some(0),
        ..Default::default()
    })
    .unwrap();
    let mut model = AlternatingModel {
        calls: Arc::new(AtomicUsize::new(0)),
        level: f64::NEG_INFINITY,
    };

    let report = trainer.train(&mut model, &tiny_data(), None).unwrap();
    assert_eq!(report.failed_starts(), 2);
    assert_eq!(report.best_start, 3);
    assert_close(report.best_objective, 3.0, 0.0);
    assert_close(model.level, 3.0, 0.0);
    assert!(report.starts[0].error.as_deref().unwrap().contains("call 0"));
    assert_eq!(report.starts[1].objective, Some(1.0));
}

#[test]
fn all_failed_starts_surface_the_last_error() {
    let trainer = EmTrainer::new(EmConfig {
        starts: 3,
        seed: Some(0),
        ..Default::default()
    })
    .unwrap();
    match trainer.train(&mut NanModel, &tiny_data(), None) {
        Err(MixtureError::AllStartsFailed { starts, last }) => {
            assert_eq!(starts, 3);
            assert!(matches!(*last, MixtureError::Numerical(_)));
        }
        other => panic!("expected every start to fail, got {other:?}"),
    }
}

#[test]
fn mixture_em_separates_two_populations() {
    let data = Alphabet::dna()
        .encode_all(&[
            "AAAC", "AAAA", "CAAA", "AACA", "AAAA", "ACAA", "TTTG", "TTTT", "GTTT", "TTGT",
            "TTTT", "TGTT",
        ])
        .unwrap();
    let mut mixture = MixtureModel::new(
        vec![
            Component::from(PositionWeightMatrix::new(4, 4, 1.0)),
            Component::from(PositionWeightMatrix::new(4, 4, 1.0)),
        ],
        HiddenParameterization::Free,
    )
    .unwrap();
    let trainer = EmTrainer::new(EmConfig {
        starts: 5,
        seed: Some(31),
        initialization: Initialization::dirichlet(),
        ..Default::default()
    })
    .unwrap();
    trainer.train(&mut mixture, &data, None).unwrap();

    let dna = Alphabet::dna();
    let a = mixture
        .index_of_maximal_component(&dna.encode(b"AAAA").unwrap(), 0)
        .unwrap();
    let t = mixture
        .index_of_maximal_component(&dna.encode(b"TTTT").unwrap(), 0)
        .unwrap();
    assert_ne!(a, t);
}
