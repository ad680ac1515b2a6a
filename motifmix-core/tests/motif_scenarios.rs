mod common;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use motifmix_core::config::{DurationKind, OccurrenceMode};
use motifmix_core::duration::{DurationModel, DurationPrior, GaussianDuration, UniformDuration};
use motifmix_core::math::log_sum_exp;
use motifmix_core::motif::{MotifOccurrenceModel, MotifSlot, OccurrenceResponsibilities};
use motifmix_core::scoring::{
    Component, HomogeneousMarkovModel, PositionWeightMatrix, SequenceScore,
};
use motifmix_core::sequence::Sequence;
use motifmix_core::training::EmModel;
use motifmix_core::types::{HiddenParameterization, ProfileKind};

use crate::common::{assert_close, planted_data};

fn single_motif_model(
    width: usize,
    length: usize,
    order: usize,
    mode: OccurrenceMode,
    ess: f64,
) -> MotifOccurrenceModel {
    MotifOccurrenceModel::new(
        vec![MotifSlot::new(
            Component::from(PositionWeightMatrix::new(width, 4, ess)),
            UniformDuration::new(0, length - width).unwrap(),
        )],
        HomogeneousMarkovModel::new(order, 4, 1.0),
        mode,
        length,
        HiddenParameterization::Free,
    )
    .unwrap()
}

#[test]
fn planted_motif_is_recovered_by_one_m_step() {
    let motif = [0u8, 1, 2];
    let (data, _) = planted_data(3, 5, 6, &motif, Some(2), |_| true);
    let mut model = single_motif_model(3, 6, 0, OccurrenceMode::Sometimes, 0.4);

    let weights = vec![1.0; data.len()];
    let responsibilities: Vec<_> = (0..data.len())
        .map(|_| OccurrenceResponsibilities::new(vec![vec![0.0, 0.0, 1.0, 0.0]], 0.0))
        .collect();
    model
        .maximization(&data, &weights, &responsibilities)
        .unwrap();

    let Component::Pwm(pwm) = model.slots()[0].motif() else {
        panic!("motif slot does not hold a PWM");
    };
    assert_eq!(pwm.consensus(), motif.to_vec());
    for (position, &symbol) in motif.iter().enumerate() {
        assert!(pwm.column_probabilities(position)[usize::from(symbol)] > 0.9);
    }

    // TTACGT: the planted word sits at offset 2
    let sequence = Sequence::from_ranks(vec![3, 3, 0, 1, 2, 3]);
    let profile = model
        .profile(0, &sequence, 0, ProfileKind::NormalizedConditional)
        .unwrap();
    let best = profile
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(offset, _)| offset);
    assert_eq!(best, Some(2));
}

#[test]
fn always_mode_scores_motif_slots_only() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut model = single_motif_model(3, 8, 1, OccurrenceMode::Always, 2.0);
    model.initialize_randomly(&mut rng).unwrap();
    assert_eq!(model.core().components(), 1);

    let sequence = Sequence::from_ranks(vec![2, 0, 1, 3, 3, 0, 2, 1]);
    let mut scratch = model.new_scratch();
    model
        .fill_component_score_of(0, &sequence, 0, &mut scratch)
        .unwrap();
    let expected =
        model.background().log_score(&sequence, 0, 8) + log_sum_exp(scratch.offset_scores(0));
    assert_close(model.score(&sequence, 0).unwrap(), expected, 1e-10);
}

#[test]
fn sometimes_mode_approaches_background_as_motif_mass_vanishes() {
    let mut rng = StdRng::seed_from_u64(12);
    let mut model = single_motif_model(3, 8, 1, OccurrenceMode::Sometimes, 2.0);
    model.initialize_randomly(&mut rng).unwrap();

    let sequence = Sequence::from_ranks(vec![1, 1, 0, 2, 3, 0, 2, 2]);
    let background = model.background().log_score(&sequence, 0, 8);

    let mut previous = f64::INFINITY;
    for potential in [-2.0, -10.0, -40.0] {
        model.set_hidden_parameters(&[potential, 0.0]).unwrap();
        let gap = (model.score(&sequence, 0).unwrap() - background).abs();
        assert!(gap < previous);
        previous = gap;
    }
    assert!(previous < 1e-9);
}

#[test]
fn resize_round_trip_keeps_scores() {
    let mut rng = StdRng::seed_from_u64(13);
    let mut model = single_motif_model(3, 7, 0, OccurrenceMode::Sometimes, 2.0);
    model.initialize_randomly(&mut rng).unwrap();
    let hidden = model.core().hidden().to_vec();
    let parameters = model.number_of_parameters();

    assert!(model.modify_motif(0, 1, 0).unwrap());
    assert_eq!(model.motif_width(0).unwrap(), 2);
    assert_eq!(model.number_of_parameters(), parameters.map(|n| n - 3));

    assert!(model.modify_motif(0, -1, 0).unwrap());
    assert_eq!(model.motif_width(0).unwrap(), 3);
    assert_eq!(model.number_of_parameters(), parameters);
    for (after, before) in model.core().hidden().iter().zip(&hidden) {
        assert_close(*after, *before, 1e-12);
    }
    let sequence = Sequence::from_ranks(vec![0, 1, 2, 3, 0, 1, 2]);
    assert!(model.score(&sequence, 0).unwrap().is_finite());
}

#[test]
fn longer_sequences_are_scored_from_any_start() {
    let mut rng = StdRng::seed_from_u64(14);
    let mut model = single_motif_model(2, 5, 1, OccurrenceMode::Sometimes, 2.0);
    model.initialize_randomly(&mut rng).unwrap();

    let long = Sequence::from_ranks(vec![3, 0, 1, 2, 2, 1, 0, 3, 3]);
    for start in 0..=4 {
        let window = long.subsequence(start, start + 5).unwrap();
        assert_close(
            model.score(&long, start).unwrap(),
            model.score(&window, 0).unwrap(),
            1e-10,
        );
    }
}

const BINARY_LENGTH: usize = 6;

/// Binary motif model of window length 6 with every parameter drawn at
/// random, so the background contexts and the position prior are uneven.
fn random_binary_model(
    order: usize,
    mode: OccurrenceMode,
    normalized: bool,
    duration: DurationKind,
    seed: u64,
) -> MotifOccurrenceModel {
    let width = 3;
    let max = BINARY_LENGTH - width;
    let duration: DurationModel = match duration {
        DurationKind::Uniform => UniformDuration::new(0, max).unwrap().into(),
        DurationKind::Gaussian => GaussianDuration::new(0, max, 2.0).unwrap().into(),
    };
    let mut model = MotifOccurrenceModel::new(
        vec![MotifSlot::new(
            Component::from(PositionWeightMatrix::new(width, 2, 2.0).with_normalization(normalized)),
            duration,
        )],
        HomogeneousMarkovModel::new(order, 2, 1.0),
        mode,
        BINARY_LENGTH,
        HiddenParameterization::Free,
    )
    .unwrap();

    let mut rng = StdRng::seed_from_u64(seed);
    let count = model.number_of_parameters().unwrap();
    let params: Vec<f64> = (0..count).map(|_| rng.gen_range(-1.5..1.5)).collect();
    model.set_parameters(&params, 0).unwrap();
    model
}

/// Log of the summed score mass over every binary sequence of the window
/// length.
fn log_enumerated_mass(model: &MotifOccurrenceModel) -> f64 {
    let scores: Vec<f64> = (0..1u32 << BINARY_LENGTH)
        .map(|code| {
            let ranks = (0..BINARY_LENGTH)
                .map(|bit| ((code >> bit) & 1) as u8)
                .collect();
            model.score(&Sequence::from_ranks(ranks), 0).unwrap()
        })
        .collect();
    log_sum_exp(&scores)
}

#[test]
fn score_mass_over_all_sequences_matches_normalization_constant() {
    let mut seed = 100;
    for order in 0..=2 {
        for mode in [OccurrenceMode::Always, OccurrenceMode::Sometimes] {
            for normalized in [true, false] {
                for duration in [DurationKind::Uniform, DurationKind::Gaussian] {
                    seed += 1;
                    let model = random_binary_model(order, mode, normalized, duration, seed);
                    let log_norm = model.log_normalization_constant();
                    assert_eq!(model.is_normalized(), normalized);
                    if normalized {
                        assert_close(log_norm, 0.0, 1e-12);
                    }
                    assert!(
                        (log_enumerated_mass(&model) - log_norm).abs() < 1e-10,
                        "order {order}, {mode:?}, normalized {normalized}, {duration:?}"
                    );
                }
            }
        }
    }
}

#[test]
fn score_mass_matches_normalization_constant_after_resize() {
    let mut model = random_binary_model(
        2,
        OccurrenceMode::Sometimes,
        false,
        DurationKind::Gaussian,
        7,
    );
    assert!(model.modify_motif(0, 1, 0).unwrap());
    assert_eq!(model.motif_width(0).unwrap(), 2);
    assert_eq!(model.slots()[0].duration().max(), BINARY_LENGTH - 2);
    assert_close(
        log_enumerated_mass(&model),
        model.log_normalization_constant(),
        1e-10,
    );

    assert!(model.modify_motif(0, 0, 2).unwrap());
    assert_eq!(model.motif_width(0).unwrap(), 4);
    assert_close(
        log_enumerated_mass(&model),
        model.log_normalization_constant(),
        1e-10,
    );
}
