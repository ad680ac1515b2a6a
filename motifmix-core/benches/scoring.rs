use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use motifmix_core::config::OccurrenceMode;
use motifmix_core::duration::UniformDuration;
use motifmix_core::motif::{MotifOccurrenceModel, MotifSlot};
use motifmix_core::scoring::{Component, HomogeneousMarkovModel, PositionWeightMatrix};
use motifmix_core::sequence::Sequence;
use motifmix_core::types::{HiddenParameterization, SparseGradient};

mod criterion_config;
use criterion_config::configure_criterion;

const WIDTH: usize = 8;

fn random_sequence(rng: &mut StdRng, length: usize) -> Sequence {
    Sequence::from_ranks((0..length).map(|_| rng.gen_range(0..4u8)).collect())
}

fn occurrence_model(rng: &mut StdRng, length: usize, order: usize) -> MotifOccurrenceModel {
    let slot = MotifSlot::new(
        Component::from(PositionWeightMatrix::new(WIDTH, 4, 4.0)),
        UniformDuration::new(0, length - WIDTH).unwrap(),
    );
    let mut model = MotifOccurrenceModel::new(
        vec![slot],
        HomogeneousMarkovModel::new(order, 4, 4.0),
        OccurrenceMode::Sometimes,
        length,
        HiddenParameterization::Free,
    )
    .unwrap();
    model.initialize_randomly(rng).unwrap();
    model
}

fn benchmark_window_scoring(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let mut group = c.benchmark_group("occurrence_score");

    for length in [50, 200, 1000] {
        let model = occurrence_model(&mut rng, length, 2);
        let sequence = random_sequence(&mut rng, length);
        let mut scratch = model.new_scratch();
        group.throughput(Throughput::Elements(length as u64));

        group.bench_with_input(BenchmarkId::new("score", length), &length, |b, _| {
            b.iter(|| {
                model
                    .score_with(black_box(&sequence), 0, &mut scratch)
                    .unwrap()
            });
        });

        let mut gradient = SparseGradient::new();
        group.bench_with_input(
            BenchmarkId::new("score_and_gradient", length),
            &length,
            |b, _| {
                b.iter(|| {
                    gradient.clear();
                    model
                        .score_and_gradient_with(black_box(&sequence), 0, &mut scratch, &mut gradient)
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_background_order(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let length = 200;
    let sequence = random_sequence(&mut rng, length);
    let mut group = c.benchmark_group("background_order");

    for order in 0..=3 {
        let model = occurrence_model(&mut rng, length, order);
        let mut scratch = model.new_scratch();
        group.bench_with_input(BenchmarkId::from_parameter(order), &order, |b, _| {
            b.iter(|| {
                model
                    .score_with(black_box(&sequence), 0, &mut scratch)
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(
    name = benches;
    config = configure_criterion();
    targets = benchmark_window_scoring,
    benchmark_background_order
);
criterion_main!(benches);
