#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use motifmix_core::sequence::{DataSet, Sequence};

/// Random DNA sequences with `motif` written at a random offset (or at
/// `offset` when given) into every sequence that `planted` selects.
pub fn planted_data(
    seed: u64,
    count: usize,
    length: usize,
    motif: &[u8],
    offset: Option<usize>,
    planted: impl Fn(usize) -> bool,
) -> (DataSet, Vec<Option<usize>>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sequences = Vec::with_capacity(count);
    let mut offsets = Vec::with_capacity(count);
    for index in 0..count {
        let mut symbols: Vec<u8> = (0..length).map(|_| rng.gen_range(0..4u8)).collect();
        if planted(index) {
            let at = offset.unwrap_or_else(|| rng.gen_range(0..=length - motif.len()));
            symbols[at..at + motif.len()].copy_from_slice(motif);
            offsets.push(Some(at));
        } else {
            offsets.push(None);
        }
        sequences.push(Sequence::from_ranks(symbols));
    }
    (DataSet::new(4, sequences).unwrap(), offsets)
}

pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected}, got {actual} (tolerance {tolerance})"
    );
}
