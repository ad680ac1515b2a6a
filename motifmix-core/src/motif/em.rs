use rand::Rng;

use crate::config::{Initialization, OccurrenceMode};
use crate::constants::{MIN_SEGMENT_WEIGHT, SEED_CONSENSUS};
use crate::duration::DurationPrior;
use crate::math::sample_dirichlet;
use crate::motif::MotifOccurrenceModel;
use crate::scoring::SequenceScore;
use crate::sequence::{DataSet, WeightedSegment, check_weights};
use crate::training::EmModel;
use crate::types::MixtureError;

/// Posterior placement mass of one sequence, already multiplied by the
/// sequence weight.
///
/// `slot(i)[j]` belongs to motif `i` starting at offset `min_i + j` of the
/// motif's duration domain.
#[derive(Debug, Clone, PartialEq)]
pub struct OccurrenceResponsibilities {
    slots: Vec<Vec<f64>>,
    no_motif: f64,
}

impl OccurrenceResponsibilities {
    pub fn new(slots: Vec<Vec<f64>>, no_motif: f64) -> Self {
        Self { slots, no_motif }
    }

    pub fn slot(&self, motif: usize) -> &[f64] {
        &self.slots[motif]
    }

    pub fn no_motif(&self) -> f64 {
        self.no_motif
    }

    pub fn total(&self) -> f64 {
        self.no_motif + self.slots.iter().flatten().sum::<f64>()
    }
}

impl<M: SequenceScore> MotifOccurrenceModel<M> {
    fn window_segments<'a>(&self, data: &'a DataSet, weights: &[f64]) -> Vec<WeightedSegment<'a>> {
        data.iter()
            .zip(weights)
            .filter(|(_, weight)| **weight > 0.0)
            .map(|(sequence, &weight)| WeightedSegment::new(sequence, 0, self.length, weight))
            .collect()
    }

    /// Seeds motif `motif` from one randomly chosen window of the data,
    /// giving the window's symbols about 90% of each column's mass.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::MotifIndexOutOfBounds`] for an unknown motif,
    /// [`MixtureError::Configuration`] for empty data and propagates
    /// estimation errors.
    pub fn initialize_motif_from_data<R: Rng + ?Sized>(
        &mut self,
        motif: usize,
        data: &DataSet,
        rng: &mut R,
    ) -> Result<(), MixtureError> {
        let width = self.motif_width(motif)?;
        if data.is_empty() {
            return Err(MixtureError::Configuration(
                "cannot seed a motif from an empty data set".to_string(),
            ));
        }
        self.check_data(data)?;
        let sequence = &data.sequences()[rng.gen_range(0..data.len())];
        let position = rng.gen_range(0..=self.length - width);

        let a = self.background.alphabet_size();
        let uniform_share = if a > 1 {
            a as f64 * (1.0 - SEED_CONSENSUS) / (a - 1) as f64
        } else {
            1.0
        };
        let ess = self.slots[motif].motif.ess();
        let mut segments = Vec::new();
        if ess > 0.0 {
            // the prior's pseudo counts supply the remaining mass
            let weight = (1.0 - uniform_share) / uniform_share * ess;
            segments.push(WeightedSegment::new(sequence, position, position + width, weight));
        } else {
            let windows = data.len() * (self.length - width + 1);
            let share = (1.0 - SEED_CONSENSUS) / windows as f64;
            for other in data {
                for start in 0..=self.length - width {
                    segments.push(WeightedSegment::new(other, start, start + width, share));
                }
            }
            segments.push(WeightedSegment::new(
                sequence,
                position,
                position + width,
                SEED_CONSENSUS,
            ));
        }
        self.slots[motif].motif.estimate(&segments)?;
        self.refresh_layout();
        log::debug!("seeded motif {motif} from window {position}..{}", position + width);
        Ok(())
    }

    /// Plug-in initialization: background from the data, every motif seeded
    /// from a random window, then one EM round with the background fixed.
    ///
    /// # Errors
    ///
    /// Propagates data-validation and estimation errors.
    pub fn initialize_from_data<R: Rng + ?Sized>(
        &mut self,
        data: &DataSet,
        weights: &[f64],
        rng: &mut R,
    ) -> Result<(), MixtureError> {
        self.check_data(data)?;
        let windows = self.window_segments(data, weights);
        self.background.estimate(&windows)?;
        for motif in 0..self.slots.len() {
            self.initialize_motif_from_data(motif, data, rng)?;
        }
        let norms = self.component_log_norms();
        self.core.initialize_hidden_uniformly(&norms);
        let (responsibilities, _) = self.expectation(data, weights)?;
        self.maximize(data, &responsibilities, false)
    }

    fn maximize(
        &mut self,
        data: &DataSet,
        responsibilities: &[OccurrenceResponsibilities],
        update_background: bool,
    ) -> Result<(), MixtureError> {
        if responsibilities.len() != data.len() {
            return Err(MixtureError::LengthMismatch {
                expected: data.len(),
                actual: responsibilities.len(),
            });
        }
        let mut statistics = vec![0.0; self.core.components()];
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let width = slot.width();
            let min = slot.duration.min();
            let domain = slot.duration.domain_size();
            let mut duration_weights = vec![0.0; domain];
            let mut segments = Vec::new();
            for (sequence, placement) in data.iter().zip(responsibilities) {
                let weights = &placement.slots[index];
                if weights.len() != domain {
                    return Err(MixtureError::LengthMismatch {
                        expected: domain,
                        actual: weights.len(),
                    });
                }
                for (j, &weight) in weights.iter().enumerate() {
                    duration_weights[j] += weight;
                    if weight > MIN_SEGMENT_WEIGHT {
                        let offset = min + j;
                        segments.push(WeightedSegment::new(
                            sequence,
                            offset,
                            offset + width,
                            weight,
                        ));
                    }
                }
            }
            statistics[index] = duration_weights.iter().sum();
            slot.motif.estimate(&segments)?;
            slot.duration.adjust(&duration_weights)?;
        }
        if self.mode == OccurrenceMode::Sometimes {
            statistics[self.slots.len()] = responsibilities
                .iter()
                .map(OccurrenceResponsibilities::no_motif)
                .sum();
        }

        if update_background && self.train_background {
            let mut segments = Vec::new();
            for (sequence, placement) in data.iter().zip(responsibilities) {
                if placement.no_motif > MIN_SEGMENT_WEIGHT {
                    segments.push(WeightedSegment::new(
                        sequence,
                        0,
                        self.length,
                        placement.no_motif,
                    ));
                }
                for (slot, weights) in self.slots.iter().zip(&placement.slots) {
                    let width = slot.width();
                    for (j, &weight) in weights.iter().enumerate() {
                        if weight <= MIN_SEGMENT_WEIGHT {
                            continue;
                        }
                        let offset = slot.duration.min() + j;
                        if offset > 0 {
                            segments.push(WeightedSegment::new(sequence, 0, offset, weight));
                        }
                        if offset + width < self.length {
                            segments.push(WeightedSegment::new(
                                sequence,
                                offset + width,
                                self.length,
                                weight,
                            ));
                        }
                    }
                }
            }
            self.background.estimate(&segments)?;
        }

        let norms = self.component_log_norms();
        self.core
            .compute_hidden_parameter(&statistics, true, &norms)?;
        self.refresh_layout();
        Ok(())
    }

    fn entries_per_sequence(&self) -> usize {
        self.slots
            .iter()
            .map(|slot| slot.duration.domain_size())
            .sum()
    }

    fn split_entries(&self, entries: &[f64], no_motif: f64) -> OccurrenceResponsibilities {
        let mut slots = Vec::with_capacity(self.slots.len());
        let mut rest = entries;
        for slot in &self.slots {
            let (head, tail) = rest.split_at(slot.duration.domain_size());
            slots.push(head.to_vec());
            rest = tail;
        }
        OccurrenceResponsibilities { slots, no_motif }
    }
}

impl<M: SequenceScore> EmModel for MotifOccurrenceModel<M> {
    type Responsibilities = Vec<OccurrenceResponsibilities>;

    fn check_data(&self, data: &DataSet) -> Result<(), MixtureError> {
        if data.alphabet_size() != self.background.alphabet_size() {
            return Err(MixtureError::Configuration(format!(
                "data alphabet size {} does not match the model's {}",
                data.alphabet_size(),
                self.background.alphabet_size()
            )));
        }
        if let Some(short) = data.iter().find(|sequence| sequence.len() < self.length) {
            return Err(MixtureError::LengthMismatch {
                expected: self.length,
                actual: short.len(),
            });
        }
        Ok(())
    }

    fn randomize<R: Rng + ?Sized>(
        &mut self,
        data: &DataSet,
        weights: &[f64],
        rng: &mut R,
    ) -> Result<(), MixtureError> {
        if self.train_background {
            let windows = self.window_segments(data, weights);
            self.background.estimate(&windows)?;
        }
        MotifOccurrenceModel::initialize_randomly(self, rng)
    }

    fn initial_responsibilities<R: Rng + ?Sized>(
        &self,
        data: &DataSet,
        weights: &[f64],
        initialization: Initialization,
        rng: &mut R,
    ) -> Result<Self::Responsibilities, MixtureError> {
        let entries = self.entries_per_sequence();
        match initialization {
            Initialization::Prior => Ok(self.expectation(data, weights)?.0),
            Initialization::Dirichlet { alpha } => {
                let no_motif = usize::from(self.mode == OccurrenceMode::Sometimes);
                let concentration = vec![alpha; entries + no_motif];
                weights
                    .iter()
                    .map(|&weight| {
                        let mut draw = sample_dirichlet(&concentration, rng)?;
                        draw.iter_mut().for_each(|r| *r *= weight);
                        let no_motif = if no_motif == 1 { draw[entries] } else { 0.0 };
                        Ok(self.split_entries(&draw[..entries], no_motif))
                    })
                    .collect()
            }
            Initialization::UniformPlacement => Ok(weights
                .iter()
                .map(|&weight| self.split_entries(&vec![weight / entries as f64; entries], 0.0))
                .collect()),
        }
    }

    fn expectation(
        &self,
        data: &DataSet,
        weights: &[f64],
    ) -> Result<(Self::Responsibilities, f64), MixtureError> {
        EmModel::check_data(self, data)?;
        check_weights(data, weights)?;
        let log_norm = MotifOccurrenceModel::log_normalization_constant(self);
        let mut scratch = self.new_scratch();
        let mut log_likelihood = 0.0;
        let mut responsibilities = Vec::with_capacity(data.len());
        for (sequence, &weight) in data.iter().zip(weights) {
            let inner = self.fill_components(sequence, 0, &mut scratch);
            let slots = scratch
                .offset_scores
                .iter()
                .enumerate()
                .map(|(index, scores)| {
                    let log_potential = self.core.log_potential(index);
                    scores
                        .iter()
                        .map(|score| weight * (log_potential + score - inner).exp())
                        .collect::<Vec<f64>>()
                })
                .collect();
            let no_motif = if self.mode == OccurrenceMode::Sometimes {
                weight * (self.core.log_potential(self.slots.len()) - inner).exp()
            } else {
                0.0
            };
            if weight != 0.0 {
                let whole = self.background.log_score(sequence, 0, self.length);
                log_likelihood += weight * (whole + inner - log_norm);
            }
            responsibilities.push(OccurrenceResponsibilities { slots, no_motif });
        }
        Ok((responsibilities, log_likelihood))
    }

    fn maximization(
        &mut self,
        data: &DataSet,
        _: &[f64],
        responsibilities: &Self::Responsibilities,
    ) -> Result<(), MixtureError> {
        EmModel::check_data(self, data)?;
        self.maximize(data, responsibilities, true)
    }

    fn log_prior_term(&self) -> f64 {
        MotifOccurrenceModel::log_prior_term(self)
    }

    fn phase_shift_slots(&self) -> usize {
        self.slots.len()
    }

    fn max_phase_shift(&self, slot: usize) -> usize {
        self.slots.get(slot).map_or(0, |slot| slot.width() / 2)
    }

    /// Moves every sequence's placement mass of `slot` by `shift` offsets,
    /// wrapping around the duration domain.
    fn shift_responsibilities(
        &self,
        responsibilities: &Self::Responsibilities,
        slot: usize,
        shift: isize,
    ) -> Result<Self::Responsibilities, MixtureError> {
        if slot >= self.slots.len() {
            return Err(MixtureError::MotifIndexOutOfBounds {
                index: slot,
                motifs: self.slots.len(),
            });
        }
        Ok(responsibilities
            .iter()
            .map(|placement| {
                let mut shifted = placement.clone();
                let weights = &mut shifted.slots[slot];
                if !weights.is_empty() {
                    let steps = shift.rem_euclid(weights.len() as isize) as usize;
                    weights.rotate_right(steps);
                }
                shifted
            })
            .collect())
    }
}
