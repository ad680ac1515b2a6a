//! Hidden motif occurrences inside a flanking background.
//!
//! A [`MotifOccurrenceModel`] scores fixed-length windows as a mixture over
//! motif slots and (in [`OccurrenceMode::Sometimes`]) one "no motif"
//! component. Each slot marginalizes its motif over every admissible start
//! offset, weighted by the slot's [`DurationModel`]. The background is a
//! [`HomogeneousMarkovModel`] whose order fixes how much flanking context is
//! rescored around a candidate occurrence.

pub mod em;

use std::fmt;

use rand::Rng;

use crate::config::OccurrenceMode;
use crate::duration::{DurationModel, DurationPrior};
use crate::math::{log_sum_exp, log_sum_normalize};
use crate::mixture::{MixtureCore, ParameterLayout};
use crate::scoring::{Component, HomogeneousMarkovModel, SequenceScore};
use crate::sequence::Sequence;
use crate::types::{HiddenParameterization, MixtureError, ProfileKind, SparseGradient};

pub use em::OccurrenceResponsibilities;

/// One motif together with its position prior.
#[derive(Debug, Clone)]
pub struct MotifSlot<M> {
    motif: M,
    duration: DurationModel,
}

impl<M: SequenceScore> MotifSlot<M> {
    pub fn new(motif: M, duration: impl Into<DurationModel>) -> Self {
        Self {
            motif,
            duration: duration.into(),
        }
    }

    pub fn motif(&self) -> &M {
        &self.motif
    }

    pub fn duration(&self) -> &DurationModel {
        &self.duration
    }

    pub fn width(&self) -> usize {
        self.motif.length()
    }
}

/// Per-caller scratch buffers of a [`MotifOccurrenceModel`].
///
/// Buffers are resized on every call, so one scratch survives motif resizes.
#[derive(Debug, Clone, Default)]
pub struct OccurrenceScratch {
    offset_scores: Vec<Vec<f64>>,
    component_scores: Vec<f64>,
    local: SparseGradient,
    background_dense: Vec<f64>,
}

impl OccurrenceScratch {
    /// Per-offset scores of `slot` filled by the last call.
    pub fn offset_scores(&self, slot: usize) -> &[f64] {
        self.offset_scores.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// ZOOPS/OOPS motif model over windows of a fixed length.
///
/// Hidden components are the motif slots in order, followed by the
/// "no motif" component in [`OccurrenceMode::Sometimes`]. The parameter
/// vector holds, per slot, the motif block and the duration block, then the
/// background block (empty unless the background is trained) and finally the
/// hidden block.
#[derive(Debug, Clone)]
pub struct MotifOccurrenceModel<M: SequenceScore = Component> {
    slots: Vec<MotifSlot<M>>,
    background: HomogeneousMarkovModel,
    core: MixtureCore,
    mode: OccurrenceMode,
    length: usize,
    layout: Option<ParameterLayout>,
    train_background: bool,
}

impl<M: SequenceScore> MotifOccurrenceModel<M> {
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] naming the offending motif
    /// when there are no slots, a motif has no fixed width, alphabets
    /// disagree, or a duration domain does not fit into windows of
    /// `length`.
    pub fn new(
        slots: Vec<MotifSlot<M>>,
        background: HomogeneousMarkovModel,
        mode: OccurrenceMode,
        length: usize,
        parameterization: HiddenParameterization,
    ) -> Result<Self, MixtureError> {
        if slots.is_empty() {
            return Err(MixtureError::Configuration(
                "a motif model needs at least one motif".to_string(),
            ));
        }
        for (index, slot) in slots.iter().enumerate() {
            let width = slot.width();
            if width == 0 {
                return Err(MixtureError::Configuration(format!(
                    "motif {index} has no fixed width"
                )));
            }
            if slot.motif.alphabet_size() != background.alphabet_size() {
                return Err(MixtureError::Configuration(format!(
                    "motif {index} has alphabet size {}, background has {}",
                    slot.motif.alphabet_size(),
                    background.alphabet_size()
                )));
            }
            if slot.duration.max() + width > length {
                return Err(MixtureError::Configuration(format!(
                    "motif {index}: offsets up to {} with width {width} exceed the window length {length}",
                    slot.duration.max()
                )));
            }
        }

        let mut hyperparameters: Vec<f64> = slots.iter().map(|slot| slot.motif.ess()).collect();
        if mode == OccurrenceMode::Sometimes {
            hyperparameters.push(background.ess());
        }
        let normalized = slots.iter().all(|slot| slot.motif.is_normalized());
        let core = MixtureCore::new(
            hyperparameters.len(),
            parameterization,
            normalized,
            hyperparameters,
            1,
        )?;

        let mut model = Self {
            slots,
            background,
            core,
            mode,
            length,
            layout: None,
            train_background: true,
        };
        let norms = model.component_log_norms();
        model.core.initialize_hidden_uniformly(&norms);
        model.refresh_layout();
        Ok(model)
    }

    /// Keeps the background fixed and out of the parameter vector when
    /// `false`.
    #[must_use]
    pub fn with_background_training(mut self, train: bool) -> Self {
        self.train_background = train;
        self.refresh_layout();
        self
    }

    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] for zero starts.
    pub fn with_starts(mut self, starts: usize) -> Result<Self, MixtureError> {
        self.core = MixtureCore::new(
            self.core.components(),
            self.core.parameterization(),
            self.core.is_normalized(),
            self.core.hyperparameters().to_vec(),
            starts,
        )?;
        let norms = self.component_log_norms();
        self.core.initialize_hidden_uniformly(&norms);
        Ok(self)
    }

    pub fn slots(&self) -> &[MotifSlot<M>] {
        &self.slots
    }

    pub fn background(&self) -> &HomogeneousMarkovModel {
        &self.background
    }

    pub fn core(&self) -> &MixtureCore {
        &self.core
    }

    pub fn mode(&self) -> OccurrenceMode {
        self.mode
    }

    /// Window length scored by the model.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn layout(&self) -> Option<&ParameterLayout> {
        self.layout.as_ref()
    }

    pub fn trains_background(&self) -> bool {
        self.train_background
    }

    pub fn motif_count(&self) -> usize {
        self.slots.len()
    }

    /// # Errors
    ///
    /// Returns [`MixtureError::MotifIndexOutOfBounds`] for an unknown motif.
    pub fn motif_width(&self, motif: usize) -> Result<usize, MixtureError> {
        Ok(self.slot(motif)?.width())
    }

    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] unless one value per hidden
    /// component is given.
    pub fn set_hidden_parameters(&mut self, values: &[f64]) -> Result<(), MixtureError> {
        self.core.set_hidden_parameters(values)
    }

    pub fn new_scratch(&self) -> OccurrenceScratch {
        OccurrenceScratch::default()
    }

    fn slot(&self, motif: usize) -> Result<&MotifSlot<M>, MixtureError> {
        self.slots
            .get(motif)
            .ok_or(MixtureError::MotifIndexOutOfBounds {
                index: motif,
                motifs: self.slots.len(),
            })
    }

    fn has_no_motif_component(&self) -> bool {
        self.mode == OccurrenceMode::Sometimes
    }

    /// Own log normalization constant of every hidden component; durations
    /// and background are normalized.
    fn component_log_norms(&self) -> Vec<f64> {
        let mut norms: Vec<f64> = self
            .slots
            .iter()
            .map(|slot| slot.motif.log_normalization_constant())
            .collect();
        if self.has_no_motif_component() {
            norms.push(0.0);
        }
        norms
    }

    fn refresh_layout(&mut self) {
        let mut counts = Vec::with_capacity(2 * self.slots.len() + 1);
        for slot in &self.slots {
            let Some(count) = slot.motif.parameter_count() else {
                self.layout = None;
                self.core.invalidate_normalization();
                return;
            };
            counts.push(count);
            counts.push(slot.duration.parameter_count());
        }
        let background = if self.train_background {
            self.background.parameter_count().unwrap_or(0)
        } else {
            0
        };
        counts.push(background);
        self.layout = Some(ParameterLayout::new(
            &counts,
            self.core.hidden_parameter_count(),
        ));
        self.core.invalidate_normalization();
    }

    fn require_layout(&self) -> Result<&ParameterLayout, MixtureError> {
        self.layout.as_ref().ok_or_else(|| {
            MixtureError::Uninitialized("a motif has an unresolved parameter count".to_string())
        })
    }

    fn background_block(&self) -> usize {
        2 * self.slots.len()
    }

    fn check_window(&self, sequence: &Sequence, start: usize) -> Result<(), MixtureError> {
        let available = sequence.len().saturating_sub(start);
        if available < self.length {
            return Err(MixtureError::LengthMismatch {
                expected: self.length,
                actual: available,
            });
        }
        Ok(())
    }

    /// Background context `[from, to)` rescored around an occurrence of
    /// `width` symbols at window offset `offset`.
    fn around(&self, start: usize, offset: usize, width: usize) -> (usize, usize) {
        let order = self.background.order();
        (
            start + offset.saturating_sub(order),
            start + (offset + width + order).min(self.length),
        )
    }

    fn offset_score(
        &self,
        slot: &MotifSlot<M>,
        sequence: &Sequence,
        start: usize,
        offset: usize,
        log_duration: f64,
    ) -> f64 {
        let width = slot.width();
        let position = start + offset;
        let (from, to) = self.around(start, offset, width);
        log_duration + slot.motif.log_score(sequence, position, position + width)
            - self.background.log_score(sequence, from, to)
            + self.background.log_score(sequence, from, position)
            + self.background.log_score(sequence, position + width, to)
    }

    fn prepare(&self, scratch: &mut OccurrenceScratch) {
        scratch.offset_scores.resize_with(self.slots.len(), Vec::new);
        for (scores, slot) in scratch.offset_scores.iter_mut().zip(&self.slots) {
            scores.clear();
            scores.reserve(slot.duration.domain_size());
        }
        scratch
            .component_scores
            .resize(self.core.components(), f64::NEG_INFINITY);
        scratch.local.clear();
    }

    fn fill_slot(&self, index: usize, sequence: &Sequence, start: usize, scratch: &mut OccurrenceScratch) -> usize {
        let slot = &self.slots[index];
        let scores = &mut scratch.offset_scores[index];
        scores.clear();
        for (offset, log_duration) in slot.duration.positions() {
            scores.push(self.offset_score(slot, sequence, start, offset, log_duration));
        }
        scores.len()
    }

    /// Fills the per-offset scores of motif `motif` into `scratch` and
    /// returns how many offsets were scored.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::MotifIndexOutOfBounds`] for an unknown motif
    /// and [`MixtureError::LengthMismatch`] for a short sequence.
    pub fn fill_component_score_of(
        &self,
        motif: usize,
        sequence: &Sequence,
        start: usize,
        scratch: &mut OccurrenceScratch,
    ) -> Result<usize, MixtureError> {
        self.slot(motif)?;
        self.check_window(sequence, start)?;
        self.prepare(scratch);
        Ok(self.fill_slot(motif, sequence, start, scratch))
    }

    /// Fills every offset and component score; returns the log-sum over the
    /// components, excluding the whole-window background.
    fn fill_components(&self, sequence: &Sequence, start: usize, scratch: &mut OccurrenceScratch) -> f64 {
        self.prepare(scratch);
        for index in 0..self.slots.len() {
            self.fill_slot(index, sequence, start, scratch);
            scratch.component_scores[index] =
                self.core.log_potential(index) + log_sum_exp(&scratch.offset_scores[index]);
        }
        if self.has_no_motif_component() {
            let last = self.slots.len();
            scratch.component_scores[last] = self.core.log_potential(last);
        }
        log_sum_exp(&scratch.component_scores)
    }

    /// Log score of the window `[start, start + length)`.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] for a short sequence.
    pub fn score(&self, sequence: &Sequence, start: usize) -> Result<f64, MixtureError> {
        self.score_with(sequence, start, &mut self.new_scratch())
    }

    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] for a short sequence.
    pub fn score_with(
        &self,
        sequence: &Sequence,
        start: usize,
        scratch: &mut OccurrenceScratch,
    ) -> Result<f64, MixtureError> {
        self.check_window(sequence, start)?;
        let inner = self.fill_components(sequence, start, scratch);
        Ok(self.background.log_score(sequence, start, start + self.length) + inner)
    }

    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] for a short sequence and
    /// [`MixtureError::Uninitialized`] while the layout is unresolved.
    pub fn score_and_gradient(
        &self,
        sequence: &Sequence,
        start: usize,
        gradient: &mut SparseGradient,
    ) -> Result<f64, MixtureError> {
        self.score_and_gradient_with(sequence, start, &mut self.new_scratch(), gradient)
    }

    /// Two passes: the first scores every offset, the second weights each
    /// offset's gradients by its posterior. Background contributions are
    /// summed in a dense buffer before being emitted once per parameter.
    ///
    /// # Errors
    ///
    /// See [`score_and_gradient`](Self::score_and_gradient).
    pub fn score_and_gradient_with(
        &self,
        sequence: &Sequence,
        start: usize,
        scratch: &mut OccurrenceScratch,
        gradient: &mut SparseGradient,
    ) -> Result<f64, MixtureError> {
        self.check_window(sequence, start)?;
        let layout = self.require_layout()?;
        let inner = self.fill_components(sequence, start, scratch);

        let background_count = layout.block_len(self.background_block());
        scratch.background_dense.clear();
        scratch.background_dense.resize(background_count, 0.0);
        let end = start + self.length;
        let mut score = if background_count > 0 {
            scratch.local.clear();
            let whole = self
                .background
                .log_score_and_gradient(sequence, start, end, &mut scratch.local);
            scratch
                .local
                .add_to_dense(&mut scratch.background_dense, 1.0);
            whole
        } else {
            self.background.log_score(sequence, start, end)
        };
        score += inner;
        if inner == f64::NEG_INFINITY {
            return Ok(score);
        }

        for (index, slot) in self.slots.iter().enumerate() {
            let width = slot.width();
            let motif_offset = layout.block_offset(2 * index);
            let duration_offset = layout.block_offset(2 * index + 1);
            let log_potential = self.core.log_potential(index);
            let mut responsibility = 0.0;
            for (j, offset) in (slot.duration.min()..=slot.duration.max()).enumerate() {
                let weight = (log_potential + scratch.offset_scores[index][j] - inner).exp();
                if weight == 0.0 {
                    continue;
                }
                responsibility += weight;
                let position = start + offset;

                scratch.local.clear();
                slot.duration
                    .log_probability_and_gradient(offset, &mut scratch.local);
                gradient.extend_scaled(&scratch.local, duration_offset, weight);

                scratch.local.clear();
                slot.motif.log_score_and_gradient(
                    sequence,
                    position,
                    position + width,
                    &mut scratch.local,
                );
                gradient.extend_scaled(&scratch.local, motif_offset, weight);

                if background_count > 0 {
                    let (from, to) = self.around(start, offset, width);
                    self.add_background_gradient(sequence, from, to, -weight, scratch);
                    self.add_background_gradient(sequence, from, position, weight, scratch);
                    self.add_background_gradient(sequence, position + width, to, weight, scratch);
                }
            }
            scratch.component_scores[index] = responsibility;
        }
        if self.has_no_motif_component() {
            let last = self.slots.len();
            scratch.component_scores[last] = (self.core.log_potential(last) - inner).exp();
        }
        self.core
            .push_hidden_gradient(&scratch.component_scores, layout.hidden_offset(), gradient);

        let background_offset = layout.block_offset(self.background_block());
        for (local, &value) in scratch.background_dense.iter().enumerate() {
            if value != 0.0 {
                gradient.push(background_offset + local, value);
            }
        }
        Ok(score)
    }

    fn add_background_gradient(
        &self,
        sequence: &Sequence,
        from: usize,
        to: usize,
        factor: f64,
        scratch: &mut OccurrenceScratch,
    ) {
        if from >= to {
            return;
        }
        scratch.local.clear();
        self.background
            .log_score_and_gradient(sequence, from, to, &mut scratch.local);
        scratch
            .local
            .add_to_dense(&mut scratch.background_dense, factor);
    }

    /// Posterior over the hidden components for one window.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] for a short sequence.
    pub fn component_probabilities(
        &self,
        sequence: &Sequence,
        start: usize,
    ) -> Result<Vec<f64>, MixtureError> {
        self.check_window(sequence, start)?;
        let mut scratch = self.new_scratch();
        self.fill_components(sequence, start, &mut scratch);
        let mut probabilities = scratch.component_scores;
        log_sum_normalize(&mut probabilities);
        Ok(probabilities)
    }

    /// Most probable hidden component; the "no motif" component has index
    /// [`motif_count`](Self::motif_count).
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] for a short sequence.
    pub fn index_of_maximal_component(
        &self,
        sequence: &Sequence,
        start: usize,
    ) -> Result<usize, MixtureError> {
        let probabilities = self.component_probabilities(sequence, start)?;
        let mut best = 0;
        for (i, &p) in probabilities.iter().enumerate() {
            if p > probabilities[best] {
                best = i;
            }
        }
        Ok(best)
    }

    /// Log scores of motif `motif` at every window offset
    /// `0..=length - width`; offsets outside the duration domain are
    /// negative infinity.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::MotifIndexOutOfBounds`] for an unknown motif
    /// and [`MixtureError::LengthMismatch`] unless the sequence from `start`
    /// is exactly one window long.
    pub fn profile(
        &self,
        motif: usize,
        sequence: &Sequence,
        start: usize,
        kind: ProfileKind,
    ) -> Result<Vec<f64>, MixtureError> {
        let slot = self.slot(motif)?;
        let available = sequence.len().saturating_sub(start);
        if available != self.length {
            return Err(MixtureError::LengthMismatch {
                expected: self.length,
                actual: available,
            });
        }
        let mut scratch = self.new_scratch();
        self.fill_component_score_of(motif, sequence, start, &mut scratch)?;
        let scores = &scratch.offset_scores[motif];
        let shift = match kind {
            ProfileKind::UnnormalizedJoint => {
                self.core.log_potential(motif)
                    + self.background.log_score(sequence, start, start + self.length)
            }
            ProfileKind::UnnormalizedConditional => {
                self.background.log_score(sequence, start, start + self.length)
            }
            ProfileKind::NormalizedConditional => -log_sum_exp(scores),
        };

        let mut profile = vec![f64::NEG_INFINITY; self.length - slot.width() + 1];
        for (offset, score) in (slot.duration.min()..=slot.duration.max()).zip(scores) {
            profile[offset] = score + shift;
        }
        Ok(profile)
    }

    /// Resizes motif `motif` so that it covers its old positions
    /// `[offset_left, width + offset_right)`, moving the duration domain
    /// along and correcting the hidden parameter for the motif's changed
    /// normalization constant. Returns `Ok(false)` if the motif cannot be
    /// resized; the model is then unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::MotifIndexOutOfBounds`] for an unknown motif.
    pub fn modify_motif(
        &mut self,
        motif: usize,
        offset_left: isize,
        offset_right: isize,
    ) -> Result<bool, MixtureError> {
        let slot = self.slot(motif)?;
        let new_width = slot.width() as isize - offset_left + offset_right;
        let new_max = slot.duration.max() as isize + offset_left - offset_right;
        if new_width < 1 || new_max < slot.duration.min() as isize {
            return Ok(false);
        }
        let old_norm = slot.motif.log_normalization_constant();

        let slot = &mut self.slots[motif];
        let mut resized = slot.motif.clone();
        if !resized.modify(offset_left, offset_right) {
            return Ok(false);
        }
        slot.duration.resize(offset_left, offset_right)?;
        slot.motif = resized;
        let new_norm = slot.motif.log_normalization_constant();

        self.core.shift_hidden(motif, old_norm - new_norm);
        self.refresh_layout();
        log::debug!(
            "resized motif {motif} by ({offset_left}, {offset_right}) to width {new_width}"
        );
        Ok(true)
    }

    pub fn number_of_parameters(&self) -> Option<usize> {
        self.layout.as_ref().map(ParameterLayout::total)
    }

    /// # Errors
    ///
    /// Returns [`MixtureError::Uninitialized`] while the layout is unresolved.
    pub fn current_parameter_values(&self) -> Result<Vec<f64>, MixtureError> {
        let layout = self.require_layout()?;
        let mut params = Vec::with_capacity(layout.total());
        for slot in &self.slots {
            params.extend(slot.motif.parameters()?);
            params.extend(slot.duration.parameters());
        }
        if self.train_background {
            params.extend(self.background.parameters()?);
        }
        params.extend(self.core.hidden_parameters());
        Ok(params)
    }

    /// # Errors
    ///
    /// Returns [`MixtureError::Uninitialized`] while the layout is unresolved
    /// and [`MixtureError::ParameterCount`] for a short slice.
    pub fn set_parameters(&mut self, params: &[f64], offset: usize) -> Result<(), MixtureError> {
        let layout = self.require_layout()?.clone();
        if params.len() < offset + layout.total() {
            return Err(MixtureError::ParameterCount {
                expected: offset + layout.total(),
                actual: params.len(),
            });
        }
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.motif
                .set_parameters(params, offset + layout.block_offset(2 * index))?;
            slot.duration
                .set_parameters(params, offset + layout.block_offset(2 * index + 1))?;
        }
        if self.train_background {
            self.background
                .set_parameters(params, offset + layout.block_offset(self.background_block()))?;
        }
        self.core
            .set_hidden_from(params, offset + layout.hidden_offset())?;
        self.core.invalidate_normalization();
        Ok(())
    }

    pub fn is_normalized(&self) -> bool {
        self.core.is_normalized()
    }

    pub fn log_normalization_constant(&self) -> f64 {
        self.core
            .log_normalization_constant(|| self.component_log_norms())
    }

    /// # Errors
    ///
    /// Returns [`MixtureError::Uninitialized`] while the layout is unresolved.
    pub fn add_gradient_of_log_normalization_constant(
        &self,
        gradient: &mut [f64],
        offset: usize,
        factor: f64,
    ) -> Result<(), MixtureError> {
        if self.is_normalized() {
            return Ok(());
        }
        let layout = self.require_layout()?;
        let shares = self.core.normalization_shares(&self.component_log_norms());
        for (index, slot) in self.slots.iter().enumerate() {
            slot.motif.add_gradient_of_log_normalization_constant(
                gradient,
                offset + layout.block_offset(2 * index),
                factor * shares[index],
            );
        }
        self.core.add_hidden_normalization_gradient(
            &shares,
            gradient,
            offset + layout.hidden_offset(),
            factor,
        );
        Ok(())
    }

    pub fn log_prior_term(&self) -> f64 {
        let slots: f64 = self
            .slots
            .iter()
            .map(|slot| slot.motif.log_prior_term() + slot.duration.log_prior_term())
            .sum();
        self.core.hidden_log_prior_term() + slots + self.background.log_prior_term()
    }

    /// # Errors
    ///
    /// Returns [`MixtureError::Uninitialized`] while the layout is unresolved.
    pub fn add_gradient_of_log_prior_term(
        &self,
        gradient: &mut [f64],
        offset: usize,
    ) -> Result<(), MixtureError> {
        let layout = self.require_layout()?;
        for (index, slot) in self.slots.iter().enumerate() {
            slot.motif
                .add_gradient_of_log_prior_term(gradient, offset + layout.block_offset(2 * index));
            slot.duration.add_gradient_of_log_prior_term(
                gradient,
                offset + layout.block_offset(2 * index + 1),
            );
        }
        if self.train_background {
            self.background.add_gradient_of_log_prior_term(
                gradient,
                offset + layout.block_offset(self.background_block()),
            );
        }
        self.core
            .add_hidden_prior_gradient(gradient, offset + layout.hidden_offset());
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.layout.is_some()
            && self.background.is_initialized()
            && self.slots.iter().all(|slot| slot.motif.is_initialized())
    }

    /// Draws motif `motif` and its duration from their priors.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::MotifIndexOutOfBounds`] for an unknown motif
    /// and propagates sampling errors.
    pub fn initialize_motif_randomly<R: Rng + ?Sized>(
        &mut self,
        motif: usize,
        rng: &mut R,
    ) -> Result<(), MixtureError> {
        self.slot(motif)?;
        let slot = &mut self.slots[motif];
        slot.motif.initialize_randomly(rng)?;
        slot.duration.initialize_randomly(rng)?;
        self.refresh_layout();
        Ok(())
    }

    /// Draws every motif, duration and the hidden block from their priors;
    /// the background is kept.
    ///
    /// # Errors
    ///
    /// Propagates sampling errors.
    pub fn initialize_randomly<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), MixtureError> {
        for motif in 0..self.slots.len() {
            self.initialize_motif_randomly(motif, rng)?;
        }
        let norms = self.component_log_norms();
        self.core.initialize_hidden_randomly(rng, &norms)?;
        self.refresh_layout();
        Ok(())
    }
}

impl<M: SequenceScore + fmt::Display> fmt::Display for MotifOccurrenceModel<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            OccurrenceMode::Always => "always",
            OccurrenceMode::Sometimes => "sometimes",
        };
        write!(
            f,
            "MotifOccurrence(length={}, motifs={}, occurrence={mode})",
            self.length,
            self.slots.len()
        )?;
        for (index, slot) in self.slots.iter().enumerate() {
            write!(
                f,
                "\nmotif {index} (p={:.3}, offsets {}..={}):\n{}",
                self.core.potentials()[index],
                slot.duration.min(),
                slot.duration.max(),
                slot.motif
            )?;
        }
        if self.has_no_motif_component() {
            write!(f, "\nno motif (p={:.3})", self.core.potentials()[self.slots.len()])?;
        }
        write!(f, "\nbackground:\n{}", self.background)
    }
}
