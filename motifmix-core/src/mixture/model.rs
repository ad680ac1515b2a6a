use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Initialization;
use crate::constants::{MIN_SEGMENT_WEIGHT, PLUG_IN_ROUNDS};
use crate::math::{log_sum_exp, log_sum_normalize, sample_dirichlet};
use crate::mixture::{MixtureCore, ParameterLayout};
use crate::scoring::{Component, SequenceScore};
use crate::sequence::{DataSet, Sequence, WeightedSegment, check_weights};
use crate::training::EmModel;
use crate::types::{HiddenParameterization, MixtureError, SparseGradient};

/// Per-caller scratch buffers of a [`MixtureModel`].
///
/// Contents are only meaningful during a single call.
#[derive(Debug, Clone, Default)]
pub struct MixtureScratch {
    component_scores: Vec<f64>,
    gradients: Vec<SparseGradient>,
}

impl MixtureScratch {
    fn prepare(&mut self, components: usize) {
        self.component_scores.resize(components, 0.0);
        self.gradients.resize_with(components, SparseGradient::new);
        for gradient in &mut self.gradients {
            gradient.clear();
        }
    }
}

/// A `K`-component mixture
/// `log Σ_i exp(logPotential_i + component_i(x))`.
///
/// Components are owned; cloning the mixture deep-copies every component
/// together with the hidden state. The mixture is normalized iff every
/// component is.
///
/// # Examples
///
/// ```rust
/// use motifmix_core::mixture::MixtureModel;
/// use motifmix_core::scoring::{Component, PositionWeightMatrix, UniformModel};
/// use motifmix_core::sequence::Sequence;
/// use motifmix_core::types::HiddenParameterization;
///
/// let point_mass = PositionWeightMatrix::from_potentials(1, 2, &[0.0, f64::NEG_INFINITY], 0.0)?;
/// let mixture = MixtureModel::new(
///     vec![Component::from(UniformModel::new(2, 1)), Component::from(point_mass)],
///     HiddenParameterization::Free,
/// )?;
///
/// let score = mixture.score(&Sequence::from_ranks(vec![0]), 0)?;
/// assert!((score - 0.75f64.ln()).abs() < 1e-12);
/// # Ok::<(), motifmix_core::types::MixtureError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MixtureModel<C: SequenceScore = Component> {
    components: Vec<C>,
    core: MixtureCore,
    layout: Option<ParameterLayout>,
    length: usize,
    alphabet_size: usize,
}

impl<C: SequenceScore> MixtureModel<C> {
    /// Builds a mixture with uniform potentials whose hidden hyperparameters
    /// are the components' equivalent sample sizes.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] for an empty component list or
    /// components that disagree on alphabet or fixed length.
    pub fn new(
        components: Vec<C>,
        parameterization: HiddenParameterization,
    ) -> Result<Self, MixtureError> {
        let hyperparameters = components.iter().map(SequenceScore::ess).collect();
        Self::with_hyperparameters(components, parameterization, hyperparameters, 1)
    }

    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] for an empty component list,
    /// disagreeing components, invalid hyperparameters or zero starts.
    pub fn with_hyperparameters(
        components: Vec<C>,
        parameterization: HiddenParameterization,
        hyperparameters: Vec<f64>,
        starts: usize,
    ) -> Result<Self, MixtureError> {
        let first = components.first().ok_or_else(|| {
            MixtureError::Configuration("a mixture needs at least one component".to_string())
        })?;
        let alphabet_size = first.alphabet_size();
        let mut length = 0;
        for (index, component) in components.iter().enumerate() {
            if component.alphabet_size() != alphabet_size {
                return Err(MixtureError::Configuration(format!(
                    "component {index} has alphabet size {}, expected {alphabet_size}",
                    component.alphabet_size()
                )));
            }
            match (length, component.length()) {
                (_, 0) => {}
                (0, fixed) => length = fixed,
                (expected, fixed) if expected != fixed => {
                    return Err(MixtureError::Configuration(format!(
                        "component {index} has length {fixed}, expected {expected}"
                    )));
                }
                _ => {}
            }
        }

        let normalized = components.iter().all(SequenceScore::is_normalized);
        let core = MixtureCore::new(
            components.len(),
            parameterization,
            normalized,
            hyperparameters,
            starts,
        )?;
        let mut mixture = Self {
            components,
            core,
            layout: None,
            length,
            alphabet_size,
        };
        let norms = mixture.component_log_norms();
        mixture.core.initialize_hidden_uniformly(&norms);
        mixture.refresh_layout();
        Ok(mixture)
    }

    pub fn components(&self) -> &[C] {
        &self.components
    }

    pub fn component(&self, index: usize) -> Option<&C> {
        self.components.get(index)
    }

    pub fn core(&self) -> &MixtureCore {
        &self.core
    }

    pub fn layout(&self) -> Option<&ParameterLayout> {
        self.layout.as_ref()
    }

    /// Fixed window length shared by the components, `0` if variable.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    /// Number of independent starts a trainer should run.
    pub fn starts(&self) -> usize {
        self.core.starts()
    }

    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] unless one value per
    /// component is given.
    pub fn set_hidden_parameters(&mut self, values: &[f64]) -> Result<(), MixtureError> {
        self.core.set_hidden_parameters(values)
    }

    /// Hides the hidden block from the exposed parameter vector.
    pub fn set_optimize_hidden(&mut self, optimize: bool) {
        self.core.set_optimize_hidden(optimize);
        self.refresh_layout();
    }

    pub fn new_scratch(&self) -> MixtureScratch {
        MixtureScratch::default()
    }

    fn refresh_layout(&mut self) {
        let counts: Option<Vec<usize>> = self
            .components
            .iter()
            .map(SequenceScore::parameter_count)
            .collect();
        self.layout =
            counts.map(|counts| ParameterLayout::new(&counts, self.core.hidden_parameter_count()));
        self.core.invalidate_normalization();
    }

    fn component_log_norms(&self) -> Vec<f64> {
        self.components
            .iter()
            .map(SequenceScore::log_normalization_constant)
            .collect()
    }

    fn require_layout(&self) -> Result<&ParameterLayout, MixtureError> {
        self.layout.as_ref().ok_or_else(|| {
            MixtureError::Uninitialized("a component has an unresolved parameter count".to_string())
        })
    }

    /// End of the window starting at `start`.
    fn window_end(&self, sequence: &Sequence, start: usize) -> Result<usize, MixtureError> {
        let available = sequence.len().saturating_sub(start);
        if self.length == 0 {
            return Ok(sequence.len().max(start));
        }
        if available < self.length {
            return Err(MixtureError::LengthMismatch {
                expected: self.length,
                actual: available,
            });
        }
        Ok(start + self.length)
    }

    fn fill_component_scores(
        &self,
        sequence: &Sequence,
        start: usize,
        end: usize,
        scores: &mut [f64],
    ) {
        for (i, (component, score)) in self.components.iter().zip(scores.iter_mut()).enumerate() {
            *score = self.core.log_potential(i) + component.log_score(sequence, start, end);
        }
    }

    /// Log score of the window starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] if the sequence is shorter
    /// than the window.
    pub fn score(&self, sequence: &Sequence, start: usize) -> Result<f64, MixtureError> {
        self.score_with(sequence, start, &mut self.new_scratch())
    }

    /// [`score`](Self::score) reusing caller-owned scratch buffers.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] if the sequence is shorter
    /// than the window.
    pub fn score_with(
        &self,
        sequence: &Sequence,
        start: usize,
        scratch: &mut MixtureScratch,
    ) -> Result<f64, MixtureError> {
        let end = self.window_end(sequence, start)?;
        Ok(self.score_segment(sequence, start, end, scratch))
    }

    fn score_segment(
        &self,
        sequence: &Sequence,
        start: usize,
        end: usize,
        scratch: &mut MixtureScratch,
    ) -> f64 {
        scratch.prepare(self.components.len());
        self.fill_component_scores(sequence, start, end, &mut scratch.component_scores);
        log_sum_exp(&scratch.component_scores)
    }

    /// Log score plus the sparse gradient with global parameter indices.
    ///
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

    /// # Errors
    ///
    /// See [`score_and_gradient`](Self::score_and_gradient).
    pub fn score_and_gradient_with(
        &self,
        sequence: &Sequence,
        start: usize,
        scratch: &mut MixtureScratch,
        gradient: &mut SparseGradient,
    ) -> Result<f64, MixtureError> {
        let end = self.window_end(sequence, start)?;
        self.require_layout()?;
        Ok(self.score_and_gradient_segment(sequence, start, end, scratch, gradient))
    }

    fn score_and_gradient_segment(
        &self,
        sequence: &Sequence,
        start: usize,
        end: usize,
        scratch: &mut MixtureScratch,
        gradient: &mut SparseGradient,
    ) -> f64 {
        let Some(layout) = self.layout.as_ref() else {
            return self.score_segment(sequence, start, end, scratch);
        };
        scratch.prepare(self.components.len());
        for (i, component) in self.components.iter().enumerate() {
            scratch.component_scores[i] = self.core.log_potential(i)
                + component.log_score_and_gradient(sequence, start, end, &mut scratch.gradients[i]);
        }
        let total = log_sum_exp(&scratch.component_scores);
        if total == f64::NEG_INFINITY {
            return total;
        }
        for (i, score) in scratch.component_scores.iter_mut().enumerate() {
            let responsibility = (*score - total).exp();
            gradient.extend_scaled(&scratch.gradients[i], layout.block_offset(i), responsibility);
            *score = responsibility;
        }
        self.core
            .push_hidden_gradient(&scratch.component_scores, layout.hidden_offset(), gradient);
        total
    }

    /// Posterior probability of every component for the window at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] for a short sequence.
    pub fn component_probabilities(
        &self,
        sequence: &Sequence,
        start: usize,
    ) -> Result<Vec<f64>, MixtureError> {
        let end = self.window_end(sequence, start)?;
        let mut scores = vec![0.0; self.components.len()];
        self.fill_component_scores(sequence, start, end, &mut scores);
        log_sum_normalize(&mut scores);
        Ok(scores)
    }

    /// Component with the highest posterior for the window at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] for a short sequence.
    pub fn index_of_maximal_component(
        &self,
        sequence: &Sequence,
        start: usize,
    ) -> Result<usize, MixtureError> {
        let end = self.window_end(sequence, start)?;
        let mut scores = vec![0.0; self.components.len()];
        self.fill_component_scores(sequence, start, end, &mut scores);
        let mut best = 0;
        for (i, &score) in scores.iter().enumerate() {
            if score > scores[best] {
                best = i;
            }
        }
        Ok(best)
    }

    pub fn number_of_parameters(&self) -> Option<usize> {
        self.layout.as_ref().map(ParameterLayout::total)
    }

    /// Component blocks followed by the exposed hidden parameters.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::Uninitialized`] while the layout is unresolved.
    pub fn current_parameter_values(&self) -> Result<Vec<f64>, MixtureError> {
        let layout = self.require_layout()?;
        let mut params = Vec::with_capacity(layout.total());
        for component in &self.components {
            params.extend(component.parameters()?);
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
        for (i, component) in self.components.iter_mut().enumerate() {
            component.set_parameters(params, offset + layout.block_offset(i))?;
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
        self.push_normalization_gradient(layout, gradient, offset, factor);
        Ok(())
    }

    fn push_normalization_gradient(
        &self,
        layout: &ParameterLayout,
        gradient: &mut [f64],
        offset: usize,
        factor: f64,
    ) {
        if self.is_normalized() {
            return;
        }
        let shares = self.core.normalization_shares(&self.component_log_norms());
        for (i, component) in self.components.iter().enumerate() {
            component.add_gradient_of_log_normalization_constant(
                gradient,
                offset + layout.block_offset(i),
                factor * shares[i],
            );
        }
        self.core.add_hidden_normalization_gradient(
            &shares,
            gradient,
            offset + layout.hidden_offset(),
            factor,
        );
    }

    pub fn log_prior_term(&self) -> f64 {
        self.core.hidden_log_prior_term()
            + self
                .components
                .iter()
                .map(SequenceScore::log_prior_term)
                .sum::<f64>()
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
        self.push_prior_gradient(layout, gradient, offset);
        Ok(())
    }

    fn push_prior_gradient(&self, layout: &ParameterLayout, gradient: &mut [f64], offset: usize) {
        for (i, component) in self.components.iter().enumerate() {
            component.add_gradient_of_log_prior_term(gradient, offset + layout.block_offset(i));
        }
        self.core
            .add_hidden_prior_gradient(gradient, offset + layout.hidden_offset());
    }

    pub fn is_initialized(&self) -> bool {
        self.layout.is_some() && self.components.iter().all(SequenceScore::is_initialized)
    }

    /// Draws every component and the hidden block from their priors.
    ///
    /// # Errors
    ///
    /// Propagates sampling errors.
    pub fn initialize_randomly<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), MixtureError> {
        for component in &mut self.components {
            component.initialize_randomly(rng)?;
        }
        let norms = self.component_log_norms();
        self.core.initialize_hidden_randomly(rng, &norms)?;
        self.refresh_layout();
        Ok(())
    }

    /// Plug-in initialization: random soft assignments refined by a few
    /// rounds of re-estimation.
    ///
    /// # Errors
    ///
    /// Propagates estimation and sampling errors.
    pub fn initialize_using_plug_in<R: Rng + ?Sized>(
        &mut self,
        data: &DataSet,
        weights: &[f64],
        rng: &mut R,
    ) -> Result<(), MixtureError> {
        self.check_data(data)?;
        let mut responsibilities = self.initial_responsibilities(
            data,
            weights,
            Initialization::dirichlet(),
            rng,
        )?;
        for round in 0..PLUG_IN_ROUNDS {
            self.maximization(data, weights, &responsibilities)?;
            if round + 1 < PLUG_IN_ROUNDS {
                responsibilities = self.expectation(data, weights)?.0;
            }
        }
        log::debug!(
            "plug-in initialized a {}-component mixture on {} sequences",
            self.components.len(),
            data.len()
        );
        Ok(())
    }

    fn segment_end(&self, sequence: &Sequence) -> usize {
        if self.length == 0 {
            sequence.len()
        } else {
            self.length
        }
    }

    /// Re-estimates components and hidden block from per-segment
    /// responsibilities `responsibilities[n][i]`.
    fn maximize_segments(
        &mut self,
        segments: &[WeightedSegment<'_>],
        responsibilities: &[Vec<f64>],
    ) -> Result<(), MixtureError> {
        let k = self.components.len();
        let mut statistics = vec![0.0; k];
        for (i, component) in self.components.iter_mut().enumerate() {
            let weighted: Vec<WeightedSegment<'_>> = segments
                .iter()
                .zip(responsibilities)
                .filter(|(_, r)| r[i] > MIN_SEGMENT_WEIGHT)
                .map(|(segment, r)| WeightedSegment {
                    weight: r[i],
                    ..*segment
                })
                .collect();
            statistics[i] = weighted.iter().map(|segment| segment.weight).sum();
            component.estimate(&weighted)?;
        }
        let norms = self.component_log_norms();
        self.core
            .compute_hidden_parameter(&statistics, true, &norms)?;
        self.refresh_layout();
        Ok(())
    }
}

impl<C: SequenceScore> SequenceScore for MixtureModel<C> {
    fn length(&self) -> usize {
        self.length
    }

    fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    fn log_score(&self, sequence: &Sequence, start: usize, end: usize) -> f64 {
        self.score_segment(sequence, start, end, &mut self.new_scratch())
    }

    fn log_score_and_gradient(
        &self,
        sequence: &Sequence,
        start: usize,
        end: usize,
        gradient: &mut SparseGradient,
    ) -> f64 {
        self.score_and_gradient_segment(sequence, start, end, &mut self.new_scratch(), gradient)
    }

    fn parameter_count(&self) -> Option<usize> {
        self.number_of_parameters()
    }

    fn parameters(&self) -> Result<Vec<f64>, MixtureError> {
        self.current_parameter_values()
    }

    fn set_parameters(&mut self, params: &[f64], offset: usize) -> Result<(), MixtureError> {
        MixtureModel::set_parameters(self, params, offset)
    }

    fn is_normalized(&self) -> bool {
        self.core.is_normalized()
    }

    fn log_normalization_constant(&self) -> f64 {
        MixtureModel::log_normalization_constant(self)
    }

    fn add_gradient_of_log_normalization_constant(
        &self,
        gradient: &mut [f64],
        offset: usize,
        factor: f64,
    ) {
        match self.layout.as_ref() {
            Some(layout) => self.push_normalization_gradient(layout, gradient, offset, factor),
            None => log::error!(
                "normalization gradient requested from a mixture with unresolved parameters"
            ),
        }
    }

    fn log_prior_term(&self) -> f64 {
        MixtureModel::log_prior_term(self)
    }

    fn add_gradient_of_log_prior_term(&self, gradient: &mut [f64], offset: usize) {
        match self.layout.as_ref() {
            Some(layout) => self.push_prior_gradient(layout, gradient, offset),
            None => {
                log::error!("prior gradient requested from a mixture with unresolved parameters")
            }
        }
    }

    fn ess(&self) -> f64 {
        self.core.ess()
    }

    fn is_initialized(&self) -> bool {
        MixtureModel::is_initialized(self)
    }

    /// One EM step over the given segments.
    fn estimate(&mut self, segments: &[WeightedSegment<'_>]) -> Result<(), MixtureError> {
        let k = self.components.len();
        let mut responsibilities = Vec::with_capacity(segments.len());
        for segment in segments {
            let mut scores = vec![0.0; k];
            self.fill_component_scores(segment.sequence, segment.start, segment.end, &mut scores);
            log_sum_normalize(&mut scores);
            scores.iter_mut().for_each(|r| *r *= segment.weight);
            responsibilities.push(scores);
        }
        self.maximize_segments(segments, &responsibilities)
    }

    /// Plug-in initialization with a fixed seed.
    fn initialize_from_data(
        &mut self,
        data: &DataSet,
        weights: &[f64],
    ) -> Result<(), MixtureError> {
        let mut rng = StdRng::seed_from_u64(0);
        self.initialize_using_plug_in(data, weights, &mut rng)
    }

    fn initialize_randomly<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), MixtureError> {
        MixtureModel::initialize_randomly(self, rng)
    }
}

impl<C: SequenceScore> EmModel for MixtureModel<C> {
    /// `responsibilities[n][i]`, already multiplied by the sequence weight.
    type Responsibilities = Vec<Vec<f64>>;

    fn check_data(&self, data: &DataSet) -> Result<(), MixtureError> {
        if data.alphabet_size() != self.alphabet_size {
            return Err(MixtureError::Configuration(format!(
                "data alphabet size {} does not match the model's {}",
                data.alphabet_size(),
                self.alphabet_size
            )));
        }
        if self.length > 0 {
            if let Some(short) = data.iter().find(|sequence| sequence.len() < self.length) {
                return Err(MixtureError::LengthMismatch {
                    expected: self.length,
                    actual: short.len(),
                });
            }
        }
        Ok(())
    }

    fn randomize<R: Rng + ?Sized>(
        &mut self,
        _: &DataSet,
        _: &[f64],
        rng: &mut R,
    ) -> Result<(), MixtureError> {
        MixtureModel::initialize_randomly(self, rng)
    }

    fn initial_responsibilities<R: Rng + ?Sized>(
        &self,
        data: &DataSet,
        weights: &[f64],
        initialization: Initialization,
        rng: &mut R,
    ) -> Result<Self::Responsibilities, MixtureError> {
        let k = self.components.len();
        match initialization {
            Initialization::Prior => Ok(self.expectation(data, weights)?.0),
            Initialization::Dirichlet { alpha } => weights
                .iter()
                .map(|&weight| {
                    let mut draw = sample_dirichlet(&vec![alpha; k], rng)?;
                    draw.iter_mut().for_each(|r| *r *= weight);
                    Ok(draw)
                })
                .collect(),
            Initialization::UniformPlacement => Ok(weights
                .iter()
                .map(|&weight| vec![weight / k as f64; k])
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
        let k = self.components.len();
        let log_norm = MixtureModel::log_normalization_constant(self);
        let mut log_likelihood = 0.0;
        let mut responsibilities = Vec::with_capacity(data.len());
        for (sequence, &weight) in data.iter().zip(weights) {
            let mut scores = vec![0.0; k];
            self.fill_component_scores(sequence, 0, self.segment_end(sequence), &mut scores);
            let total = log_sum_normalize(&mut scores);
            scores.iter_mut().for_each(|r| *r *= weight);
            if weight != 0.0 {
                log_likelihood += weight * (total - log_norm);
            }
            responsibilities.push(scores);
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
        let segments: Vec<WeightedSegment<'_>> = data
            .iter()
            .map(|sequence| WeightedSegment::new(sequence, 0, self.segment_end(sequence), 1.0))
            .collect();
        self.maximize_segments(&segments, responsibilities)
    }

    fn log_prior_term(&self) -> f64 {
        MixtureModel::log_prior_term(self)
    }
}

impl<C: SequenceScore + fmt::Display> fmt::Display for MixtureModel<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "component {i} (p={:.3}):", self.core.potentials()[i])?;
            write!(f, "{component}")?;
        }
        Ok(())
    }
}
