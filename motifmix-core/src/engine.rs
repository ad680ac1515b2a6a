use std::marker::PhantomData;

use crate::config::{DiscoveryConfig, DurationKind};
use crate::duration::{DurationModel, GaussianDuration, UniformDuration};
use crate::motif::{MotifOccurrenceModel, MotifSlot};
use crate::results::TrainingReport;
use crate::scoring::{Component, HomogeneousMarkovModel, PositionWeightMatrix};
use crate::sequence::{DataSet, Sequence};
use crate::training::EmTrainer;
use crate::types::{MixtureError, ProfileKind};

/// Marker trait for the discovery training state.
///
/// Used in the type-state pattern so that scoring is only available once a
/// model has been trained. Implemented by [`Untrained`] and [`Trained`].
pub trait TrainingState {}

/// Marker type of a discovery run that has not seen data yet.
#[derive(Debug, Clone)]
pub struct Untrained;

/// Marker type of a discovery run holding a trained model.
#[derive(Debug, Clone)]
pub struct Trained;

impl TrainingState for Untrained {}
impl TrainingState for Trained {}

/// Motif discovery driver: builds a [`MotifOccurrenceModel`] from a
/// [`DiscoveryConfig`] and trains it with multi-start EM.
///
/// # Type Parameters
///
/// * `S` - The training state, either [`Untrained`] or [`Trained`]
///
/// # Examples
///
/// ```rust
/// use motifmix_core::config::{DiscoveryConfig, EmConfig};
/// use motifmix_core::engine::UntrainedDiscovery;
/// use motifmix_core::sequence::Alphabet;
///
/// let data = Alphabet::dna().encode_all(&[
///     "CCTATAGG", "TATAGGCC", "GCTATACG", "ATATAGCC",
/// ])?;
/// let config = DiscoveryConfig {
///     motif_widths: vec![4],
///     em: EmConfig {
///         starts: 2,
///         seed: Some(1),
///         ..Default::default()
///     },
///     ..Default::default()
/// };
///
/// let trained = UntrainedDiscovery::with_config(config)?.train(&data, None)?;
/// assert!(trained.score(&data.sequences()[0])?.is_finite());
/// # Ok::<(), motifmix_core::types::MixtureError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MotifDiscovery<S: TrainingState> {
    /// Model structure and trainer settings
    pub config: DiscoveryConfig,
    model: Option<MotifOccurrenceModel>,
    report: Option<TrainingReport>,
    _state: PhantomData<S>,
}

/// A discovery run ready to be trained.
pub type UntrainedDiscovery = MotifDiscovery<Untrained>;

/// A discovery run holding a trained model and its report.
pub type TrainedDiscovery = MotifDiscovery<Trained>;

impl Default for UntrainedDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl UntrainedDiscovery {
    /// A discovery run with the default configuration.
    pub fn new() -> Self {
        Self {
            config: DiscoveryConfig::default(),
            model: None,
            report: None,
            _state: PhantomData,
        }
    }

    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] for an invalid configuration.
    pub fn with_config(config: DiscoveryConfig) -> Result<Self, MixtureError> {
        config.validate()?;
        Ok(Self {
            config,
            model: None,
            report: None,
            _state: PhantomData,
        })
    }

    /// Builds the untrained model for `data`: windows span the shortest
    /// sequence and every motif may start anywhere it fits.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] for empty data or a motif
    /// wider than the shortest sequence.
    pub fn build_model(&self, data: &DataSet) -> Result<MotifOccurrenceModel, MixtureError> {
        if data.is_empty() {
            return Err(MixtureError::Configuration(
                "cannot build a motif model without sequences".to_string(),
            ));
        }
        let length = data.min_length();
        let alphabet_size = data.alphabet_size();

        let mut slots = Vec::with_capacity(self.config.motif_widths.len());
        for (index, &width) in self.config.motif_widths.iter().enumerate() {
            if width > length {
                return Err(MixtureError::Configuration(format!(
                    "motif {index} of width {width} does not fit sequences of length {length}"
                )));
            }
            let duration: DurationModel = match self.config.duration {
                DurationKind::Uniform => UniformDuration::new(0, length - width)?.into(),
                DurationKind::Gaussian => {
                    GaussianDuration::new(0, length - width, self.config.motif_ess)?.into()
                }
            };
            let motif = PositionWeightMatrix::new(width, alphabet_size, self.config.motif_ess);
            slots.push(MotifSlot::new(Component::from(motif), duration));
        }

        let background = HomogeneousMarkovModel::new(
            self.config.background_order,
            alphabet_size,
            self.config.background_ess,
        );
        Ok(MotifOccurrenceModel::new(
            slots,
            background,
            self.config.occurrence,
            length,
            self.config.parameterization,
        )?
        .with_background_training(self.config.train_background))
    }

    /// Builds a model for `data` and trains it with the configured EM
    /// settings.
    ///
    /// # Returns
    ///
    /// A [`TrainedDiscovery`] holding the best start's model and the
    /// per-start report.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] for unusable data,
    /// [`MixtureError::Unsupported`] for Gibbs sampling and
    /// [`MixtureError::AllStartsFailed`] if every start failed.
    pub fn train(
        &self,
        data: &DataSet,
        weights: Option<&[f64]>,
    ) -> Result<TrainedDiscovery, MixtureError> {
        let trainer = EmTrainer::new(self.config.em.clone())?;
        let mut model = self.build_model(data)?;
        log::info!(
            "Discovering {} motif(s) of width {:?} in windows of length {}",
            self.config.motif_widths.len(),
            self.config.motif_widths,
            model.length()
        );
        let report = trainer.train(&mut model, data, weights)?;

        Ok(MotifDiscovery {
            config: self.config.clone(),
            model: Some(model),
            report: Some(report),
            _state: PhantomData,
        })
    }
}

impl TrainedDiscovery {
    fn trained_model(&self) -> Result<&MotifOccurrenceModel, MixtureError> {
        self.model.as_ref().ok_or_else(|| {
            MixtureError::Uninitialized("discovery run holds no trained model".to_string())
        })
    }

    pub fn model(&self) -> Option<&MotifOccurrenceModel> {
        self.model.as_ref()
    }

    pub fn report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }

    /// Consumes the run and hands out the trained model.
    pub fn into_model(self) -> Option<MotifOccurrenceModel> {
        self.model
    }

    /// Log score of the first window of `sequence`.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::LengthMismatch`] if the sequence is shorter
    /// than the model's window.
    pub fn score(&self, sequence: &Sequence) -> Result<f64, MixtureError> {
        self.trained_model()?.score(sequence, 0)
    }

    /// Posterior over the motif components (and "no motif") for the first
    /// window of `sequence`.
    ///
    /// # Errors
    ///
    /// See [`score`](Self::score).
    pub fn component_probabilities(&self, sequence: &Sequence) -> Result<Vec<f64>, MixtureError> {
        self.trained_model()?.component_probabilities(sequence, 0)
    }

    /// Posterior over the start offsets of `motif` in a sequence exactly one
    /// window long.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::MotifIndexOutOfBounds`] for an unknown motif
    /// and [`MixtureError::LengthMismatch`] for a sequence of another length.
    pub fn placement_probabilities(
        &self,
        motif: usize,
        sequence: &Sequence,
    ) -> Result<Vec<f64>, MixtureError> {
        let profile = self.trained_model()?.profile(
            motif,
            sequence,
            0,
            ProfileKind::NormalizedConditional,
        )?;
        Ok(profile.into_iter().map(f64::exp).collect())
    }
}
