use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKGROUND_ESS, DEFAULT_DIRICHLET_ALPHA, DEFAULT_EPSILON,
    DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_PHASE_SHIFT_ROUNDS, DEFAULT_MOTIF_ESS,
    DEFAULT_MOTIF_WIDTH, DEFAULT_STARTS,
};
use crate::types::{HiddenParameterization, MixtureError};

/// Training algorithm driving a model's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// Expectation maximization with optional phase-shift correction.
    #[default]
    ExpectationMaximization,
    /// Sampling-based training.
    ///
    /// Not available: selecting it makes [`crate::training::EmTrainer::new`]
    /// fail with [`MixtureError::Unsupported`].
    GibbsSampling,
}

/// How the first responsibilities of an EM start are obtained.
///
/// # Examples
///
/// ```rust
/// use motifmix_core::config::{EmConfig, Initialization};
///
/// let config = EmConfig {
///     initialization: Initialization::Dirichlet { alpha: 0.5 },
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Initialization {
    /// Draw the model parameters from their priors and run a regular E-step.
    #[default]
    Prior,
    /// Draw each sequence's responsibilities from a symmetric Dirichlet.
    Dirichlet {
        /// Concentration of the symmetric Dirichlet.
        alpha: f64,
    },
    /// Spread each sequence's mass uniformly over every component (and every
    /// admissible offset for motif models), leaving nothing to "no motif".
    UniformPlacement,
}

/// Number of motif occurrences a sequence may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OccurrenceMode {
    /// Exactly one motif occurrence per sequence (OOPS).
    Always,
    /// Zero or one occurrence per sequence (ZOOPS); adds a "no motif"
    /// component scored by the background alone.
    #[default]
    Sometimes,
}

/// Family of the position prior attached to every motif.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DurationKind {
    /// Every admissible offset is equally likely.
    #[default]
    Uniform,
    /// A discretized Gaussian with trainable mean and precision.
    Gaussian,
}

/// Settings of the multi-start EM trainer.
///
/// # Examples
///
/// ```rust
/// use motifmix_core::config::EmConfig;
///
/// let config = EmConfig {
///     starts: 5,
///     parallel: true,
///     seed: Some(42),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmConfig {
    /// Number of independent EM starts; the best run is kept.
    ///
    /// **Default**: `3`
    pub starts: usize,

    /// Training algorithm.
    ///
    /// **Default**: [`Algorithm::ExpectationMaximization`]
    pub algorithm: Algorithm,

    /// Source of the first responsibilities of each start.
    ///
    /// **Default**: [`Initialization::Prior`]
    pub initialization: Initialization,

    /// Whether converged runs are checked for motif phase shifts.
    ///
    /// **Default**: `true`
    pub correct_phase_shift: bool,

    /// Maximum number of accepted phase shifts per start.
    ///
    /// **Default**: `10`
    pub max_phase_shift_rounds: usize,

    /// Iteration cap of a single EM run (between two phase-shift searches).
    ///
    /// **Default**: `200`
    pub max_iterations: usize,

    /// An EM run stops once the objective improves by less than this.
    ///
    /// **Default**: `1e-6`
    pub epsilon: f64,

    /// Seed of the first start; start `i` uses `seed + i`. Random if `None`.
    ///
    /// **Default**: `None`
    pub seed: Option<u64>,

    /// Run independent starts on worker threads, each on its own clone.
    ///
    /// **Default**: `false`
    pub parallel: bool,

    /// Size of a dedicated thread pool for parallel starts. Uses the global
    /// rayon pool when `None`.
    ///
    /// **Default**: `None`
    pub num_threads: Option<usize>,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            starts: DEFAULT_STARTS,
            algorithm: Algorithm::default(),
            initialization: Initialization::default(),
            correct_phase_shift: true,
            max_phase_shift_rounds: DEFAULT_MAX_PHASE_SHIFT_ROUNDS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            epsilon: DEFAULT_EPSILON,
            seed: None,
            parallel: false,
            num_threads: None,
        }
    }
}

impl EmConfig {
    /// Checks the settings for values no EM run could honor.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] naming the offending field.
    pub fn validate(&self) -> Result<(), MixtureError> {
        if self.starts == 0 {
            return Err(MixtureError::Configuration(
                "starts must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(MixtureError::Configuration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.epsilon.is_nan() || self.epsilon < 0.0 {
            return Err(MixtureError::Configuration(format!(
                "epsilon must be non-negative, got {}",
                self.epsilon
            )));
        }
        if let Initialization::Dirichlet { alpha } = self.initialization {
            if alpha.is_nan() || alpha <= 0.0 {
                return Err(MixtureError::Configuration(format!(
                    "Dirichlet initialization needs a positive alpha, got {alpha}"
                )));
            }
        }
        if self.num_threads == Some(0) {
            return Err(MixtureError::Configuration(
                "num_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Initialization {
    /// Symmetric Dirichlet initialization with the default concentration.
    pub fn dirichlet() -> Self {
        Self::Dirichlet {
            alpha: DEFAULT_DIRICHLET_ALPHA,
        }
    }
}

/// Structure and training settings of a motif discovery run.
///
/// # Examples
///
/// ```rust
/// use motifmix_core::config::{DiscoveryConfig, OccurrenceMode};
///
/// let config = DiscoveryConfig {
///     motif_widths: vec![6, 10],
///     occurrence: OccurrenceMode::Always,
///     background_order: 1,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Width of every motif slot, one entry per motif.
    ///
    /// **Default**: `[8]`
    pub motif_widths: Vec<usize>,

    /// Occurrence semantics.
    ///
    /// **Default**: [`OccurrenceMode::Sometimes`]
    pub occurrence: OccurrenceMode,

    /// Markov order of the flanking background model.
    ///
    /// **Default**: `0`
    pub background_order: usize,

    /// Equivalent sample size of each motif's Dirichlet prior.
    ///
    /// **Default**: `4.0`
    pub motif_ess: f64,

    /// Equivalent sample size of the background's Dirichlet prior.
    ///
    /// **Default**: `4.0`
    pub background_ess: f64,

    /// Position prior family.
    ///
    /// **Default**: [`DurationKind::Uniform`]
    pub duration: DurationKind,

    /// Whether the background is re-estimated during EM.
    ///
    /// **Default**: `true`
    pub train_background: bool,

    /// Hidden-parameter parameterization.
    ///
    /// **Default**: [`HiddenParameterization::Free`]
    pub parameterization: HiddenParameterization,

    /// Trainer settings.
    pub em: EmConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            motif_widths: vec![DEFAULT_MOTIF_WIDTH],
            occurrence: OccurrenceMode::default(),
            background_order: 0,
            motif_ess: DEFAULT_MOTIF_ESS,
            background_ess: DEFAULT_BACKGROUND_ESS,
            duration: DurationKind::default(),
            train_background: true,
            parameterization: HiddenParameterization::default(),
            em: EmConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    /// Checks structure and trainer settings.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::Configuration`] naming the offending motif or
    /// field.
    pub fn validate(&self) -> Result<(), MixtureError> {
        if self.motif_widths.is_empty() {
            return Err(MixtureError::Configuration(
                "at least one motif width is required".to_string(),
            ));
        }
        if let Some(index) = self.motif_widths.iter().position(|&width| width == 0) {
            return Err(MixtureError::Configuration(format!(
                "motif {index} has width 0"
            )));
        }
        if [self.motif_ess, self.background_ess]
            .iter()
            .any(|ess| ess.is_nan() || *ess < 0.0) {
            return Err(MixtureError::Configuration(
                "equivalent sample sizes must be non-negative".to_string(),
            ));
        }
        self.em.validate()
    }
}
