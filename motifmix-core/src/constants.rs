// =============================================================================
// EM TRAINING
// =============================================================================

/// Default number of independent EM starts
pub const DEFAULT_STARTS: usize = 3;

/// Default iteration cap for a single EM run
pub const DEFAULT_MAX_ITERATIONS: usize = 200;

/// Default minimal objective improvement that keeps EM iterating
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// Default cap on phase-shift correction rounds per start
pub const DEFAULT_MAX_PHASE_SHIFT_ROUNDS: usize = 10;

/// Relative improvement a non-zero phase shift must exceed to be accepted
pub const PHASE_SHIFT_TOLERANCE: f64 = 1e-9;

/// Responsibilities below this are skipped when building weighted segments
pub const MIN_SEGMENT_WEIGHT: f64 = 1e-12;

// =============================================================================
// INITIALIZATION
// =============================================================================

/// Number of soft-assignment rounds used by plug-in mixture initialization
pub const PLUG_IN_ROUNDS: usize = 3;

/// Probability mass given to the seed window's symbols when seeding a motif
pub const SEED_CONSENSUS: f64 = 0.9;

/// Default Dirichlet concentration for random responsibilities
pub const DEFAULT_DIRICHLET_ALPHA: f64 = 1.0;

// =============================================================================
// MODEL DEFAULTS
// =============================================================================

/// Default motif width used by the discovery engine
pub const DEFAULT_MOTIF_WIDTH: usize = 8;

/// Default equivalent sample size of each motif
pub const DEFAULT_MOTIF_ESS: f64 = 4.0;

/// Default equivalent sample size of the background model
pub const DEFAULT_BACKGROUND_ESS: f64 = 4.0;

/// Smallest variance accepted when re-estimating a Gaussian duration
pub const MIN_DURATION_VARIANCE: f64 = 0.25;

/// Standard deviation a Gaussian duration prior pulls towards, as a fraction
/// of the domain width
pub const DURATION_PRIOR_SPREAD: f64 = 0.25;
