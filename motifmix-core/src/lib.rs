//! # MotifMix - Mixture Scoring and EM Training
//!
//! A Rust engine for scoring sequences with mixtures of probabilistic
//! component models and for discovering hidden motifs with multi-start
//! expectation maximization.
//!
//! ## Overview
//!
//! A mixture combines several sequence-scoring components under a
//! categorical hidden variable. Every score is computed in log space and is
//! differentiable, so the same models can be trained by EM or handed to an
//! external gradient-based optimizer. The motif occurrence model specializes
//! the mixture into zero-or-one (ZOOPS) or exactly-one (OOPS) motif
//! occurrence per sequence, marginalizing over the unknown start offset
//! under a position prior.
//!
//! ## Features
//!
//! - **Two hidden parameterizations**: constrained simplex or unnormalized
//!   potentials with a lazily cached normalization constant
//! - **Sparse gradients**: per-window gradients over nested components
//! - **ZOOPS/OOPS motif model**: background flanks of any Markov order,
//!   uniform or Gaussian position priors, motif resizing
//! - **Multi-start EM**: Dirichlet or prior initialization, phase-shift
//!   correction, optional parallel starts using Rayon
//! - **Type Safety**: Compile-time separation of untrained and trained
//!   discovery runs
//!
//! ## Quick Start
//!
//! ```rust
//! use motifmix_core::config::{DiscoveryConfig, EmConfig, OccurrenceMode};
//! use motifmix_core::engine::UntrainedDiscovery;
//! use motifmix_core::sequence::Alphabet;
//!
//! let data = Alphabet::dna().encode_all(&[
//!     "GGTACGATCC", "TTACGATGGA", "CCCTACGATA", "ATGCATCCGT",
//! ])?;
//!
//! let config = DiscoveryConfig {
//!     motif_widths: vec![5],
//!     occurrence: OccurrenceMode::Sometimes,
//!     em: EmConfig {
//!         starts: 2,
//!         seed: Some(7),
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//!
//! let trained = UntrainedDiscovery::with_config(config)?.train(&data, None)?;
//! let probabilities = trained.component_probabilities(&data.sequences()[0])?;
//! println!("P(motif) = {:.3}", probabilities[0]);
//! # Ok::<(), motifmix_core::types::MixtureError>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`config`]: Trainer and discovery settings
//! - [`constants`]: Numerical defaults and tolerances
//! - [`types`]: Error type, parameterizations and sparse gradients
//! - [`math`]: Log-space arithmetic and Dirichlet sampling
//! - [`sequence`]: Alphabets, encoded sequences and data sets
//! - [`scoring`]: Component models (PWM, Markov background, uniform)
//! - [`duration`]: Position priors over motif start offsets
//! - [`mixture`]: Hidden-variable core and the generic mixture model
//! - [`motif`]: ZOOPS/OOPS motif occurrence model
//! - [`objective`]: Log posterior and gradient for external optimizers
//! - [`training`]: Multi-start EM and stopping predicates
//! - [`results`]: Training reports
//! - [`engine`]: Type-state motif discovery driver
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, MixtureError>`](types::MixtureError),
//! reporting:
//!
//! - Invalid model structure (naming the offending component or motif)
//! - Windows or weight vectors of the wrong length
//! - Parameters requested before every dimension is known
//! - NaN objectives, which abort only the affected EM start

pub mod config;
pub mod constants;
pub mod duration;
pub mod engine;
pub mod math;
pub mod mixture;
pub mod motif;
pub mod objective;
pub mod results;
pub mod scoring;
pub mod sequence;
pub mod training;
pub mod types;

pub use engine::{TrainedDiscovery, UntrainedDiscovery};
pub use mixture::MixtureModel;
pub use motif::MotifOccurrenceModel;
pub use training::EmTrainer;
pub use types::MixtureError;
