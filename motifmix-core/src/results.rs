use serde::Serialize;

/// Outcome of a single independent EM start.
///
/// A start either converged to an objective value or failed with a numerical
/// or estimation error; failed starts are reported but never selected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartSummary {
    /// Position of the start in `0..starts`.
    pub index: usize,

    /// Seed of the start's random number generator.
    pub seed: u64,

    /// Final log posterior (log likelihood plus log prior), `None` if the
    /// start failed.
    pub objective: Option<f64>,

    /// EM iterations summed over every run of the start, including the runs
    /// after accepted phase shifts.
    pub iterations: usize,

    /// Number of accepted non-zero phase shifts.
    pub phase_shifts: usize,

    /// Error message of a failed start.
    pub error: Option<String>,
}

impl StartSummary {
    pub fn succeeded(&self) -> bool {
        self.objective.is_some()
    }
}

/// Summary of a multi-start EM training run.
///
/// # Examples
///
/// ```rust
/// # use motifmix_core::results::{StartSummary, TrainingReport};
/// let report = TrainingReport {
///     starts: vec![
///         StartSummary {
///             index: 0,
///             seed: 7,
///             objective: Some(-120.5),
///             iterations: 14,
///             phase_shifts: 1,
///             error: None,
///         },
///         StartSummary {
///             index: 1,
///             seed: 8,
///             objective: None,
///             iterations: 3,
///             phase_shifts: 0,
///             error: Some("Numerical error: NaN objective".to_string()),
///         },
///     ],
///     best_start: 0,
///     best_objective: -120.5,
/// };
///
/// assert_eq!(report.failed_starts(), 1);
/// assert_eq!(report.total_iterations(), 17);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    /// Every start in index order.
    pub starts: Vec<StartSummary>,

    /// Index of the start whose parameters were kept.
    pub best_start: usize,

    /// Objective of the kept start.
    pub best_objective: f64,
}

impl TrainingReport {
    pub fn failed_starts(&self) -> usize {
        self.starts.iter().filter(|start| !start.succeeded()).count()
    }

    pub fn total_iterations(&self) -> usize {
        self.starts.iter().map(|start| start.iterations).sum()
    }

    pub fn best(&self) -> Option<&StartSummary> {
        self.starts.get(self.best_start)
    }
}
