use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Progress of an iterative optimization, handed to a
/// [`StoppingPredicate`] once per outer iteration.
#[derive(Debug, Clone, Copy)]
pub struct IterationContext<'a> {
    /// Iterations completed so far, starting at 1.
    pub iteration: usize,
    /// Objective before the last iteration.
    pub previous: f64,
    /// Objective after the last iteration.
    pub current: f64,
    /// Gradient at the current point, if the optimizer has one.
    pub gradient: Option<&'a [f64]>,
    /// Last search direction, if the optimizer has one.
    pub direction: Option<&'a [f64]>,
    /// Last step size; `None` for EM.
    pub step_size: Option<f64>,
    /// Wall-clock time since the run started.
    pub elapsed: Duration,
}

impl<'a> IterationContext<'a> {
    /// Context of a gradient-free method such as EM.
    pub fn new(iteration: usize, previous: f64, current: f64, elapsed: Duration) -> Self {
        Self {
            iteration,
            previous,
            current,
            gradient: None,
            direction: None,
            step_size: None,
            elapsed,
        }
    }
}

/// Decides after every iteration whether an optimization keeps running.
///
/// Predicates are shared between parallel EM starts and therefore must be
/// `Send + Sync`; they must not keep per-run state.
pub trait StoppingPredicate: Send + Sync + fmt::Debug {
    fn should_continue(&self, context: &IterationContext<'_>) -> bool;
}

/// Stops after a fixed number of iterations.
#[derive(Debug, Clone, Copy)]
pub struct MaxIterations(pub usize);

impl StoppingPredicate for MaxIterations {
    fn should_continue(&self, context: &IterationContext<'_>) -> bool {
        context.iteration < self.0
    }
}

/// Stops once the objective changes by less than `epsilon`.
#[derive(Debug, Clone, Copy)]
pub struct SmallDifference(pub f64);

impl StoppingPredicate for SmallDifference {
    fn should_continue(&self, context: &IterationContext<'_>) -> bool {
        // a NaN difference compares false and stops the run
        (context.current - context.previous).abs() >= self.0
    }
}

/// Stops once the run has taken longer than the limit.
#[derive(Debug, Clone, Copy)]
pub struct TimeLimit(pub Duration);

impl StoppingPredicate for TimeLimit {
    fn should_continue(&self, context: &IterationContext<'_>) -> bool {
        context.elapsed < self.0
    }
}

/// Cooperative cancellation, checked once per iteration.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use motifmix_core::training::{Cancellation, IterationContext, StoppingPredicate};
///
/// let cancellation = Cancellation::new();
/// let context = IterationContext::new(1, -10.0, -9.0, Duration::ZERO);
/// assert!(cancellation.should_continue(&context));
///
/// cancellation.cancel();
/// assert!(!cancellation.should_continue(&context));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares an existing flag, for example one set by a signal handler.
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl StoppingPredicate for Cancellation {
    fn should_continue(&self, _: &IterationContext<'_>) -> bool {
        !self.is_cancelled()
    }
}

/// How a [`CombinedCondition`] merges its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combination {
    /// Stop as soon as any member stops.
    Any,
    /// Stop only once every member stops.
    All,
}

/// Several predicates merged into one.
#[derive(Debug, Clone)]
pub struct CombinedCondition {
    combination: Combination,
    conditions: Vec<Arc<dyn StoppingPredicate>>,
}

impl CombinedCondition {
    pub fn new(combination: Combination, conditions: Vec<Arc<dyn StoppingPredicate>>) -> Self {
        Self {
            combination,
            conditions,
        }
    }

    /// Stops as soon as any member stops.
    pub fn any(conditions: Vec<Arc<dyn StoppingPredicate>>) -> Self {
        Self::new(Combination::Any, conditions)
    }

    /// Stops only once every member stops.
    pub fn all(conditions: Vec<Arc<dyn StoppingPredicate>>) -> Self {
        Self::new(Combination::All, conditions)
    }
}

impl StoppingPredicate for CombinedCondition {
    fn should_continue(&self, context: &IterationContext<'_>) -> bool {
        match self.combination {
            Combination::Any => self
                .conditions
                .iter()
                .all(|condition| condition.should_continue(context)),
            Combination::All => self
                .conditions
                .iter()
                .any(|condition| condition.should_continue(context)),
        }
    }
}
