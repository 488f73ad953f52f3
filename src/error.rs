//! Crate-level error type.
//!
//! Every validation failure in this crate is synchronous and non-partial:
//! when an operation returns `Err`, no state was mutated. Messages are
//! descriptive on purpose — hosts surface them directly to operators.

use thiserror::Error;

/// Errors surfaced by the lifecycle/experimentation components.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum Error {
    /// A referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of record was looked up ("version", "experiment", "variant").
        kind: &'static str,
        id: String,
    },

    /// An evaluation was recorded with a parameter vector of the wrong length.
    #[error("parameter vector has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Experiment variant weights must sum to 1 (within tolerance).
    #[error("Variant weights must sum to 1 (got {0})")]
    WeightSum(f64),

    /// Every experiment needs a control arm to compare treatments against.
    #[error("At least one variant must be marked as control")]
    NoControlVariant,

    /// An experiment needs at least two variants to be meaningful.
    #[error("experiment needs at least two variants")]
    TooFewVariants,

    /// `start_experiment` was called on an experiment that is already running.
    #[error("experiment {0} is already running")]
    AlreadyRunning(String),

    /// The operation requires a running experiment.
    #[error("experiment {0} is not running")]
    NotRunning(String),

    /// The experiment reached a terminal status (completed/aborted).
    #[error("experiment {0} has ended")]
    ExperimentEnded(String),

    /// Active versions must be demoted before deletion.
    #[error("Cannot delete active version")]
    DeleteActive,

    /// Archived versions are terminal and cannot be re-activated.
    #[error("version {0} is archived")]
    VersionArchived(String),

    /// Only one canary deployment may run per manager instance.
    #[error("a canary deployment is already running")]
    CanaryAlreadyRunning,

    /// The operation requires a running canary deployment.
    #[error("no canary deployment is running")]
    NoCanaryRunning,
}
