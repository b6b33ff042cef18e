//! Executor errors.

use batchrun_core::{CoreError, TaskId};
use thiserror::Error;

/// Batch-level errors returned by the executor.
///
/// Per-task failures and deadline cancellations are never reported here;
/// they are recorded in the task's `Outcome`.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Two specs in one batch share an id.
    #[error("Duplicate task id in batch: {0}")]
    DuplicateTaskId(TaskId),

    /// The outcome stream did not close within the grace period.
    #[error(
        "Liveness failure: received {received} of {expected} outcomes, missing {missing:?}"
    )]
    LivenessFailure {
        expected: usize,
        received: usize,
        missing: Vec<TaskId>,
    },

    /// A task id produced a second outcome.
    #[error("Outcome delivered twice for task {0}")]
    DuplicateOutcome(TaskId),

    /// Random batch parameters are unusable.
    #[error("Invalid batch profile: {0}")]
    InvalidProfile(String),

    /// Domain error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// A task body's own failure, recorded as the outcome's error detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TaskFailure(String);

impl TaskFailure {
    /// Create a failure with a custom detail.
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }

    /// The failure reported by tasks with `failure_injected` set.
    pub fn domain() -> Self {
        Self(batchrun_core::DOMAIN_FAILURE.to_string())
    }

    pub fn detail(&self) -> &str {
        &self.0
    }
}
