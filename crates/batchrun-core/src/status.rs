//! Status enums for Outcomes, Runners, and Batches.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Final classification of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    /// The task body finished before the deadline and reported success.
    Success,
    /// The task body finished before the deadline and reported a domain failure.
    Failed,
    /// The batch deadline fired before the task body finished.
    Cancelled,
}

impl OutcomeStatus {
    /// Returns true if the outcome carries an error detail instead of a payload.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single task runner.
///
/// `Pending -> Racing -> {Succeeded | Failed | Cancelled}`. Terminal phases
/// never transition again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerPhase {
    /// Runner created, not yet racing.
    #[default]
    Pending,
    /// Runner is waiting on the task body and the deadline.
    Racing,
    /// Task body won the race with a payload.
    Succeeded,
    /// Task body won the race with a domain failure.
    Failed,
    /// Deadline won the race.
    Cancelled,
}

impl RunnerPhase {
    /// Returns true if the runner is in a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Move to `next`, rejecting skips and moves out of a terminal phase.
    pub fn transition(self, next: RunnerPhase) -> Result<RunnerPhase, CoreError> {
        let allowed = match (self, next) {
            (Self::Pending, Self::Racing) => true,
            (Self::Racing, next) => next.is_terminal(),
            _ => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(invalid(self, next))
        }
    }

    /// Terminal phase matching an outcome status.
    pub fn from_outcome(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Success => Self::Succeeded,
            OutcomeStatus::Failed => Self::Failed,
            OutcomeStatus::Cancelled => Self::Cancelled,
        }
    }
}

/// Lifecycle of a whole batch.
///
/// `Submitted -> Dispatched -> Draining -> Complete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchPhase {
    /// Task specs accepted, nothing started.
    #[default]
    Submitted,
    /// Deadline started and one runner spawned per task.
    Dispatched,
    /// Reader is consuming the outcome stream.
    Draining,
    /// Outcome count equals task count.
    Complete,
}

impl BatchPhase {
    /// Returns true if the batch is in a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Move to the next phase. Only single forward steps are allowed.
    pub fn transition(self, next: BatchPhase) -> Result<BatchPhase, CoreError> {
        let allowed = matches!(
            (self, next),
            (Self::Submitted, Self::Dispatched)
                | (Self::Dispatched, Self::Draining)
                | (Self::Draining, Self::Complete)
        );
        if allowed {
            Ok(next)
        } else {
            Err(invalid(self, next))
        }
    }
}

fn invalid(from: impl fmt::Debug, to: impl fmt::Debug) -> CoreError {
    CoreError::InvalidStateTransition {
        from: format!("{from:?}"),
        to: format!("{to:?}"),
    }
}
