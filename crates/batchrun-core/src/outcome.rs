//! Terminal result of one task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OutcomeStatus, TaskId};

/// Error detail recorded when a task's own work reports failure.
pub const DOMAIN_FAILURE: &str = "domain failure";

/// Error detail recorded when the batch deadline wins the race.
pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// The classified result of one task, produced exactly once by its runner.
///
/// There are no setters: an Outcome is built in its final status and only
/// read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Task that produced this outcome.
    pub task_id: TaskId,

    /// Final status.
    pub status: OutcomeStatus,

    /// Result payload (Success only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    /// Error detail (Failed/Cancelled only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,

    /// Time from the runner starting to race until resolution.
    pub elapsed_ms: u64,

    /// When the race resolved.
    pub resolved_at: DateTime<Utc>,
}

impl Outcome {
    fn new(
        task_id: TaskId,
        status: OutcomeStatus,
        payload: Option<String>,
        error_detail: Option<String>,
    ) -> Self {
        Self {
            task_id,
            status,
            payload,
            error_detail,
            elapsed_ms: 0,
            resolved_at: Utc::now(),
        }
    }

    /// The task body finished first and succeeded.
    pub fn success(task_id: TaskId, payload: impl Into<String>) -> Self {
        Self::new(task_id, OutcomeStatus::Success, Some(payload.into()), None)
    }

    /// The task body finished first and reported a domain failure.
    pub fn failed(task_id: TaskId, detail: impl Into<String>) -> Self {
        Self::new(task_id, OutcomeStatus::Failed, None, Some(detail.into()))
    }

    /// The batch deadline fired first.
    pub fn cancelled(task_id: TaskId) -> Self {
        Self::new(
            task_id,
            OutcomeStatus::Cancelled,
            None,
            Some(DEADLINE_EXCEEDED.to_string()),
        )
    }

    /// Builder method to record how long the race took.
    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
}
