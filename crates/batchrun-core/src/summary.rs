//! Batch summary returned to the caller.

use serde::{Deserialize, Serialize};

use crate::{Outcome, OutcomeStatus, TaskId};

/// Tallies and the full outcome list of one drained batch.
///
/// Outcomes appear in arrival order, which is unrelated to submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub success_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,
    pub outcomes: Vec<Outcome>,
}

impl BatchSummary {
    /// Summary of a batch with no tasks.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Classify an outcome into the tallies and keep it.
    pub fn record(&mut self, outcome: Outcome) {
        match outcome.status {
            OutcomeStatus::Success => self.success_count += 1,
            OutcomeStatus::Failed => self.failed_count += 1,
            OutcomeStatus::Cancelled => self.cancelled_count += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Number of outcomes recorded.
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// True if every outcome was counted in exactly one tally.
    pub fn is_partitioned(&self) -> bool {
        self.success_count + self.failed_count + self.cancelled_count == self.outcomes.len()
    }

    /// Look up the outcome of a task.
    pub fn outcome(&self, task_id: &TaskId) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| &o.task_id == task_id)
    }

    /// Count for one status.
    pub fn count(&self, status: OutcomeStatus) -> usize {
        match status {
            OutcomeStatus::Success => self.success_count,
            OutcomeStatus::Failed => self.failed_count,
            OutcomeStatus::Cancelled => self.cancelled_count,
        }
    }
}
