//! BatchRun Executor
//!
//! Runs a batch of independent tasks in parallel under one shared deadline:
//! - One runner per task races its body against the deadline
//! - Outcomes fan back in through a single aggregator
//! - The aggregator closes once a completion countdown reaches zero
//!
//! Per-task failures and cancellations are data in the returned
//! [`BatchSummary`]; only a batch that cannot be drained is an error.

pub mod aggregator;
pub mod body;
pub mod config;
pub mod deadline;
pub mod error;
pub mod generator;
pub mod orchestrator;
pub mod runner;
pub mod tracker;

use std::time::Duration;

use batchrun_core::{BatchSummary, TaskSpec};

// Re-export commonly used types
pub use aggregator::{OutcomeSink, OutcomeStream, ResultAggregator};
pub use body::{SimulatedBody, TaskBody};
pub use config::{ExecutorConfig, MIN_LIVENESS_GRACE};
pub use deadline::{DeadlineController, DeadlineSignal};
pub use error::{ExecutorError, TaskFailure};
pub use generator::{random_batch, BatchProfile};
pub use orchestrator::Orchestrator;
pub use runner::TaskRunner;
pub use tracker::CompletionTracker;

/// Run `tasks` with the simulated body and default configuration.
///
/// Shorthand for `Orchestrator::default().submit_batch(tasks, deadline)`.
pub async fn submit_batch(
    tasks: Vec<TaskSpec>,
    deadline: Duration,
) -> Result<BatchSummary, ExecutorError> {
    Orchestrator::default().submit_batch(tasks, deadline).await
}
