//! Task bodies.
//!
//! The executor treats a task body as a black box that takes some time and
//! then reports a payload or a failure. Backends such as cache lookups, row
//! reads or queue pops plug in by implementing [`TaskBody`].

use async_trait::async_trait;
use batchrun_core::TaskSpec;

use crate::error::TaskFailure;

/// Work performed for one task.
///
/// Implementations must be cancel-safe: when the batch deadline wins the race
/// the future is dropped at its current await point.
#[async_trait]
pub trait TaskBody: Send + Sync {
    /// Run the work for `spec`, returning a payload on success.
    async fn execute(&self, spec: &TaskSpec) -> Result<String, TaskFailure>;
}

/// Sleeps for the task's nominal duration, then succeeds or fails according
/// to its `failure_injected` flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedBody;

#[async_trait]
impl TaskBody for SimulatedBody {
    async fn execute(&self, spec: &TaskSpec) -> Result<String, TaskFailure> {
        tokio::time::sleep(spec.nominal_duration()).await;

        if spec.failure_injected() {
            Err(TaskFailure::domain())
        } else {
            Ok(format!("task {} success", spec.id()))
        }
    }
}
