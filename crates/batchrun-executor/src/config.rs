//! Executor configuration.

use std::time::Duration;

/// Shortest liveness grace the executor will use.
///
/// Runners woken by the deadline need at least one scheduling pass to report
/// before the drain may give up on them.
pub const MIN_LIVENESS_GRACE: Duration = Duration::from_millis(10);

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// How long past the batch deadline the outcome stream may stay open
    /// before the batch is declared a liveness failure. Also applied from the
    /// moment a runner is seen dropping its outcome slot.
    pub liveness_grace: Duration,
}

impl ExecutorConfig {
    /// Builder method to set the liveness grace period, raised to
    /// [`MIN_LIVENESS_GRACE`] if shorter.
    pub fn with_liveness_grace(mut self, grace: Duration) -> Self {
        self.liveness_grace = grace.max(MIN_LIVENESS_GRACE);
        self
    }

    /// The grace period actually applied, never below [`MIN_LIVENESS_GRACE`].
    pub fn effective_liveness_grace(&self) -> Duration {
        self.liveness_grace.max(MIN_LIVENESS_GRACE)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            liveness_grace: Duration::from_secs(1),
        }
    }
}
