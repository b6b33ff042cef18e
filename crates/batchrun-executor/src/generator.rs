//! Random batch generation.

use std::time::Duration;

use batchrun_core::TaskSpec;
use rand::Rng;

use crate::error::ExecutorError;

/// Parameters for a randomly generated batch.
#[derive(Debug, Clone)]
pub struct BatchProfile {
    /// Shortest nominal duration (inclusive).
    pub min_duration: Duration,
    /// Longest nominal duration (inclusive).
    pub max_duration: Duration,
    /// Probability in `[0, 1]` that a task has `failure_injected` set.
    pub failure_rate: f64,
}

impl BatchProfile {
    pub fn new(min_duration: Duration, max_duration: Duration, failure_rate: f64) -> Self {
        Self {
            min_duration,
            max_duration,
            failure_rate,
        }
    }

    /// Check the bounds and the rate.
    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.min_duration > self.max_duration {
            return Err(ExecutorError::InvalidProfile(format!(
                "min duration {:?} exceeds max duration {:?}",
                self.min_duration, self.max_duration
            )));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(ExecutorError::InvalidProfile(format!(
                "failure rate {} is outside [0, 1]",
                self.failure_rate
            )));
        }
        Ok(())
    }
}

impl Default for BatchProfile {
    fn default() -> Self {
        Self {
            min_duration: Duration::from_secs(1),
            max_duration: Duration::from_secs(4),
            failure_rate: 0.2,
        }
    }
}

/// Build `count` specs named `task-1..=task-count`.
///
/// Durations are drawn in whole milliseconds. The failure flag is rolled
/// here, once, and never again during execution.
pub fn random_batch<R: Rng>(
    count: usize,
    profile: &BatchProfile,
    rng: &mut R,
) -> Result<Vec<TaskSpec>, ExecutorError> {
    profile.validate()?;

    let min_ms = profile.min_duration.as_millis() as u64;
    let max_ms = profile.max_duration.as_millis() as u64;

    let specs: Vec<TaskSpec> = (1..=count)
        .map(|i| {
            let duration = Duration::from_millis(rng.gen_range(min_ms..=max_ms));
            TaskSpec::new(format!("task-{i}"), duration)
                .with_failure(rng.gen_bool(profile.failure_rate))
        })
        .collect();

    Ok(specs)
}
