//! Per-task race between the task body and the batch deadline.

use std::sync::Arc;

use batchrun_core::{Outcome, OutcomeStatus, RunnerPhase, TaskSpec};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::aggregator::OutcomeSink;
use crate::body::TaskBody;
use crate::deadline::DeadlineSignal;

/// Resolves exactly one [`TaskSpec`] into exactly one [`Outcome`].
///
/// Tie-break: the deadline wins. The race polls the deadline branch first, so
/// when the body and the deadline are both ready at the same poll the outcome
/// is `Cancelled`. A runner whose deadline has already fired before it starts
/// racing never runs its body.
pub struct TaskRunner {
    spec: TaskSpec,
    signal: DeadlineSignal,
    body: Arc<dyn TaskBody>,
    sink: OutcomeSink,
    phase: RunnerPhase,
}

impl TaskRunner {
    /// Create a runner for `spec`, reporting into `sink`.
    pub fn new(
        spec: TaskSpec,
        signal: DeadlineSignal,
        body: Arc<dyn TaskBody>,
        sink: OutcomeSink,
    ) -> Self {
        Self {
            spec,
            signal,
            body,
            sink,
            phase: RunnerPhase::Pending,
        }
    }

    pub fn phase(&self) -> RunnerPhase {
        self.phase
    }

    /// Race the body against the deadline, deliver the outcome, and return it.
    pub async fn run(mut self) -> Outcome {
        self.advance(RunnerPhase::Racing);
        debug!(
            task_id = %self.spec.id(),
            duration_ms = self.spec.nominal_duration().as_millis() as u64,
            failure_injected = self.spec.failure_injected(),
            "task started"
        );

        let started = Instant::now();
        let outcome = race(&self.spec, &self.signal, self.body.as_ref())
            .await
            .with_elapsed_ms(started.elapsed().as_millis() as u64);

        self.advance(RunnerPhase::from_outcome(outcome.status));
        log_outcome(&outcome);

        let Self { sink, .. } = self;
        sink.deliver(outcome.clone());
        outcome
    }

    fn advance(&mut self, next: RunnerPhase) {
        match self.phase.transition(next) {
            Ok(phase) => self.phase = phase,
            Err(e) => error!(task_id = %self.spec.id(), error = %e, "runner phase rejected"),
        }
    }
}

async fn race(spec: &TaskSpec, signal: &DeadlineSignal, body: &dyn TaskBody) -> Outcome {
    let task_id = spec.id().clone();

    if signal.is_expired() {
        return Outcome::cancelled(task_id);
    }

    tokio::select! {
        biased;
        _ = signal.expired() => Outcome::cancelled(task_id),
        result = body.execute(spec) => match result {
            Ok(payload) => Outcome::success(task_id, payload),
            Err(failure) => Outcome::failed(task_id, failure.detail()),
        },
    }
}

fn log_outcome(outcome: &Outcome) {
    let detail = outcome.error_detail.as_deref().unwrap_or_default();
    match outcome.status {
        OutcomeStatus::Success => info!(
            task_id = %outcome.task_id,
            elapsed_ms = outcome.elapsed_ms,
            "task completed"
        ),
        OutcomeStatus::Failed => warn!(
            task_id = %outcome.task_id,
            elapsed_ms = outcome.elapsed_ms,
            reason = detail,
            "task failed"
        ),
        OutcomeStatus::Cancelled => info!(
            task_id = %outcome.task_id,
            elapsed_ms = outcome.elapsed_ms,
            reason = detail,
            "task cancelled"
        ),
    }
}
