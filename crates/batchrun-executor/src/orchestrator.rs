//! Batch entry point: fan out one runner per task, fan the outcomes back in.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use batchrun_core::{BatchPhase, BatchSummary, Outcome, TaskId, TaskSpec};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::aggregator::ResultAggregator;
use crate::body::{SimulatedBody, TaskBody};
use crate::config::ExecutorConfig;
use crate::deadline::DeadlineController;
use crate::error::ExecutorError;
use crate::runner::TaskRunner;

/// Runs batches of tasks under one shared deadline.
pub struct Orchestrator {
    config: ExecutorConfig,
    body: Arc<dyn TaskBody>,
    shutdown: Option<CancellationToken>,
}

impl Orchestrator {
    /// Create an orchestrator running the simulated task body.
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            body: Arc::new(SimulatedBody),
            shutdown: None,
        }
    }

    /// Builder method to run a different task body.
    pub fn with_body(mut self, body: Arc<dyn TaskBody>) -> Self {
        self.body = body;
        self
    }

    /// Builder method to expire every batch deadline when `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Run `tasks` in parallel, all bounded by `deadline`, and classify the
    /// outcomes.
    ///
    /// Returns only once every task has an outcome. Per-task failures and
    /// cancellations are recorded in the summary; the only errors are a
    /// malformed batch and a liveness failure (the outcome stream did not
    /// close within `liveness_grace` of the deadline).
    pub async fn submit_batch(
        &self,
        tasks: Vec<TaskSpec>,
        deadline: Duration,
    ) -> Result<BatchSummary, ExecutorError> {
        let mut pending = unique_ids(&tasks)?;
        let expected = tasks.len();
        let mut phase = BatchPhase::Submitted;

        info!(
            tasks = expected,
            deadline_ms = deadline.as_millis() as u64,
            "batch submitted"
        );

        if tasks.is_empty() {
            debug!("empty batch; nothing to dispatch");
            return Ok(BatchSummary::empty());
        }

        let controller = match &self.shutdown {
            Some(token) => DeadlineController::start_linked(deadline, token),
            None => DeadlineController::start(deadline),
        };
        let aggregator = ResultAggregator::new(expected);
        let tracker = aggregator.tracker();

        let runners: Vec<JoinHandle<Outcome>> = tasks
            .into_iter()
            .map(|spec| {
                let sink = aggregator.sink(spec.id().clone());
                let runner = TaskRunner::new(spec, controller.signal(), self.body.clone(), sink);
                tokio::spawn(runner.run())
            })
            .collect();
        let watcher = aggregator.spawn_watcher();

        phase = phase.transition(BatchPhase::Dispatched)?;
        debug!(runners = expected, ?phase, "batch dispatched");

        let mut stream = aggregator.into_stream();
        phase = phase.transition(BatchPhase::Draining)?;

        let grace = self.config.effective_liveness_grace();
        let mut liveness_at = after(controller.signal().expires_at(), grace);
        let mut abandon_seen = false;
        let mut summary = BatchSummary::empty();

        loop {
            tokio::select! {
                biased;
                next = stream.next() => match next {
                    Some(outcome) => {
                        if !pending.remove(&outcome.task_id) {
                            abort_all(&controller, &runners, &watcher);
                            error!(task_id = %outcome.task_id, "second outcome for task");
                            return Err(ExecutorError::DuplicateOutcome(outcome.task_id));
                        }
                        summary.record(outcome);
                    }
                    None => break,
                },
                _ = tracker.abandoned(), if !abandon_seen => {
                    abandon_seen = true;
                    liveness_at = liveness_at.min(after(Instant::now(), grace));
                    error!(
                        remaining = tracker.remaining(),
                        grace_ms = grace.as_millis() as u64,
                        "runner lost before reporting; outcome stream cannot close"
                    );
                }
                _ = sleep_until(liveness_at) => {
                    abort_all(&controller, &runners, &watcher);
                    return Err(liveness_failure(expected, &summary, std::mem::take(&mut pending)));
                }
            }
        }

        // The stream only closes after every runner arrived, so anything still
        // pending had its outcome rejected by the channel.
        if !pending.is_empty() {
            abort_all(&controller, &runners, &watcher);
            return Err(liveness_failure(expected, &summary, pending));
        }

        phase = phase.transition(BatchPhase::Complete)?;
        info!(
            success = summary.success_count,
            failed = summary.failed_count,
            cancelled = summary.cancelled_count,
            ?phase,
            "batch complete"
        );

        Ok(summary)
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

fn unique_ids(tasks: &[TaskSpec]) -> Result<HashSet<TaskId>, ExecutorError> {
    let mut ids = HashSet::with_capacity(tasks.len());
    for spec in tasks {
        if !ids.insert(spec.id().clone()) {
            return Err(ExecutorError::DuplicateTaskId(spec.id().clone()));
        }
    }
    Ok(ids)
}

fn after(instant: Instant, grace: Duration) -> Instant {
    instant.checked_add(grace).unwrap_or(instant)
}

fn abort_all(
    controller: &DeadlineController,
    runners: &[JoinHandle<Outcome>],
    watcher: &JoinHandle<()>,
) {
    controller.expire_now();
    for runner in runners {
        runner.abort();
    }
    watcher.abort();
}

fn liveness_failure(
    expected: usize,
    summary: &BatchSummary,
    pending: HashSet<TaskId>,
) -> ExecutorError {
    let mut missing: Vec<TaskId> = pending.into_iter().collect();
    missing.sort();
    error!(
        expected,
        received = summary.total(),
        missing = ?missing,
        "outcome stream did not close; batch failed"
    );
    ExecutorError::LivenessFailure {
        expected,
        received: summary.total(),
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskFailure;
    use crate::generator::{random_batch, BatchProfile};
    use async_trait::async_trait;
    use batchrun_core::{OutcomeStatus, DEADLINE_EXCEEDED};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn scenario_batch() -> Vec<TaskSpec> {
        vec![
            TaskSpec::new("t1", ms(10)),
            TaskSpec::new("t2", ms(20)).failing(),
            TaskSpec::new("t3", ms(30)),
        ]
    }

    fn status_of(summary: &BatchSummary, id: &str) -> OutcomeStatus {
        summary.outcome(&TaskId::from(id)).unwrap().status
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_a_generous_deadline() {
        let summary = Orchestrator::default()
            .submit_batch(scenario_batch(), ms(1000))
            .await
            .unwrap();

        assert_eq!(status_of(&summary, "t1"), OutcomeStatus::Success);
        assert_eq!(status_of(&summary, "t2"), OutcomeStatus::Failed);
        assert_eq!(status_of(&summary, "t3"), OutcomeStatus::Success);
        assert_eq!(
            (summary.success_count, summary.failed_count, summary.cancelled_count),
            (2, 1, 0)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scenario_a_on_parallel_workers() {
        let summary = submit(scenario_batch(), ms(1000)).await;

        assert_eq!(summary.total(), 3);
        assert_eq!(
            (summary.success_count, summary.failed_count, summary.cancelled_count),
            (2, 1, 0)
        );
        assert_eq!(status_of(&summary, "t2"), OutcomeStatus::Failed);
    }

    async fn submit(tasks: Vec<TaskSpec>, deadline: Duration) -> BatchSummary {
        crate::submit_batch(tasks, deadline).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_b_short_deadline() {
        let started = Instant::now();
        let summary = submit(scenario_batch(), ms(5)).await;

        assert_eq!(
            (summary.success_count, summary.failed_count, summary.cancelled_count),
            (0, 0, 3)
        );
        assert!(summary
            .outcomes
            .iter()
            .all(|o| o.error_detail.as_deref() == Some(DEADLINE_EXCEEDED)));
        // Every runner resolves at the deadline, not at its own duration.
        assert!(started.elapsed() < ms(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_b_with_zero_grace_still_completes() {
        let orchestrator =
            Orchestrator::new(ExecutorConfig::default().with_liveness_grace(Duration::ZERO));

        let summary = orchestrator
            .submit_batch(scenario_batch(), ms(5))
            .await
            .unwrap();

        assert_eq!(
            (summary.success_count, summary.failed_count, summary.cancelled_count),
            (0, 0, 3)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclamped_zero_grace_field_still_completes() {
        let config = ExecutorConfig {
            liveness_grace: Duration::ZERO,
        };

        let summary = Orchestrator::new(config)
            .submit_batch(scenario_batch(), ms(5))
            .await
            .unwrap();

        assert_eq!(summary.cancelled_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_c_empty_batch() {
        let started = Instant::now();
        let summary = submit(Vec::new(), ms(1000)).await;

        assert_eq!(summary, BatchSummary::empty());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_deadline_cancels_everything() {
        let tasks = vec![
            TaskSpec::new("instant", Duration::ZERO),
            TaskSpec::new("instant-fail", Duration::ZERO).failing(),
            TaskSpec::new("slow", ms(500)),
        ];

        let summary = submit(tasks, Duration::ZERO).await;

        assert_eq!(summary.cancelled_count, 3);
        assert_eq!(summary.total(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_cancellation_when_deadline_covers_every_task() {
        let profile = BatchProfile::new(Duration::ZERO, ms(50), 0.3);
        let tasks = random_batch(40, &profile, &mut StdRng::seed_from_u64(3)).unwrap();
        let injected = tasks.iter().filter(|t| t.failure_injected()).count();

        let summary = submit(tasks, ms(60)).await;

        assert_eq!(summary.cancelled_count, 0);
        assert_eq!(summary.failed_count, injected);
        assert_eq!(summary.success_count, 40 - injected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_classification_is_deterministic() {
        let profile = BatchProfile::new(ms(1), ms(100), 0.5);
        let tasks = random_batch(25, &profile, &mut StdRng::seed_from_u64(11)).unwrap();

        let first = submit(tasks.clone(), ms(500)).await;
        let second = submit(tasks.clone(), ms(500)).await;

        assert_eq!(first.success_count, second.success_count);
        assert_eq!(first.failed_count, second.failed_count);
        for spec in &tasks {
            assert_eq!(
                first.outcome(spec.id()).map(|o| o.status),
                second.outcome(spec.id()).map(|o| o.status)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completeness_and_partition() {
        let profile = BatchProfile::new(Duration::ZERO, ms(200), 0.25);
        for (n, seed) in [(1, 1), (7, 2), (64, 3), (200, 4)] {
            let tasks = random_batch(n, &profile, &mut StdRng::seed_from_u64(seed)).unwrap();
            let summary = submit(tasks.clone(), ms(100)).await;

            assert_eq!(summary.total(), n);
            assert!(summary.is_partitioned());
            for spec in &tasks {
                assert!(summary.outcome(spec.id()).is_some());
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_deadline_splits_at_expiry() {
        let tasks = vec![
            TaskSpec::new("fast", ms(10)),
            TaskSpec::new("fast-fail", ms(15)).failing(),
            TaskSpec::new("slow", ms(40)),
            TaskSpec::new("slow-fail", ms(50)).failing(),
        ];

        let summary = submit(tasks, ms(25)).await;

        assert_eq!(status_of(&summary, "fast"), OutcomeStatus::Success);
        assert_eq!(status_of(&summary, "fast-fail"), OutcomeStatus::Failed);
        assert_eq!(status_of(&summary, "slow"), OutcomeStatus::Cancelled);
        assert_eq!(status_of(&summary, "slow-fail"), OutcomeStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let tasks = vec![TaskSpec::new("same", ms(1)), TaskSpec::new("same", ms(2))];

        let result = crate::submit_batch(tasks, ms(100)).await;

        assert!(matches!(result, Err(ExecutorError::DuplicateTaskId(id)) if id.as_str() == "same"));
    }

    /// Panics for one task id, standing in for a runner that crashes.
    struct CrashingBody {
        crash_on: TaskId,
    }

    #[async_trait]
    impl TaskBody for CrashingBody {
        async fn execute(&self, spec: &TaskSpec) -> Result<String, TaskFailure> {
            if spec.id() == &self.crash_on {
                panic!("backing store connection lost");
            }
            SimulatedBody.execute(spec).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_crashed_runner_is_a_liveness_failure() {
        let orchestrator = Orchestrator::new(ExecutorConfig::default().with_liveness_grace(ms(200)))
            .with_body(Arc::new(CrashingBody {
                crash_on: TaskId::from("t2"),
            }));
        let started = Instant::now();

        let result = orchestrator.submit_batch(scenario_batch(), ms(10_000)).await;

        match result {
            Err(ExecutorError::LivenessFailure {
                expected,
                received,
                missing,
            }) => {
                assert_eq!(expected, 3);
                assert_eq!(received, 2);
                assert_eq!(missing, vec![TaskId::from("t2")]);
            }
            other => panic!("expected liveness failure, got {other:?}"),
        }
        // Surfaced after the grace period, not after the full deadline.
        assert!(started.elapsed() <= ms(200));
    }

    /// Reads payloads from an in-memory key-value store.
    struct CacheBody {
        entries: HashMap<String, String>,
    }

    #[async_trait]
    impl TaskBody for CacheBody {
        async fn execute(&self, spec: &TaskSpec) -> Result<String, TaskFailure> {
            tokio::time::sleep(spec.nominal_duration()).await;
            self.entries
                .get(spec.id().as_str())
                .cloned()
                .ok_or_else(|| TaskFailure::new("cache miss"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_body_payloads() {
        let entries = HashMap::from([("user:1".to_string(), "alice".to_string())]);
        let orchestrator = Orchestrator::default().with_body(Arc::new(CacheBody { entries }));
        let tasks = vec![
            TaskSpec::new("user:1", ms(5)),
            TaskSpec::new("user:2", ms(5)),
        ];

        let summary = orchestrator.submit_batch(tasks, ms(100)).await.unwrap();

        let hit = summary.outcome(&TaskId::from("user:1")).unwrap();
        assert_eq!(hit.payload.as_deref(), Some("alice"));
        let miss = summary.outcome(&TaskId::from("user:2")).unwrap();
        assert_eq!(miss.status, OutcomeStatus::Failed);
        assert_eq!(miss.error_detail.as_deref(), Some("cache miss"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_token_expires_batch_early() {
        let shutdown = CancellationToken::new();
        let orchestrator = Orchestrator::default().with_shutdown(shutdown.clone());
        let tasks = vec![TaskSpec::new("a", ms(5)), TaskSpec::new("b", ms(5_000))];

        tokio::spawn(async move {
            tokio::time::sleep(ms(20)).await;
            shutdown.cancel();
        });
        let started = Instant::now();
        let summary = orchestrator.submit_batch(tasks, ms(60_000)).await.unwrap();

        assert_eq!(status_of(&summary, "a"), OutcomeStatus::Success);
        assert_eq!(status_of(&summary, "b"), OutcomeStatus::Cancelled);
        assert_eq!(started.elapsed(), ms(20));
    }
}
