//! Fan-in of runner outcomes into one stream.
//!
//! Runners write through an [`OutcomeSink`] (one per runner, consumed on
//! write). A dedicated watcher closes the [`OutcomeStream`] once the
//! [`CompletionTracker`] has counted every runner. The stream is never closed
//! by senders going away: if a runner disappears without reporting, the
//! stream stays open and the caller's liveness timeout decides.

use std::sync::Arc;

use batchrun_core::{Outcome, TaskId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::tracker::CompletionTracker;

/// Merge point for the outcomes of one batch.
pub struct ResultAggregator {
    tx: mpsc::Sender<Outcome>,
    rx: mpsc::Receiver<Outcome>,
    tracker: Arc<CompletionTracker>,
    closed: CancellationToken,
}

impl ResultAggregator {
    /// Create an aggregator for `expected` runners.
    ///
    /// The buffer holds every outcome of the batch, so no runner ever waits
    /// for the reader.
    pub fn new(expected: usize) -> Self {
        let (tx, rx) = mpsc::channel(expected.max(1));
        Self {
            tx,
            rx,
            tracker: Arc::new(CompletionTracker::new(expected)),
            closed: CancellationToken::new(),
        }
    }

    /// Write handle for the runner owning `task_id`.
    pub fn sink(&self, task_id: TaskId) -> OutcomeSink {
        OutcomeSink {
            task_id,
            tx: self.tx.clone(),
            tracker: self.tracker.clone(),
            delivered: false,
        }
    }

    pub fn tracker(&self) -> Arc<CompletionTracker> {
        self.tracker.clone()
    }

    /// Spawn the single closer: waits for the countdown, then closes the stream.
    pub fn spawn_watcher(&self) -> JoinHandle<()> {
        let tracker = self.tracker.clone();
        let closed = self.closed.clone();

        tokio::spawn(async move {
            tracker.wait().await;
            debug!(
                runners = tracker.registered(),
                "all runners reported; closing outcome stream"
            );
            closed.cancel();
        })
    }

    /// The single reader side.
    pub fn into_stream(self) -> OutcomeStream {
        OutcomeStream {
            rx: self.rx,
            closed: self.closed,
        }
    }
}

/// One runner's exclusive, single-use write slot.
#[derive(Debug)]
pub struct OutcomeSink {
    task_id: TaskId,
    tx: mpsc::Sender<Outcome>,
    tracker: Arc<CompletionTracker>,
    delivered: bool,
}

impl OutcomeSink {
    /// Enqueue the outcome, then arrive at the completion tracker.
    ///
    /// Consumes the sink, so a runner can write at most once.
    pub fn deliver(mut self, outcome: Outcome) {
        debug_assert_eq!(outcome.task_id, self.task_id);

        match self.tx.try_send(outcome) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => {
                debug!(task_id = %self.task_id, "outcome reader gone; dropping outcome");
            }
            Err(e) => {
                error!(task_id = %self.task_id, error = %e, "outcome rejected by aggregator");
            }
        }
        self.delivered = true;
        self.tracker.arrive();
    }
}

impl Drop for OutcomeSink {
    fn drop(&mut self) {
        if !self.delivered {
            error!(task_id = %self.task_id, "runner dropped its outcome slot without reporting");
            self.tracker.abandon();
        }
    }
}

/// Reader side of the aggregator.
#[derive(Debug)]
pub struct OutcomeStream {
    rx: mpsc::Receiver<Outcome>,
    closed: CancellationToken,
}

impl OutcomeStream {
    /// Next outcome in arrival order, or `None` once the stream is closed and
    /// drained.
    ///
    /// Cancel-safe: dropping the future never loses a buffered outcome.
    pub async fn next(&mut self) -> Option<Outcome> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => self.rx.try_recv().ok(),
            received = self.rx.recv() => match received {
                Some(outcome) => Some(outcome),
                None => {
                    // Every sink is gone but the countdown is not finished.
                    self.closed.cancelled().await;
                    self.rx.try_recv().ok()
                }
            },
        }
    }

    /// True once the watcher has closed the stream.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
