//! Completion countdown for a batch of runners.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Pre-registered countdown: one arrival per runner, watched by one closer.
///
/// The count is fixed when the tracker is created, before any runner starts,
/// so a fast runner can never observe an unregistered peer.
#[derive(Debug)]
pub struct CompletionTracker {
    registered: usize,
    remaining: AtomicUsize,
    notify: Notify,
    abandoned: CancellationToken,
}

impl CompletionTracker {
    /// Create a tracker expecting `registered` arrivals.
    pub fn new(registered: usize) -> Self {
        Self {
            registered,
            remaining: AtomicUsize::new(registered),
            notify: Notify::new(),
            abandoned: CancellationToken::new(),
        }
    }

    /// Record one runner as finished. Returns true for the final arrival.
    ///
    /// Arrivals past zero are ignored so the count can never wrap.
    pub fn arrive(&self) -> bool {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match previous {
            Ok(1) => {
                self.notify.notify_waiters();
                true
            }
            Ok(_) => false,
            Err(_) => {
                warn!(
                    registered = self.registered,
                    "arrival after countdown reached zero; ignoring"
                );
                false
            }
        }
    }

    /// Number of runners that have not arrived yet.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn registered(&self) -> usize {
        self.registered
    }

    pub fn is_done(&self) -> bool {
        self.remaining() == 0
    }

    /// Wait until every registered runner has arrived.
    pub async fn wait(&self) {
        loop {
            // Register interest before checking the count so the final
            // arrival's notification cannot slip in between.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_done() {
                return;
            }
            notified.await;
        }
    }

    /// Record that a runner went away without arriving.
    ///
    /// This does not count as an arrival: the countdown can no longer reach
    /// zero and the batch is headed for a liveness failure.
    pub fn abandon(&self) {
        self.abandoned.cancel();
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.is_cancelled()
    }

    /// Resolves once any runner has been abandoned.
    pub async fn abandoned(&self) {
        self.abandoned.cancelled().await;
    }
}
