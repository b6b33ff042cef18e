//! Batch-wide deadline.
//!
//! A [`DeadlineController`] is started once per batch with a fixed budget and
//! hands out [`DeadlineSignal`] clones to every runner. The signal is
//! level-triggered: observing it never consumes it, and once it has fired it
//! stays fired.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Budgets too large for the clock are clamped to roughly thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Read-only view of a batch deadline, cheap to clone.
#[derive(Debug, Clone)]
pub struct DeadlineSignal {
    token: CancellationToken,
    expires_at: Instant,
}

impl DeadlineSignal {
    /// True once the deadline has fired or its instant has passed.
    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.expires_at
    }

    /// Resolves when the deadline fires. Returns immediately if it already has.
    ///
    /// Watching the instant directly, in addition to the token, means every
    /// observer sees expiry at the same clock tick even if the controller's
    /// timer task has not been scheduled yet.
    pub async fn expired(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = sleep_until(self.expires_at) => {}
        }
    }

    /// The instant the deadline fires unless expired early.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        if self.token.is_cancelled() {
            Duration::ZERO
        } else {
            self.expires_at.saturating_duration_since(Instant::now())
        }
    }
}

/// Owns the expiry signal of one batch.
///
/// Must be started from within a tokio runtime. Dropping the controller stops
/// its timer; signals handed out keep whatever state they had.
#[derive(Debug)]
pub struct DeadlineController {
    budget: Duration,
    signal: DeadlineSignal,
    timer: Option<JoinHandle<()>>,
}

impl DeadlineController {
    /// Start a deadline that fires `budget` from now.
    pub fn start(budget: Duration) -> Self {
        Self::start_with_token(budget, CancellationToken::new())
    }

    /// Start a deadline that also fires when `parent` is cancelled.
    pub fn start_linked(budget: Duration, parent: &CancellationToken) -> Self {
        Self::start_with_token(budget, parent.child_token())
    }

    fn start_with_token(budget: Duration, token: CancellationToken) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(budget)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let signal = DeadlineSignal {
            token: token.clone(),
            expires_at,
        };

        // A zero budget is expired before any observer exists.
        if budget.is_zero() {
            token.cancel();
            debug!("zero deadline budget; expired at start");
            return Self {
                budget,
                signal,
                timer: None,
            };
        }

        let timer = tokio::spawn(async move {
            tokio::select! {
                _ = sleep_until(expires_at) => {
                    debug!("batch deadline reached");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        });

        Self {
            budget,
            signal,
            timer: Some(timer),
        }
    }

    /// A new observer handle for the deadline.
    pub fn signal(&self) -> DeadlineSignal {
        self.signal.clone()
    }

    /// Fire the deadline now. Idempotent.
    pub fn expire_now(&self) {
        if !self.signal.token.is_cancelled() {
            info!(
                remaining_ms = self.signal.remaining().as_millis() as u64,
                "expiring batch deadline early"
            );
            self.signal.token.cancel();
        }
    }

    pub fn is_expired(&self) -> bool {
        self.signal.is_expired()
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

impl Drop for DeadlineController {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
