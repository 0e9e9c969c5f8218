//! Shared per-batch deadline
//!
//! One [`DeadlineGuard`] is created per dispatched batch and cloned into every
//! call task. Clones share the same cancellation state, so expiry observed by
//! one holder is observed by all of them.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline plus cancellation signal for one batch.
///
/// The guard expires when its time limit elapses or when the token it was
/// derived from is cancelled (client disconnect, shutdown). Both causes look
/// the same to consumers and the transition is one-way.
#[derive(Debug, Clone)]
pub struct DeadlineGuard {
    deadline: Instant,
    token: CancellationToken,
}

impl DeadlineGuard {
    /// Create a guard that expires `time_limit` from now or when `parent` is cancelled
    pub fn new(time_limit: Duration, parent: &CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + time_limit,
            token: parent.child_token(),
        }
    }

    /// Create a guard with no external cancellation source
    pub fn with_time_limit(time_limit: Duration) -> Self {
        Self::new(time_limit, &CancellationToken::new())
    }

    /// Whether the deadline has passed or the guard was cancelled
    pub fn is_expired(&self) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        if Instant::now() >= self.deadline {
            // Latch the expiry so waiters on `cancelled()` wake as well
            self.token.cancel();
            return true;
        }
        false
    }

    /// Resolves once the guard expires, by time or by cancellation
    pub async fn cancelled(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep_until(self.deadline) => {
                self.token.cancel();
            }
        }
    }

    /// Expire the guard immediately
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Time left before the deadline, zero once expired
    pub fn remaining(&self) -> Duration {
        if self.token.is_cancelled() {
            return Duration::ZERO;
        }
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// The absolute deadline
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}
