//! Bounded permit pool for downstream calls
//!
//! Limits how many call tasks of a batch may be running downstream I/O at the
//! same time. Permits are scoped: dropping a [`Permit`] hands it back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use super::DeadlineGuard;
use crate::metrics;

/// Counting permit pool of fixed capacity
#[derive(Debug, Clone)]
pub struct PermitPool {
    /// Semaphore holding the available permits
    semaphore: Arc<Semaphore>,

    /// Configured capacity
    capacity: usize,

    /// Permits currently held
    in_flight: Arc<AtomicUsize>,

    /// Highest value `in_flight` has reached
    peak: Arc<AtomicUsize>,
}

impl PermitPool {
    /// Create a pool with `capacity` permits (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a permit, giving up when `guard` expires first.
    ///
    /// Returns `None` without consuming anything if the deadline wins.
    pub async fn acquire(&self, guard: &DeadlineGuard) -> Option<Permit> {
        if guard.is_expired() {
            return None;
        }

        let permit = tokio::select! {
            biased;
            _ = guard.cancelled() => return None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok()?,
        };

        let held = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(held, Ordering::SeqCst);
        metrics::permit_acquired();
        trace!(held, capacity = self.capacity, "Permit acquired");

        Some(Permit {
            in_flight: Arc::clone(&self.in_flight),
            _permit: permit,
        })
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of permits held at once over the pool's lifetime
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A held permit. Returned to the pool on drop.
#[derive(Debug)]
pub struct Permit {
    in_flight: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl Permit {
    /// Hand the permit back to the pool
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        // Runs before `_permit` is dropped, so the counter is decremented
        // before the semaphore can hand the permit to another waiter.
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        metrics::permit_released();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let pool = PermitPool::new(2);
        let guard = DeadlineGuard::with_time_limit(Duration::from_secs(5));

        let p1 = pool.acquire(&guard).await.unwrap();
        let p2 = pool.acquire(&guard).await.unwrap();
        assert_eq!(pool.in_flight(), 2);
        assert_eq!(pool.available(), 0);

        p1.release();
        assert_eq!(pool.in_flight(), 1);
        assert_eq!(pool.available(), 1);

        drop(p2);
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(pool.peak(), 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let pool = PermitPool::new(0);
        assert_eq!(pool.capacity(), 1);
    }

    #[tokio::test]
    async fn test_expired_guard_gets_no_permit() {
        let pool = PermitPool::new(1);
        let guard = DeadlineGuard::with_time_limit(Duration::from_secs(5));
        guard.cancel();

        assert!(pool.acquire(&guard).await.is_none());
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_while_waiting() {
        let pool = PermitPool::new(1);
        let guard = DeadlineGuard::with_time_limit(Duration::from_millis(100));

        let _held = pool.acquire(&guard).await.unwrap();
        let waited = pool.acquire(&guard).await;

        assert!(waited.is_none());
        assert_eq!(pool.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_waiter_wakes_when_permit_returns() {
        let pool = PermitPool::new(1);
        let guard = DeadlineGuard::with_time_limit(Duration::from_secs(5));

        let held = pool.acquire(&guard).await.unwrap();
        let (p, g) = (pool.clone(), guard.clone());
        let waiter = tokio::spawn(async move { p.acquire(&g).await.is_some() });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap());
        assert_eq!(pool.peak(), 1);
    }
}
