//! Bounded-parallelism gate for transfer tasks.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Limits how many asynchronous tasks are in flight at once.
///
/// Tasks queue for a permit in submission order and hold it for the duration
/// of their future; a failing task releases its permit like any other, so one
/// failure never costs capacity. The engine keeps two independent instances
/// so upload backpressure cannot starve downloads.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Run `fut` once a permit is available, releasing it on completion.
    pub async fn run<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        // acquire only fails after close, and this semaphore is never closed.
        let _permit = self.semaphore.acquire().await.ok();
        fut.await
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_limits_in_flight_tasks() {
        let limiter = ConcurrencyLimiter::new(3);
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let tasks = (0..20).map(|_| {
            limiter.run(async {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
        });
        futures::future::join_all(tasks).await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_failure_does_not_cost_capacity() {
        let limiter = ConcurrencyLimiter::new(1);

        let failed: Result<(), &str> = limiter.run(async { Err("boom") }).await;
        assert!(failed.is_err());

        // The permit from the failed task must be back.
        let ok: Result<(), &str> = limiter.run(async { Ok(()) }).await;
        assert!(ok.is_ok());
    }

    #[test]
    fn test_zero_is_clamped_to_one() {
        assert_eq!(ConcurrencyLimiter::new(0).max_concurrent(), 1);
    }
}
