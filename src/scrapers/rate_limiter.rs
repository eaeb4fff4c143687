//! Minimum-interval limiter shared across a worker pool.
//!
//! Enforces a fixed gap between the *starts* of consecutive requests,
//! regardless of which worker issues them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

/// Shared limiter; clones refer to the same schedule.
#[derive(Debug, Clone)]
pub struct IntervalLimiter {
    interval: Duration,
    last_start: Arc<Mutex<Option<Instant>>>,
}

impl IntervalLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_start: Arc::new(Mutex::new(None)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the interval since the previous start has elapsed, then
    /// record a new start.
    ///
    /// The lock is held while sleeping so waiting callers are released one
    /// at a time in arrival order.
    pub async fn acquire(&self) {
        let mut last = self.last_start.lock().await;

        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                debug!("Interval limiter: waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_acquire_is_immediate() {
        let limiter = IntervalLimiter::new(Duration::from_secs(5));
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_starts_are_spaced_across_clones() {
        let limiter = IntervalLimiter::new(Duration::from_millis(50));
        let other = limiter.clone();

        let start = Instant::now();
        let a = tokio::spawn(async move { limiter.acquire().await });
        let b = tokio::spawn(async move { other.acquire().await });
        a.await.unwrap();
        b.await.unwrap();

        // Two starts need at least one full interval between them.
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
