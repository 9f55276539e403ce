//! Bounded retry with exponential backoff.
//!
//! Retry in this crate is an explicit [`RetryPolicy`] value applied to
//! exactly two operations: service-client initialization and embedding
//! calls. Everything else fails on first error; in particular a statement
//! that reached the relational store is never re-executed.
//!
//! Backoff schedule: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5 × base).

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Override the backoff base, mainly to keep tests fast.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before retry `attempt` (1-based).
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }

    /// Run `op` up to `max_retries + 1` times, sleeping between attempts.
    ///
    /// An error stops the run immediately when `retryable` rejects it or
    /// the attempt budget is spent; the last error is returned as-is.
    pub async fn run<T, E, F, Fut, R>(&self, mut op: F, retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                tokio::time::sleep(self.delay_for(attempt)).await;
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_retries || !retryable(&err) {
                        return Err(err);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
