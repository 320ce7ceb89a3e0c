//! Bounded retry for calls to external services

use crate::error::Retryable;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How many times to try a call and how long to wait between tries
///
/// Every retry waits the same fixed `delay`.
/// Only errors whose [`Retryable::is_retryable`] is true are retried; any
/// other error is returned from the first attempt that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Wait between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Wait before attempt number `attempt + 1` (1-based `attempt`)
    pub fn backoff(&self, _attempt: u32) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds, fails terminally or attempts run out
    ///
    /// `what` only labels log lines.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(what, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let wait = self.backoff(attempt);
                    warn!(what, attempt, ?wait, "Attempt failed, retrying: {}", e);
                    sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!(what, attempts, "Giving up after {} attempts: {}", attempts, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
