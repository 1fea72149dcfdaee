use crate::errors::Result;
use crate::metrics::REQUEST_RETRIES_TOTAL;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Fixed-delay bounded retry. No backoff growth and no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt cap is reached. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if !e.is_retryable() {
                        warn!("{} failed with non-retryable error: {}", label, e);
                        return Err(e);
                    }

                    if attempt >= max_attempts {
                        error!("{} failed after {} attempts: {}", label, attempt, e);
                        return Err(e);
                    }

                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        label, attempt, max_attempts, e, self.delay
                    );
                    REQUEST_RETRIES_TOTAL.inc();
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
