use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::ProgressSink;
use crate::docker::RuntimeError;

/// Bounded retry for runtime calls. Only errors for which
/// [`RuntimeError::is_retryable`] holds are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Runs `op` until it succeeds, fails terminally, or the attempt ceiling
    /// is reached. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        progress: &dyn ProgressSink,
        mut op: F,
    ) -> Result<T, RuntimeError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RuntimeError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(attempt, max_attempts = self.max_attempts, error = %e, "{label}: retrying.");
                    progress
                        .report(&format!(
                            "🔄 {label}... (Attempt {attempt}/{})",
                            self.max_attempts
                        ))
                        .await;
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
