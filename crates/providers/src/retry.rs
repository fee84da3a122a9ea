//! Bounded retry loop for upstream calls.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{UpstreamError, UpstreamResult};

/// How many times to try an upstream call and how long to wait in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub delay: Duration,
    /// Multiplier applied to the delay after each failed attempt (1 = fixed).
    pub backoff_factor: u32,
    /// Optional per-attempt timeout, applied around the call.
    pub attempt_timeout: Option<Duration>,
    /// Give up immediately on errors that retrying cannot fix.
    pub fail_fast_on_permanent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            backoff_factor: 1,
            attempt_timeout: None,
            fail_fast_on_permanent: true,
        }
    }
}

/// Outcome of a retried call, with the attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: UpstreamResult<T>,
    pub attempts: u32,
}

impl RetryPolicy {
    /// No waiting between attempts; used by tests and replay tools.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = UpstreamResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let result = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, op(attempt)).await {
                    Ok(result) => result,
                    Err(_) => Err(UpstreamError::Timeout(limit)),
                },
                None => op(attempt).await,
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label = %label, attempt = attempt, "Upstream call recovered");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(e) => e,
            };

            let permanent = self.fail_fast_on_permanent && !err.is_transient();
            if permanent || attempt >= max_attempts {
                warn!(
                    label = %label,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    permanent = permanent,
                    error = %err,
                    "Upstream call failed, giving up"
                );
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                };
            }

            warn!(
                label = %label,
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Upstream call failed, retrying"
            );

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            delay = delay.saturating_mul(self.backoff_factor.max(1));
        }
    }
}
