//! Bounded retry with fixed backoff
//!
//! The only failure-recovery primitive in the service. Every ledger access
//! goes through [`RetryPolicy::run`]; accrual HTTP calls never do.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::core_types::LEDGER_RETRY_ATTEMPTS;
use crate::shutdown::ShutdownSignal;

/// Returned when shutdown interrupts a retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled by shutdown")]
pub struct Cancelled;

/// Retry configuration
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub attempts: usize,
    /// Fixed wait between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: LEDGER_RETRY_ATTEMPTS,
            backoff: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: usize, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    ///
    /// Shutdown is checked before every attempt and raced against the
    /// backoff sleep; either way the call returns `Cancelled` at once
    /// without spending the remaining attempts.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        shutdown: &ShutdownSignal,
        is_retryable: P,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: From<Cancelled> + std::fmt::Display,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            if shutdown.is_shutdown_requested() {
                return Err(Cancelled.into());
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && is_retryable(&e) => {
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        backoff_ms = self.backoff.as_millis() as u64,
                        error = %e,
                        "Retryable failure, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.backoff) => {}
                        _ = shutdown.wait() => return Err(Cancelled.into()),
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
