//! Bounded retry with exponential backoff and jitter
//!
//! Wraps a fallible async operation: on failure, retry up to `max_attempts`
//! total attempts, sleeping between failures. No sleep happens after the
//! final failure. The wait phase listens on a shutdown watch channel and
//! aborts with `RelayError::Cancelled` instead of silently continuing.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, warn};

use crate::error::{RelayError, Result};

const BASE_WAIT_MS: u64 = 1_000;
const MAX_WAIT_MS: u64 = 30_000;
const JITTER_FACTOR: f64 = 0.2;

/// Retry policy for transient-retryable operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (>= 1)
    pub max_attempts: u32,
    /// Base delay before the first retry
    pub base_wait_ms: u64,
    /// Cap on the exponential delay, before jitter
    pub max_wait_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_wait_ms: BASE_WAIT_MS,
            max_wait_ms: MAX_WAIT_MS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Backoff delay after the given 1-based failure count:
    /// `min(max_wait, base * 2^(attempt-1))` plus uniform jitter in
    /// `[0, 0.2 * wait)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_wait_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let wait = exponential.min(self.max_wait_ms);
        let jitter = rand::thread_rng().gen_range(0.0..JITTER_FACTOR) * wait as f64;
        Duration::from_millis(wait + jitter as u64)
    }

    /// Execute `op`, retrying on failure per this policy.
    ///
    /// `shutdown` interrupts the backoff wait; an interrupted wait surfaces
    /// `RelayError::Cancelled` immediately.
    pub async fn run<T, F, Fut>(
        &self,
        mut op: F,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures = 0u32;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    failures += 1;

                    if failures >= self.max_attempts {
                        error!(
                            "Operation failed after {} attempts: {}",
                            self.max_attempts, e
                        );
                        return Err(e);
                    }

                    let delay = self.backoff_delay(failures);
                    warn!(
                        "Attempt {} failed: {}. Retrying in {:?}",
                        failures, e, delay
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = wait_for_shutdown(shutdown) => {
                            return Err(RelayError::Cancelled);
                        }
                    }
                }
            }
        }
    }
}

/// Resolves once the shutdown flag flips to true; pends forever if the
/// sender goes away without signalling.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// A shutdown channel whose receiver can be handed to [`RetryPolicy::run`].
/// The initial value is `false`; sending `true` cancels pending waits.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}
