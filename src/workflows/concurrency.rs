// Optimistic concurrency: every mutation names the version it was computed
// from, and a caller holding an old snapshot gets a StaleVersion instead of
// silently overwriting someone else's change.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::errors::WorkflowError;
use super::types::WorkItem;
use crate::config::ConcurrencyConfig;

/// Rejects the mutation if `current` has moved past the version the caller saw
pub fn check_version(current: &WorkItem, expected_version: u64) -> Result<(), WorkflowError> {
    if current.version == expected_version {
        return Ok(());
    }
    Err(WorkflowError::StaleVersion {
        expected: expected_version,
        current: current.version,
        state: current.state,
    })
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_secs(1),
            jitter: true,
        }
    }
}

impl From<&ConcurrencyConfig> for RetryPolicy {
    fn from(config: &ConcurrencyConfig) -> Self {
        Self {
            max_attempts: config.max_stale_retries.max(1),
            base_delay: Duration::from_millis(config.base_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Exponential delay before attempt `attempt + 1`, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter && !delay.is_zero() {
            let millis = delay.as_millis() as u64;
            Duration::from_millis(rand::rng().random_range(millis / 2..=millis))
        } else {
            delay
        }
    }
}

/// Re-runs `operation` while it fails with `StaleVersion`.
///
/// The closure receives the 1-based attempt number and must re-read the work
/// item itself, so each retry is computed from a fresh snapshot. Any other
/// error is returned immediately.
pub async fn retry_on_stale<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, WorkflowError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, WorkflowError>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Retrying after version conflict");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    warn!(attempts = attempt, error = %err, "Giving up after repeated version conflicts");
                }
                return Err(err);
            }
        }
    }
}
