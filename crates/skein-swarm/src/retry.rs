//! Bounded retry driver.
//!
//! Each attempt returns an explicit [`Attempt`]; the driver matches on it
//! instead of inspecting errors, backs off exponentially between retryable
//! failures and never exceeds the caller's attempt budget.

use crate::error::{SwarmError, SwarmResult};
use skein_core::config::RetryConfig;
use skein_crypto::random::random_index;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Outcome of one attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    /// Done
    Success(T),
    /// Worth another try after backoff
    Retryable(SwarmError),
    /// Stop now
    Permanent(SwarmError),
}

impl<T> From<SwarmResult<T>> for Attempt<T> {
    fn from(result: SwarmResult<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) if err.is_retryable() => Self::Retryable(err),
            Err(err) => Self::Permanent(err),
        }
    }
}

/// Backoff and attempt budget.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_backoff: Duration,
    /// Delay ceiling
    pub max_backoff: Duration,
    /// Growth per attempt
    pub multiplier: f64,
    /// Randomize each delay by up to ±25%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier.max(1.0),
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Policy with a single attempt.
    #[must_use]
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let cap = self.max_backoff.as_secs_f64();
        let mut secs = (self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent)).min(cap);
        if self.jitter {
            // Falls back to no jitter if the OS RNG is unavailable.
            let per_mille = random_index(501).unwrap_or(250);
            #[allow(clippy::cast_precision_loss)]
            let factor = (750 + per_mille) as f64 / 1000.0;
            secs = (secs * factor).min(cap);
        }
        Duration::from_secs_f64(secs)
    }
}

/// Run `op` until it succeeds, fails permanently, the budget runs out or
/// `cancel` fires.
///
/// `op` receives the 1-based attempt number.
///
/// # Errors
///
/// - the permanent error of the failing attempt
/// - [`SwarmError::RetriesExhausted`] wrapping the last retryable error
/// - [`SwarmError::Cancelled`] if cancelled before or between attempts
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, cancel: &CancellationToken, mut op: F) -> SwarmResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(SwarmError::Cancelled);
        }
        match op(attempt).await {
            Attempt::Success(value) => return Ok(value),
            Attempt::Permanent(err) => return Err(err),
            Attempt::Retryable(err) => {
                if attempt >= policy.max_attempts {
                    return Err(SwarmError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                let delay = policy.backoff(attempt);
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                debug!(attempt, delay_ms, error = %err, "retrying");
                tokio::select! {
                    () = cancel.cancelled() => return Err(SwarmError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}
