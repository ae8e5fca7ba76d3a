//! Rate-limit-aware retry wrapper for remote calls.
//!
//! [`retry`] runs an async operation until it succeeds or fails terminally.
//! Failures are classified by downcasting to [`RecapError`]:
//!
//! - **Rate limited** (`RecapError::RateLimited`, or a `reqwest` error with
//!   status 429) → sleep for the remote's hint (or the configured cooldown)
//!   and retry the same operation. These waits are not counted against
//!   `max_retries`; they are bounded only by `max_rate_limit_wait`.
//! - **Permanent** (`InvalidInput`, `NotFound`, `AccessDenied`,
//!   `PersistenceConflict`) → give up immediately.
//! - **Anything else** → up to `max_retries` attempts in total, sleeping
//!   `base_delay * 2^attempt` between them.
//!
//! The terminal failure is returned as a [`RetryError`] value so callers
//! can persist a placeholder instead of aborting a batch.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::config::RetryConfig;
use crate::error::RecapError;

/// Retry tuning. Built from `[retry]` in the config, or directly in tests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub rate_limit_cooldown: Duration,
    /// Total rate-limit waiting allowed per operation; `None` waits forever.
    pub max_rate_limit_wait: Option<Duration>,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            rate_limit_cooldown: Duration::from_secs(config.rate_limit_cooldown_secs),
            max_rate_limit_wait: match config.max_rate_limit_wait_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    /// Delay after the `attempt`-th failure (1-based): `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Terminal outcome of [`retry`].
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("{label} failed after {attempts} attempts: {last_error:#}")]
    Exhausted {
        label: String,
        attempts: u32,
        last_error: anyhow::Error,
    },

    #[error("{label} failed: {last_error:#}")]
    Permanent {
        label: String,
        last_error: anyhow::Error,
    },

    #[error("{label} still rate limited after waiting {}s: {last_error:#}", .waited.as_secs())]
    RateLimitCeiling {
        label: String,
        waited: Duration,
        last_error: anyhow::Error,
    },
}

impl RetryError {
    /// The error from the final attempt, for propagation to the caller.
    pub fn into_last_error(self) -> anyhow::Error {
        match self {
            RetryError::Exhausted { last_error, .. }
            | RetryError::Permanent { last_error, .. }
            | RetryError::RateLimitCeiling { last_error, .. } => last_error,
        }
    }
}

enum Failure {
    RateLimited(Option<Duration>),
    Permanent,
    Transient,
}

fn classify(err: &anyhow::Error) -> Failure {
    if let Some(e) = err.downcast_ref::<RecapError>() {
        return match e {
            RecapError::RateLimited { retry_after, .. } => Failure::RateLimited(*retry_after),
            e if e.is_permanent() => Failure::Permanent,
            _ => Failure::Transient,
        };
    }
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        if e.status().map(|s| s.as_u16()) == Some(429) {
            return Failure::RateLimited(None);
        }
    }
    Failure::Transient
}

/// Run `op` under `policy`. `label` names the operation in log entries.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempts = 0u32;
    let mut rate_limited_for = Duration::ZERO;

    loop {
        let err = match op().await {
            Ok(value) => {
                if attempts > 0 || !rate_limited_for.is_zero() {
                    tracing::info!(
                        op = label,
                        failed_attempts = attempts,
                        rate_limit_wait_secs = rate_limited_for.as_secs(),
                        "succeeded after retrying"
                    );
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        match classify(&err) {
            Failure::RateLimited(hint) => {
                let wait = hint.unwrap_or(policy.rate_limit_cooldown);
                if let Some(ceiling) = policy.max_rate_limit_wait {
                    if rate_limited_for + wait > ceiling {
                        tracing::error!(
                            op = label,
                            waited_secs = rate_limited_for.as_secs(),
                            ceiling_secs = ceiling.as_secs(),
                            "giving up: rate limit wait ceiling reached"
                        );
                        return Err(RetryError::RateLimitCeiling {
                            label: label.to_string(),
                            waited: rate_limited_for,
                            last_error: err,
                        });
                    }
                }
                tracing::warn!(
                    op = label,
                    wait_secs = wait.as_secs_f64(),
                    hinted = hint.is_some(),
                    "rate limited; cooling down before retrying"
                );
                tokio::time::sleep(wait).await;
                rate_limited_for += wait;
            }
            Failure::Permanent => {
                tracing::warn!(op = label, error = %err, "permanent failure, not retrying");
                return Err(RetryError::Permanent {
                    label: label.to_string(),
                    last_error: err,
                });
            }
            Failure::Transient => {
                attempts += 1;
                if attempts >= policy.max_retries {
                    tracing::error!(
                        op = label,
                        attempts,
                        error = %err,
                        "giving up after exhausting retries"
                    );
                    return Err(RetryError::Exhausted {
                        label: label.to_string(),
                        attempts,
                        last_error: err,
                    });
                }
                let delay = policy.backoff(attempts);
                tracing::warn!(
                    op = label,
                    attempt = attempts,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
