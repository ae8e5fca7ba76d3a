//! Error taxonomy shared by the fetcher, the model clients, and the store.
//!
//! Functions throughout the crate return [`anyhow::Result`]. Where the
//! *kind* of failure matters (retry decisions, setup versus per-unit
//! failures) the underlying error is a [`RecapError`], which callers
//! recover with `err.downcast_ref::<RecapError>()`.
//!
//! | Variant | Raised when | Retry behaviour |
//! |---------|-------------|-----------------|
//! | `InvalidInput` | malformed URL or identifier | never retried |
//! | `NotFound` | repository, project, or commits missing | never retried |
//! | `AccessDenied` | HTTP 401, or 403 that is not throttling | never retried |
//! | `RateLimited` | HTTP 429 / exhausted GitHub quota | cooldown, not counted |
//! | `RemoteUnavailable` | other non-success HTTP status | bounded backoff |
//! | `GenerationFailure` | model errored or returned unusable output | bounded backoff |
//! | `PersistenceConflict` | duplicate commit hash in the store | never retried |

use std::time::Duration;

use reqwest::header::HeaderMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecapError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{service} denied access ({status}): {body}")]
    AccessDenied {
        service: String,
        status: u16,
        body: String,
    },

    #[error("{service} rate limit exceeded")]
    RateLimited {
        service: String,
        /// How long the remote asked us to wait, when it said so.
        retry_after: Option<Duration>,
    },

    #[error("{service} returned {status}: {body}")]
    RemoteUnavailable {
        service: String,
        status: u16,
        body: String,
    },

    #[error("generation failed: {0}")]
    GenerationFailure(String),

    #[error("conflict: {0}")]
    PersistenceConflict(String),
}

impl RecapError {
    /// True for failures that no amount of retrying will fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            RecapError::InvalidInput(_)
                | RecapError::NotFound(_)
                | RecapError::AccessDenied { .. }
                | RecapError::PersistenceConflict(_)
        )
    }

    /// Map a non-success HTTP response into the taxonomy, consuming its body.
    ///
    /// 429 becomes [`RecapError::RateLimited`] carrying the wait hint from
    /// the response headers, 404 becomes [`RecapError::NotFound`], 401 and
    /// 403 become [`RecapError::AccessDenied`], anything else
    /// [`RecapError::RemoteUnavailable`].
    pub async fn from_response(service: &str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = rate_limit_hint(response.headers(), chrono::Utc::now().timestamp());
            return RecapError::RateLimited {
                service: service.to_string(),
                retry_after,
            };
        }
        let body = response.text().await.unwrap_or_default();
        if status == 404 {
            return RecapError::NotFound(format!("{}: {}", service, body.trim()));
        }
        if status == 401 || status == 403 {
            return RecapError::AccessDenied {
                service: service.to_string(),
                status,
                body,
            };
        }
        RecapError::RemoteUnavailable {
            service: service.to_string(),
            status,
            body,
        }
    }
}

/// Extract a wait hint from rate-limit response headers.
///
/// `retry-after` (seconds) wins; otherwise `x-ratelimit-reset` (epoch
/// seconds) is turned into a delay relative to `now`. A reset time that has
/// already passed still yields one second so the caller never spins.
pub fn rate_limit_hint(headers: &HeaderMap, now: i64) -> Option<Duration> {
    let header_i64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    if let Some(secs) = header_i64("retry-after") {
        return Some(Duration::from_secs(secs.max(1) as u64));
    }

    header_i64("x-ratelimit-reset").map(|reset| Duration::from_secs((reset - now).max(1) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("7"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("2000"));
        assert_eq!(rate_limit_hint(&headers, 1000), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_reset_epoch_relative_to_now() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1005"));
        assert_eq!(rate_limit_hint(&headers, 1000), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_reset_in_the_past_waits_one_second() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("900"));
        assert_eq!(rate_limit_hint(&headers, 1000), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_no_hint() {
        assert_eq!(rate_limit_hint(&HeaderMap::new(), 1000), None);
    }

    #[test]
    fn test_permanent_kinds() {
        assert!(RecapError::InvalidInput("x".into()).is_permanent());
        assert!(RecapError::NotFound("x".into()).is_permanent());
        assert!(RecapError::AccessDenied {
            service: "github".into(),
            status: 401,
            body: "Bad credentials".into()
        }
        .is_permanent());
        assert!(!RecapError::GenerationFailure("x".into()).is_permanent());
        assert!(!RecapError::RateLimited {
            service: "github".into(),
            retry_after: None
        }
        .is_permanent());
    }
}
