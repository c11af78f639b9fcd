//! Retry and backoff policy for the transport.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

use crate::config::ClientConfig;

/// Decides whether a failed attempt is retried and how long to wait first.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_factor: f64,
    retryable: Vec<u16>,
    default_rate_limit_wait: Duration,
}

impl RetryPolicy {
    /// Build a policy from client settings.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_factor: config.backoff_factor,
            retryable: config.retryable_statuses.clone(),
            default_rate_limit_wait: Duration::try_from_secs_f64(config.default_rate_limit_wait)
                .unwrap_or(Duration::MAX),
        }
    }

    /// Total attempts allowed per request.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether `status` is in the retryable set.
    pub fn is_retryable(&self, status: StatusCode) -> bool {
        self.retryable.contains(&status.as_u16())
    }

    /// Exponential delay after failed attempt number `attempt` (counted from 1).
    ///
    /// Saturates at [`Duration::MAX`] when the product does not fit.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        Duration::try_from_secs_f64(self.backoff_factor * 2f64.powi(exponent))
            .unwrap_or(Duration::MAX)
    }

    /// Wait before the next attempt after a retryable response.
    ///
    /// A 429 waits for its `Retry-After` value, or the default rate-limit
    /// wait when the header is missing or unusable. Everything else backs off.
    pub fn delay_for_status(&self, attempt: u32, status: StatusCode, headers: &HeaderMap) -> Duration {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return retry_after(headers, Utc::now()).unwrap_or(self.default_rate_limit_wait);
        }
        self.backoff(attempt)
    }
}

/// Parse a `Retry-After` header as delta-seconds or an HTTP-date.
///
/// Values that do not fit a [`Duration`] count as unusable.
pub(crate) fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
