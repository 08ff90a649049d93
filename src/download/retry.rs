//! Retry policy for failed download attempts
//!
//! | Condition | Action |
//! |-----------|--------|
//! | Connection / timeout / body transfer error | Retry |
//! | Local I/O error while writing | Retry |
//! | HTTP 5xx, 408, 429 | Retry |
//! | Any other HTTP 4xx (404, 401, 403, ...) | Give up |
//! | Invalid URL, redirect loop | Give up |
//!
//! Delays grow as `base * 2^attempt` plus a uniform jitter in `[0, jitter)` so
//! workers retrying against the same host do not line up.

use crate::config::DownloaderConfig;
use crate::download::fetcher::FetchError;
use reqwest::StatusCode;
use std::time::Duration;

/// Cap on the backoff exponent so the delay cannot overflow
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again
    Retry(Duration),
    /// Abandon the URL
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_jitter,
        }
    }

    pub fn from_config(config: &DownloaderConfig) -> Self {
        Self::new(
            config.max_retries,
            config.retry_base_delay(),
            Duration::from_millis(config.retry_jitter_ms),
        )
    }

    /// Returns true if the error may go away on a later attempt
    pub fn is_retryable(error: &FetchError) -> bool {
        match error {
            FetchError::Status(status) => is_retryable_status(*status),
            FetchError::Transport(e) => match e.status() {
                Some(status) => is_retryable_status(status),
                None => !(e.is_builder() || e.is_redirect()),
            },
            FetchError::Io { .. } => true,
            FetchError::InvalidUrl(_) => false,
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(factor) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(fastrand::u64(0..max_ms))
        }
    }

    /// Decides whether failed attempt number `attempt` (0-based) is retried
    pub fn decide(&self, error: &FetchError, attempt: u32) -> RetryDecision {
        if attempt >= self.max_retries || !Self::is_retryable(error) {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.backoff(attempt))
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}
