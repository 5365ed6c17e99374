//! Failure classification and exponential backoff for segment requests.
//!
//! Every failed request is sorted into a [`FailureType`]. Permanent failures
//! end the segment at once; transient and rate-limited ones are retried by
//! [`RetryPolicy::should_retry`] until the retry budget is spent.
//!
//! ```
//! use std::time::Duration;
//! use fastget_core::download::{DownloadError, RetryDecision, RetryPolicy, classify_error};
//!
//! let policy = RetryPolicy::default();
//! let unavailable = DownloadError::http_status("https://example.com/file.iso", 503);
//! let RetryDecision::Retry { delay, attempt } =
//!     policy.should_retry(classify_error(&unavailable), 2)
//! else {
//!     panic!("a 503 is retried");
//! };
//! assert_eq!(attempt, 3);
//! assert!(delay >= Duration::from_secs(2) && delay <= Duration::from_millis(2250));
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::DownloadError;

/// Default maximum number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Upper bound of the random delay added to every default retry, so segments
/// that failed together do not retry in lockstep.
pub const DEFAULT_RETRY_JITTER: Duration = Duration::from_millis(250);

/// How a failed request should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Read timeout, dropped connection, 5xx, empty body.
    Transient,
    /// 404, local IO errors, a resource that changed under us.
    Permanent,
    /// `429 Too Many Requests`.
    RateLimited,
}

/// Outcome of [`RetryPolicy::should_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then make attempt number `attempt` (the first
    /// request is attempt 1).
    Retry { delay: Duration, attempt: u32 },
    /// Give up.
    DoNotRetry { reason: String },
}

/// Exponential backoff shared by every segment of a download.
///
/// The delay after `n` consecutive failures is
/// `min(base_delay * multiplier^(n - 1), max_delay)` plus up to `max_jitter`,
/// so the defaults (5 retries, 1 s base, 10 s cap, factor 2, 250 ms jitter)
/// wait roughly 1, 2, 4, 8 and 10 seconds.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
    /// Zero disables jitter.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: DEFAULT_RETRY_JITTER,
        }
    }
}

impl RetryPolicy {
    /// A policy without jitter. `max_retries` counts retries after the first
    /// attempt, so 0 means a single request.
    #[must_use]
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            backoff_multiplier,
            max_jitter: Duration::ZERO,
        }
    }

    /// The default backoff and jitter with a different retry budget.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decides what follows the `failures`-th consecutive failure (counting
    /// the one just observed).
    #[instrument(level = "trace", skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, failure_type: FailureType, failures: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure".to_string(),
            };
        }

        if failures > self.max_retries {
            debug!(failures, max = self.max_retries, "retry budget spent");
            return RetryDecision::DoNotRetry {
                reason: format!("all {} retries exhausted", self.max_retries),
            };
        }

        RetryDecision::Retry {
            delay: self.backoff(failures),
            attempt: failures + 1,
        }
    }

    fn backoff(&self, failures: u32) -> Duration {
        let exponent = i32::try_from(failures.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = f64::from(self.backoff_multiplier).powi(exponent);
        let millis = (self.base_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Sorts `error` into a [`FailureType`].
///
/// Timeouts, short bodies, connection errors other than TLS, `408` and `5xx`
/// are transient; `429` is rate limiting; everything else is permanent,
/// including an already-exhausted [`DownloadError::SegmentIncomplete`].
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),

        DownloadError::Timeout { .. } | DownloadError::Integrity { .. } => FailureType::Transient,

        DownloadError::Network { source, .. } if is_tls_error(source) => FailureType::Permanent,
        DownloadError::Network { .. } => FailureType::Transient,

        DownloadError::Io { .. }
        | DownloadError::InvalidUrl { .. }
        | DownloadError::ProtocolViolation { .. }
        | DownloadError::ResourceChanged { .. }
        | DownloadError::SegmentIncomplete { .. } => FailureType::Permanent,
    }
}

fn classify_http_status(status: u16) -> FailureType {
    match status {
        429 => FailureType::RateLimited,
        408 | 500..=599 => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

/// Certificate and handshake failures will not fix themselves.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let mut source: Option<&dyn std::error::Error> = Some(error);
    while let Some(current) = source {
        let text = current.to_string().to_lowercase();
        if ["certificate", "tls", "ssl", "handshake"]
            .iter()
            .any(|needle| text.contains(needle))
        {
            return true;
        }
        source = current.source();
    }
    false
}
