//! Retry utilities.
//!
//! One retry loop parameterized by a predicate that decides whether an error
//! is worth retrying and a backoff policy that picks the wait. The notifier
//! uses it with the rate-limit predicate and the platform's wait hint.

use regex::Regex;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Wait used when a rate-limit message carries no usable hint.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

static RETRY_AFTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:retry after|wait of|retry_after["']?\s*[:=])\s*(\d+)"#).unwrap()
});

/// Extract the suggested wait from a rate-limit message.
///
/// Understands `retry after N`, `wait of N seconds` and `retry_after: N`.
pub fn parse_retry_after(message: &str) -> Option<Duration> {
    RETRY_AFTER_RE
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// How long to wait before the next attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffPolicy {
    /// `base_delay * 2^attempt`, capped at `max_delay`.
    Exponential,
    /// Wait the duration the error message asks for, else `default`.
    /// The hint is honoured as given; `max_delay` does not apply.
    RetryAfterHint { default: Duration },
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Cap for exponential backoff.
    pub max_delay: Duration,
    pub policy: BackoffPolicy,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            policy: BackoffPolicy::Exponential,
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the given operation name.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    /// Config that honours rate-limit wait hints.
    pub fn rate_limited(operation_name: impl Into<String>) -> Self {
        Self {
            policy: BackoffPolicy::RetryAfterHint {
                default: DEFAULT_RETRY_AFTER,
            },
            ..Self::new(operation_name)
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retry number `attempt`, given the error that caused it.
    pub fn delay_for(&self, attempt: u32, error_message: &str) -> Duration {
        match &self.policy {
            BackoffPolicy::Exponential => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(self.max_delay),
            BackoffPolicy::RetryAfterHint { default } => {
                parse_retry_after(error_message).unwrap_or(*default)
            }
        }
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Every allowed attempt failed with a retryable error.
    Exhausted { error: E, attempts: u32 },
    /// The predicate refused to retry this error.
    NotRetried { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    /// Collapse into a plain `Result`, dropping the failure kind.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::Exhausted { error, .. } | RetryResult::NotRetried { error, .. } => Err(error),
        }
    }
}

/// Execute an async operation, retrying errors for which `should_retry` holds.
///
/// ```ignore
/// let config = RetryConfig::rate_limited("send_message").with_max_retries(3);
/// let result = retry_when(&config, TransportError::is_rate_limited, || {
///     transport.send_message(chat, text)
/// }).await;
/// ```
pub async fn retry_when<F, Fut, T, E, P>(
    config: &RetryConfig,
    should_retry: P,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) if !should_retry(&e) => {
                return RetryResult::NotRetried {
                    error: e,
                    attempts: attempt + 1,
                }
            }
            Err(e) if attempt < config.max_retries => {
                attempt += 1;
                let delay = config.delay_for(attempt, &e.to_string());
                debug!(
                    "{} attempt {} failed, retrying in {:?}: {}",
                    config.operation_name, attempt, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return RetryResult::Exhausted {
                    error: e,
                    attempts: attempt + 1,
                }
            }
        }
    }
}

/// State tracker for repeated operations that may fail intermittently.
///
/// Background loops (update polling) use it to stop flooding the log while
/// the platform is unreachable.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// Record a successful operation (resets failure count).
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 && self.suppressed {
            debug!(
                "Operation recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Record a failed operation.
    ///
    /// Returns `true` if this failure should be logged (not suppressed).
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else if self.consecutive_failures == self.max_logged_failures + 1 {
            self.suppressed = true;
            warn!(
                "Suppressing further failure logs after {} consecutive failures",
                self.max_logged_failures
            );
            false
        } else {
            false
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}
