//! Task admission and scheduling for the renamer.
//!
//! This crate provides:
//! - A deduplication window for repeated file submissions
//! - A per-user task queue with a bounded concurrency gate
//! - A notifier that retries status messages on rate limits
//! - Generic retry utilities

pub mod dedup;
pub mod error;
pub mod metrics;
pub mod notifier;
pub mod queue;
pub mod retry;

pub use dedup::{DedupWindow, DEFAULT_DEDUP_WINDOW};
pub use error::{QueueError, QueueResult};
pub use notifier::{NotifyError, NotifyResult, RateLimitedNotifier};
pub use queue::{KeyedTaskQueue, QueueConfig, QueueStats, TaskRunner, DEFAULT_CONCURRENCY};
pub use retry::{
    parse_retry_after, retry_when, BackoffPolicy, FailureTracker, RetryConfig,
    RetryResult, DEFAULT_RETRY_AFTER,
};
