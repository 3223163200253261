//! Queue and notifier metrics.

use metrics::{counter, gauge};

/// Metric name constants for consistency.
pub mod names {
    /// Tasks accepted by the queue.
    pub const TASKS_SUBMITTED_TOTAL: &str = "renamer_queue_submitted_total";

    /// Tasks currently holding a gate slot, across all users.
    pub const TASKS_RUNNING: &str = "renamer_queue_running";

    /// Admissions suppressed by the deduplication window.
    pub const DUPLICATES_TOTAL: &str = "renamer_dedup_rejected_total";

    /// Rate-limit retries by notifier operation.
    pub const NOTIFY_RETRIES_TOTAL: &str = "renamer_notify_retries_total";

    /// Notifier operations that ran out of retries.
    pub const NOTIFY_EXHAUSTED_TOTAL: &str = "renamer_notify_exhausted_total";
}

pub fn record_submitted() {
    counter!(names::TASKS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_running(running: usize) {
    gauge!(names::TASKS_RUNNING).set(running as f64);
}

pub fn record_duplicate() {
    counter!(names::DUPLICATES_TOTAL).increment(1);
}

pub fn record_notify_retry(operation: &'static str) {
    counter!(names::NOTIFY_RETRIES_TOTAL, "operation" => operation).increment(1);
}

pub fn record_notify_exhausted(operation: &'static str) {
    counter!(names::NOTIFY_EXHAUSTED_TOTAL, "operation" => operation).increment(1);
}
