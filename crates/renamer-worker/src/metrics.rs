//! Prometheus metrics for the worker.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use renamer_models::{PipelineStage, TaskOutcome};

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const TASKS_FINISHED_TOTAL: &str = "renamer_tasks_finished_total";
    pub const TASK_DURATION_SECONDS: &str = "renamer_task_duration_seconds";
    pub const STAGE_FAILURES_TOTAL: &str = "renamer_stage_failures_total";

    /// Remux attempts by attempt kind and result
    pub const REMUX_ATTEMPTS_TOTAL: &str = "renamer_remux_attempts_total";

    pub const ADMISSIONS_REJECTED_TOTAL: &str = "renamer_admissions_rejected_total";
    pub const BEST_EFFORT_FAILURES_TOTAL: &str = "renamer_best_effort_failures_total";
    pub const CLEANUP_FILES_REMOVED_TOTAL: &str = "renamer_cleanup_files_removed_total";
}

/// Serve `/metrics` on `port`.
pub fn install_prometheus(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

pub fn record_task_finished(outcome: &TaskOutcome, duration_secs: f64) {
    let labels = [("outcome", outcome.as_str())];
    counter!(names::TASKS_FINISHED_TOTAL, &labels).increment(1);
    histogram!(names::TASK_DURATION_SECONDS, &labels).record(duration_secs);

    if let TaskOutcome::Failed { stage, .. } = outcome {
        counter!(names::STAGE_FAILURES_TOTAL, "stage" => stage.as_str()).increment(1);
    }
}

/// `attempt` is `"first"` or `"forced_reencode"`.
pub fn record_remux_attempt(attempt: &'static str, success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!(names::REMUX_ATTEMPTS_TOTAL, "attempt" => attempt, "result" => result).increment(1);
}

pub fn record_admission_rejected(reason: &'static str) {
    counter!(names::ADMISSIONS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

/// A best-effort step (`rename_count`, `dump`) failed.
pub fn record_best_effort_failure(step: &'static str, stage: PipelineStage) {
    counter!(names::BEST_EFFORT_FAILURES_TOTAL, "step" => step, "stage" => stage.as_str())
        .increment(1);
}

pub fn record_cleanup(removed: usize) {
    counter!(names::CLEANUP_FILES_REMOVED_TOTAL).increment(removed as u64);
}
