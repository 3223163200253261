//! Structured task logging utilities.
//!
//! Provides the tracing subscriber setup and a small helper for logging task
//! lifecycle events with consistent contextual fields.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use renamer_models::{PipelineStage, TaskId, UserId};

/// Initialize tracing: colored output for dev, JSON when `LOG_FORMAT=json`.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,renamer=info,hyper=warn,reqwest=warn"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Task logger for structured logging with consistent formatting.
///
/// Every event carries the task id and the submitting user.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    user_id: i64,
}

impl TaskLogger {
    pub fn new(task_id: &TaskId, user_id: UserId) -> Self {
        Self {
            task_id: task_id.to_string(),
            user_id: user_id.0,
        }
    }

    pub fn log_start(&self, file_name: &str) {
        info!(
            task_id = %self.task_id,
            user_id = self.user_id,
            file_name = %file_name,
            "Task started"
        );
    }

    pub fn log_stage(&self, stage: PipelineStage) {
        info!(
            task_id = %self.task_id,
            user_id = self.user_id,
            stage = %stage,
            "Task entered stage"
        );
    }

    pub fn log_warning(&self, stage: PipelineStage, message: &str) {
        warn!(
            task_id = %self.task_id,
            user_id = self.user_id,
            stage = %stage,
            "Task warning: {}", message
        );
    }

    pub fn log_error(&self, stage: PipelineStage, message: &str) {
        error!(
            task_id = %self.task_id,
            user_id = self.user_id,
            stage = %stage,
            "Task failed: {}", message
        );
    }

    pub fn log_completion(&self, outcome: &str, elapsed_secs: f64) {
        info!(
            task_id = %self.task_id,
            user_id = self.user_id,
            outcome = %outcome,
            elapsed_secs = elapsed_secs,
            "Task completed"
        );
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Span attached to the whole stage-machine run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("task", task_id = %self.task_id, user_id = self.user_id)
    }
}
