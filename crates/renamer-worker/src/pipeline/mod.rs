//! The stage machine that renames one file.
//!
//! A run walks `Downloading → Probing → Muxing → Uploading → FanningOut` and
//! ends in `Done` or `Failed`. Each stage takes the [`PipelineRecord`] by
//! value and hands it on, or returns a [`StageFailure`] carrying the record
//! so the working files can still be cleaned up. Cleanup runs on every exit
//! path; the queue releases the gate slot when [`Pipeline::execute`] returns.

mod naming;
mod plan;
mod record;
mod stages;
mod status;

pub use naming::{resolve_name, ResolvedName};
pub use plan::plan_remux;
pub use record::{PipelineRecord, StageFailure, StageResult, WorkPaths};
pub use status::{ProgressTracker, StatusReporter};

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

use renamer_media::MediaTool;
use renamer_messaging::MessagingTransport;
use renamer_models::{PipelineStage, Task, TaskOutcome};
use renamer_queue::{RateLimitedNotifier, TaskRunner};
use renamer_store::MetadataService;

use crate::config::WorkerConfig;
use crate::logging::TaskLogger;
use crate::metrics::{record_cleanup, record_task_finished};

/// Runs tasks through the stages with shared collaborators.
pub struct Pipeline {
    config: WorkerConfig,
    notifier: RateLimitedNotifier,
    store: Arc<dyn MetadataService>,
    media: Arc<dyn MediaTool>,
}

impl Pipeline {
    pub fn new(
        config: WorkerConfig,
        notifier: RateLimitedNotifier,
        store: Arc<dyn MetadataService>,
        media: Arc<dyn MediaTool>,
    ) -> Self {
        Self {
            config,
            notifier,
            store,
            media,
        }
    }

    fn transport(&self) -> &Arc<dyn MessagingTransport> {
        self.notifier.transport()
    }

    /// `work_dir/area/user/task`, so equal names of one user never collide.
    fn task_dir(&self, area: &str, task: &Task) -> PathBuf {
        self.config
            .work_dir
            .join(area)
            .join(task.user_id.0.to_string())
            .join(task.id.to_string())
    }

    /// Run `task` to a terminal outcome.
    pub async fn execute(&self, task: Task) -> TaskOutcome {
        let logger = TaskLogger::new(&task.id, task.user_id);
        let span = logger.create_span();
        self.execute_logged(task, logger).instrument(span).await
    }

    async fn execute_logged(&self, task: Task, logger: TaskLogger) -> TaskOutcome {
        let started = Instant::now();
        logger.log_start(&task.file_name);

        let mut status = StatusReporter::new(
            self.notifier.clone(),
            task.chat_id,
            self.config.progress_interval,
        );

        let result = self
            .run_stages(PipelineRecord::new(task), &mut status, &logger)
            .await;

        let (record, outcome) = match result {
            Ok(record) => {
                status.finish(record.degraded.as_ref()).await;
                let outcome = TaskOutcome::Completed {
                    degraded: record.degraded.clone(),
                };
                (record, outcome)
            }
            Err(failure) => {
                let StageFailure {
                    record,
                    stage,
                    error,
                } = *failure;
                logger.log_error(stage, &error.to_string());
                status.fail(stage, &error.user_message()).await;
                let record = record.enter(PipelineStage::Failed);
                let outcome = TaskOutcome::Failed {
                    stage,
                    message: error.to_string(),
                };
                (record, outcome)
            }
        };

        let removed = record.cleanup().await;
        record_cleanup(removed);

        let elapsed = started.elapsed().as_secs_f64();
        record_task_finished(&outcome, elapsed);
        logger.log_completion(outcome.as_str(), elapsed);
        outcome
    }

    async fn run_stages(
        &self,
        record: PipelineRecord,
        status: &mut StatusReporter,
        logger: &TaskLogger,
    ) -> StageResult {
        let record = self.download(record, status, logger).await?;
        let record = self.probe(record, status, logger).await?;
        let record = self.mux(record, status, logger).await?;
        let record = self.upload(record, status, logger).await?;
        let record = self.fan_out(record, status, logger).await;
        Ok(record.enter(PipelineStage::Done))
    }
}

#[async_trait]
impl TaskRunner for Pipeline {
    async fn run(&self, task: Task) -> TaskOutcome {
        self.execute(task).await
    }
}
