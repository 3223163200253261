//! Per-run state carried between stages.

use std::path::{Path, PathBuf};
use tracing::debug;

use renamer_media::{remove_paths, MediaProbe};
use renamer_models::{DegradedReason, PipelineStage, Task};

use crate::error::WorkerError;
use crate::pipeline::naming::ResolvedName;

/// Working files of one run. Every path set here is removed at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkPaths {
    pub download: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub thumbnail: Option<PathBuf>,
}

impl WorkPaths {
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        [&self.download, &self.output, &self.thumbnail]
            .into_iter()
            .filter_map(|p| p.as_deref())
    }
}

/// State of one stage-machine execution.
#[derive(Debug, Clone)]
pub struct PipelineRecord {
    pub task: Task,
    pub stage: PipelineStage,
    pub name: Option<ResolvedName>,
    pub paths: WorkPaths,
    /// Probe of the downloaded source, `None` when ffprobe failed
    pub input: Option<MediaProbe>,
    pub output_duration: Option<f64>,
    /// Normalized thumbnail ready for upload
    pub thumbnail: Option<PathBuf>,
    pub degraded: Option<DegradedReason>,
}

impl PipelineRecord {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            stage: PipelineStage::Admitted,
            name: None,
            paths: WorkPaths::default(),
            input: None,
            output_duration: None,
            thumbnail: None,
            degraded: None,
        }
    }

    /// Move to `next`. Stages only move forward.
    pub fn enter(mut self, next: PipelineStage) -> Self {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal stage transition {} -> {}",
            self.stage,
            next
        );
        debug!(task_id = %self.task.id, from = %self.stage, to = %next, "Stage transition");
        self.stage = next;
        self
    }

    /// Name delivered to the user, falling back to the source name.
    pub fn delivered_name(&self) -> &str {
        self.name
            .as_ref()
            .map(|n| n.file_name.as_str())
            .unwrap_or(&self.task.file_name)
    }

    /// Remove every working file and the emptied task directories.
    ///
    /// Returns how many files were deleted.
    pub async fn cleanup(&self) -> usize {
        let removed = remove_paths(self.paths.iter()).await;
        for dir in [&self.paths.download, &self.paths.output]
            .into_iter()
            .flatten()
            .filter_map(|p| p.parent())
        {
            // Fails harmlessly when shared or not empty
            let _ = tokio::fs::remove_dir(dir).await;
        }
        removed
    }
}

/// A stage could not complete; the run ends as Failed.
#[derive(Debug)]
pub struct StageFailure {
    pub record: PipelineRecord,
    pub stage: PipelineStage,
    pub error: WorkerError,
}

pub type StageResult = Result<PipelineRecord, Box<StageFailure>>;

impl StageFailure {
    /// Fail `record` at its current stage.
    pub fn at(record: PipelineRecord, error: impl Into<WorkerError>) -> Box<Self> {
        let stage = record.stage;
        Box::new(Self {
            record,
            stage,
            error: error.into(),
        })
    }
}
