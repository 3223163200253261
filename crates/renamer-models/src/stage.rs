//! Pipeline stages and terminal outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of a task inside the stage machine.
///
/// Stages only move forward; `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    #[default]
    Admitted,
    Downloading,
    Probing,
    Muxing,
    Uploading,
    FanningOut,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Admitted => "admitted",
            PipelineStage::Downloading => "downloading",
            PipelineStage::Probing => "probing",
            PipelineStage::Muxing => "muxing",
            PipelineStage::Uploading => "uploading",
            PipelineStage::FanningOut => "fanning_out",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }

    /// Whether `next` is a legal successor of this stage.
    pub fn can_advance_to(&self, next: PipelineStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            PipelineStage::Failed => true,
            _ => next > *self,
        }
    }

    /// Status line shown to the requester while the stage runs.
    pub fn status_text(&self) -> &'static str {
        match self {
            PipelineStage::Admitted => "Queued...",
            PipelineStage::Downloading => "Downloading...",
            PipelineStage::Probing => "Inspecting media...",
            PipelineStage::Muxing => "Processing metadata...",
            PipelineStage::Uploading => "Uploading...",
            PipelineStage::FanningOut => "Finishing...",
            PipelineStage::Done => "Done",
            PipelineStage::Failed => "Failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a completed task was delivered without full processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DegradedReason {
    /// Both remux attempts failed; the original bytes were delivered.
    RemuxFallback,
    /// Output duration drifted beyond tolerance from the input.
    DurationMismatch { input_secs: f64, output_secs: f64 },
}

impl DegradedReason {
    /// Short notice sent to the requester.
    pub fn user_notice(&self) -> String {
        match self {
            DegradedReason::RemuxFallback => {
                "⚠️ Metadata could not be applied; the file was delivered unchanged.".to_string()
            }
            DegradedReason::DurationMismatch {
                input_secs,
                output_secs,
            } => format!(
                "⚠️ The processed file may be incomplete (duration {:.0}s vs {:.0}s of the original).",
                output_secs, input_secs
            ),
        }
    }
}

/// Terminal result of one stage-machine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed {
        #[serde(skip_serializing_if = "Option::is_none")]
        degraded: Option<DegradedReason>,
    },
    Failed {
        stage: PipelineStage,
        message: String,
    },
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, TaskOutcome::Completed { degraded: Some(_) })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Completed { degraded: None } => "completed",
            TaskOutcome::Completed { degraded: Some(_) } => "degraded",
            TaskOutcome::Failed { .. } => "failed",
        }
    }
}
