//! The single "in progress" message of a task.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use renamer_media::{FfmpegProgress, ProgressCallback};
use renamer_messaging::{TransferCallback, TransferProgress};
use renamer_models::{ChatId, DegradedReason, MessageRef, PipelineStage};
use renamer_queue::RateLimitedNotifier;

/// Owns the task's status message. Delivery failures are logged by the
/// notifier and never surface here.
pub struct StatusReporter {
    notifier: RateLimitedNotifier,
    chat: ChatId,
    message: Option<MessageRef>,
    interval: Duration,
}

impl StatusReporter {
    pub fn new(notifier: RateLimitedNotifier, chat: ChatId, interval: Duration) -> Self {
        Self {
            notifier,
            chat,
            message: None,
            interval,
        }
    }

    pub fn message(&self) -> Option<MessageRef> {
        self.message
    }

    async fn show(&mut self, text: &str) {
        match self.message {
            Some(message) => self.notifier.edit_logged(self.chat, message, text).await,
            None => self.message = self.notifier.send_logged(self.chat, text).await,
        }
    }

    /// Show the status line of `stage`.
    pub async fn stage(&mut self, stage: PipelineStage) {
        self.show(stage.status_text()).await;
    }

    /// Start forwarding byte or FFmpeg progress for `stage`.
    ///
    /// Edits happen at most once per interval and only when the whole
    /// percentage changed. Dropping the tracker stops them.
    pub fn track(&self, stage: PipelineStage) -> ProgressTracker {
        let (latest, mut rx) = watch::channel(None::<f64>);
        let latest = Arc::new(latest);

        let ticker = self.message.map(|message| {
            let notifier = self.notifier.clone();
            let chat = self.chat;
            let interval = self.interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker.tick().await;

                let mut shown: Option<u64> = None;
                loop {
                    ticker.tick().await;
                    let Some(pct) = *rx.borrow_and_update() else {
                        continue;
                    };
                    let whole = pct.round() as u64;
                    if shown != Some(whole) {
                        let text = format!("{}\n{}%", stage.status_text(), whole);
                        notifier.edit_logged(chat, message, &text).await;
                        shown = Some(whole);
                    }
                }
            })
        });

        ProgressTracker { latest, ticker }
    }

    /// Delete the status message and tell the user about degraded delivery.
    pub async fn finish(self, degraded: Option<&DegradedReason>) {
        if let Some(message) = self.message {
            self.notifier.delete_logged(self.chat, message).await;
        }
        if let Some(reason) = degraded {
            self.notifier.send_logged(self.chat, &reason.user_notice()).await;
        }
    }

    /// Replace the status message with a failure notice.
    pub async fn fail(mut self, stage: PipelineStage, reason: &str) {
        let text = format!("❌ Failed while {}: {}", stage_verb(stage), reason);
        self.show(&text).await;
    }
}

fn stage_verb(stage: PipelineStage) -> &'static str {
    match stage {
        PipelineStage::Downloading => "downloading",
        PipelineStage::Probing => "inspecting",
        PipelineStage::Muxing => "processing",
        PipelineStage::Uploading => "uploading",
        _ => "processing",
    }
}

/// Receives progress callbacks during one stage.
pub struct ProgressTracker {
    latest: Arc<watch::Sender<Option<f64>>>,
    ticker: Option<JoinHandle<()>>,
}

impl ProgressTracker {
    pub fn transfer_callback(&self) -> TransferCallback {
        let latest = Arc::clone(&self.latest);
        Box::new(move |p: TransferProgress| {
            if let Some(pct) = p.percentage() {
                latest.send_replace(Some(pct));
            }
        })
    }

    /// FFmpeg progress relative to `total_secs`; ignored when unknown.
    pub fn ffmpeg_callback(&self, total_secs: Option<f64>) -> ProgressCallback {
        let latest = Arc::clone(&self.latest);
        let total_ms = total_secs.map(|s| (s * 1000.0) as i64).unwrap_or(0);
        Box::new(move |p: FfmpegProgress| {
            if total_ms > 0 || p.is_complete {
                latest.send_replace(Some(p.percentage(total_ms)));
            }
        })
    }

    pub fn latest(&self) -> Option<f64> {
        *self.latest.borrow()
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
