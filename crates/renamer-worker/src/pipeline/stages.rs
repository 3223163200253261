//! Stage functions of the pipeline.

use std::path::PathBuf;
use tracing::debug;

use renamer_media::{copy_verbatim, extract, normalize_thumbnail};
use renamer_messaging::{InlineButton, TransportError, UploadRequest};
use renamer_models::{DegradedReason, MediaKind, MetadataTags, PipelineStage, TagField, Task, UserId};
use renamer_queue::{retry_when, RetryConfig};

use crate::error::WorkerError;
use crate::logging::TaskLogger;
use crate::metrics::{record_best_effort_failure, record_remux_attempt};

use super::naming::resolve_name;
use super::plan::plan_remux;
use super::record::{PipelineRecord, StageFailure, StageResult};
use super::status::StatusReporter;
use super::Pipeline;

/// Caption of the copy sent to the dump chat.
pub(crate) fn dump_caption(task: &Task, delivered_name: &str) -> String {
    format!(
        "{}\n\n👤 User: {}\n🆔 ID: {}\n📁 File: {}",
        task.media_kind.label(),
        task.requester,
        task.user_id,
        delivered_name
    )
}

impl Pipeline {
    /// Retry policy for file transfers hitting rate limits.
    fn transfer_retry(&self, operation: &str) -> RetryConfig {
        RetryConfig::rate_limited(operation).with_max_retries(self.config.notify_max_retries)
    }

    async fn begin(
        &self,
        record: PipelineRecord,
        stage: PipelineStage,
        status: &mut StatusReporter,
        logger: &TaskLogger,
    ) -> PipelineRecord {
        let record = record.enter(stage);
        logger.log_stage(stage);
        status.stage(stage).await;
        record
    }

    /// Resolve the output name and fetch the source file.
    pub(super) async fn download(
        &self,
        record: PipelineRecord,
        status: &mut StatusReporter,
        logger: &TaskLogger,
    ) -> StageResult {
        let mut record = self.begin(record, PipelineStage::Downloading, status, logger).await;
        let task = &record.task;

        let template = match self.store.get_format_template(task.user_id).await {
            Ok(Some(template)) => template,
            Ok(None) => return Err(StageFailure::at(record, WorkerError::MissingTemplate)),
            Err(e) => return Err(StageFailure::at(record, e)),
        };

        let info = extract(&task.file_name);
        let name = resolve_name(&template, &info, task.media_kind, &task.file_name);
        let dest = self.task_dir("downloads", task).join(&name.file_name);
        debug!(
            season = ?name.season,
            episode = ?name.episode,
            quality = %name.quality,
            file_name = %name.file_name,
            "Resolved output name"
        );

        record.paths.download = Some(dest.clone());
        record.name = Some(name);

        let tracker = status.track(PipelineStage::Downloading);
        let file_id = record.task.source.file_id.as_str();
        let result = retry_when(
            &self.transfer_retry("download_media"),
            TransportError::is_rate_limited,
            || {
                self.transport()
                    .download_media(file_id, &dest, Some(tracker.transfer_callback()))
            },
        )
        .await
        .into_result();
        drop(tracker);

        match result {
            Ok(path) => {
                record.paths.download = Some(path);
                Ok(record)
            }
            Err(e) => Err(StageFailure::at(record, WorkerError::download(e))),
        }
    }

    /// Measure the source. Failure leaves duration and resolution unknown.
    pub(super) async fn probe(
        &self,
        record: PipelineRecord,
        status: &mut StatusReporter,
        logger: &TaskLogger,
    ) -> StageResult {
        let mut record = self.begin(record, PipelineStage::Probing, status, logger).await;
        let Some(input) = record.paths.download.clone() else {
            return Err(StageFailure::at(record, WorkerError::internal("no downloaded file")));
        };

        match self.media.probe(&input).await {
            Ok(probe) => {
                debug!(
                    duration_secs = ?probe.duration_secs,
                    resolution = ?probe.resolution,
                    "Probed source"
                );
                record.input = Some(probe);
            }
            Err(e) => logger.log_warning(
                PipelineStage::Probing,
                &format!("probe failed, duration and resolution unknown: {}", e),
            ),
        }
        Ok(record)
    }

    async fn load_tags(&self, user: UserId, logger: &TaskLogger) -> MetadataTags {
        let mut tags = MetadataTags::default();
        for field in TagField::ALL {
            match self.store.get_tag(user, field).await {
                Ok(Some(value)) => tags.set(field, value),
                Ok(None) => {}
                Err(e) => logger.log_warning(
                    PipelineStage::Muxing,
                    &format!("tag {} unavailable, left empty: {}", field.key(), e),
                ),
            }
        }
        tags
    }

    async fn enhance_quality(&self, user: UserId, logger: &TaskLogger) -> bool {
        self.store
            .get_enhance_quality(user)
            .await
            .unwrap_or_else(|e| {
                logger.log_warning(
                    PipelineStage::Muxing,
                    &format!("enhance setting unavailable: {}", e),
                );
                false
            })
    }

    /// Write tags into a new container, re-encoding when needed.
    ///
    /// Two remux attempts are made; if both fail the original bytes are
    /// delivered under the new name and the completion is degraded.
    pub(super) async fn mux(
        &self,
        record: PipelineRecord,
        status: &mut StatusReporter,
        logger: &TaskLogger,
    ) -> StageResult {
        let mut record = self.begin(record, PipelineStage::Muxing, status, logger).await;
        let Some(input) = record.paths.download.clone() else {
            return Err(StageFailure::at(record, WorkerError::internal("no downloaded file")));
        };

        let user = record.task.user_id;
        let kind = record.task.media_kind;
        let output = self
            .task_dir("metadata", &record.task)
            .join(record.delivered_name());
        record.paths.output = Some(output.clone());

        let tags = self.load_tags(user, logger).await;
        let enhance = kind == MediaKind::Video && self.enhance_quality(user, logger).await;

        let Some(first) = plan_remux(kind, record.input.as_ref(), enhance, &input, &output, tags) else {
            debug!("Not a media file, copying unchanged");
            return match copy_verbatim(&input, &output).await {
                Ok(_) => Ok(record),
                Err(e) => Err(StageFailure::at(record, e)),
            };
        };

        let source = record.input.unwrap_or_default();
        let total_secs = source.duration_secs;
        let tracker = status.track(PipelineStage::Muxing);

        let first_result = self
            .media
            .remux(&first, Some(tracker.ffmpeg_callback(total_secs)))
            .await;
        record_remux_attempt("first", first_result.is_ok());

        let remuxed = match first_result {
            Ok(()) => true,
            Err(e) => {
                logger.log_warning(
                    PipelineStage::Muxing,
                    &format!("remux failed, retrying with forced re-encode: {}", e),
                );
                let retry = first.forced_reencode(kind == MediaKind::Video || source.has_video());
                let retry_result = self
                    .media
                    .remux(&retry, Some(tracker.ffmpeg_callback(total_secs)))
                    .await;
                record_remux_attempt("forced_reencode", retry_result.is_ok());

                match retry_result {
                    Ok(()) => true,
                    Err(e) => {
                        logger.log_warning(
                            PipelineStage::Muxing,
                            &format!("forced re-encode failed, delivering original bytes: {}", e),
                        );
                        false
                    }
                }
            }
        };
        drop(tracker);

        if !remuxed {
            if let Err(e) = copy_verbatim(&input, &output).await {
                return Err(StageFailure::at(record, e));
            }
            record.degraded = Some(DegradedReason::RemuxFallback);
            return Ok(record);
        }

        match self.media.probe(&output).await {
            Ok(probe) => {
                record.output_duration = probe.duration_secs;
                if let (Some(input_secs), Some(output_secs)) =
                    (source.duration_secs, probe.duration_secs)
                {
                    if (output_secs - input_secs).abs() > self.config.duration_tolerance_secs {
                        logger.log_warning(
                            PipelineStage::Muxing,
                            &format!(
                                "duration changed from {:.1}s to {:.1}s",
                                input_secs, output_secs
                            ),
                        );
                        record.degraded = Some(DegradedReason::DurationMismatch {
                            input_secs,
                            output_secs,
                        });
                    }
                }
            }
            Err(e) => logger.log_warning(
                PipelineStage::Muxing,
                &format!("output probe failed, duration not verified: {}", e),
            ),
        }

        Ok(record)
    }

    /// Chat thumbnail, else the embedded video thumbnail, normalized.
    async fn prepare_thumbnail(&self, record: &mut PipelineRecord, logger: &TaskLogger) -> Option<PathBuf> {
        let chat_thumbnail = match self.store.get_thumbnail(record.task.chat_id).await {
            Ok(file_id) => file_id,
            Err(e) => {
                logger.log_warning(
                    PipelineStage::Uploading,
                    &format!("chat thumbnail unavailable: {}", e),
                );
                None
            }
        };

        let file_id = chat_thumbnail.or_else(|| match record.task.media_kind {
            MediaKind::Video => record.task.source.thumb_file_id.clone(),
            _ => None,
        })?;

        let dest = self
            .config
            .work_dir
            .join("thumbs")
            .join(format!("{}.jpg", record.task.id));
        record.paths.thumbnail = Some(dest.clone());

        if let Err(e) = self.transport().download_media(&file_id, &dest, None).await {
            logger.log_warning(
                PipelineStage::Uploading,
                &format!("thumbnail download failed: {}", e),
            );
            return None;
        }

        match normalize_thumbnail(&dest).await {
            Ok(path) => Some(path),
            Err(e) => {
                logger.log_warning(
                    PipelineStage::Uploading,
                    &format!("thumbnail unusable, uploading without: {}", e),
                );
                None
            }
        }
    }

    /// Deliver the renamed file to the requesting chat.
    pub(super) async fn upload(
        &self,
        record: PipelineRecord,
        status: &mut StatusReporter,
        logger: &TaskLogger,
    ) -> StageResult {
        let mut record = self.begin(record, PipelineStage::Uploading, status, logger).await;
        let Some(output) = record.paths.output.clone() else {
            return Err(StageFailure::at(record, WorkerError::internal("no output file")));
        };

        let chat = record.task.chat_id;
        let caption = match self.store.get_caption(chat).await {
            Ok(Some(caption)) if !caption.trim().is_empty() => caption,
            Ok(_) => record.delivered_name().to_string(),
            Err(e) => {
                logger.log_warning(
                    PipelineStage::Uploading,
                    &format!("caption unavailable, using file name: {}", e),
                );
                record.delivered_name().to_string()
            }
        };

        record.thumbnail = self.prepare_thumbnail(&mut record, logger).await;

        let kind = record.task.media_kind;
        let request = UploadRequest::new(chat, output, caption).with_thumbnail(record.thumbnail.clone());
        let tracker = status.track(PipelineStage::Uploading);
        let result = retry_when(
            &self.transfer_retry("upload"),
            TransportError::is_rate_limited,
            || {
                self.transport()
                    .upload(kind, request.clone(), Some(tracker.transfer_callback()))
            },
        )
        .await
        .into_result();
        drop(tracker);

        match result {
            Ok(message) => {
                debug!(message_id = message.0, "Delivered renamed file");
                Ok(record)
            }
            Err(e) => Err(StageFailure::at(record, WorkerError::upload(e))),
        }
    }

    /// Best-effort follow-ups. Never fails the task.
    pub(super) async fn fan_out(
        &self,
        record: PipelineRecord,
        status: &mut StatusReporter,
        logger: &TaskLogger,
    ) -> PipelineRecord {
        let stage = PipelineStage::FanningOut;
        let record = self.begin(record, stage, status, logger).await;
        let task = &record.task;

        if let Err(e) = self.store.increment_rename_count(task.user_id).await {
            logger.log_warning(stage, &format!("rename count not updated: {}", e));
            record_best_effort_failure("rename_count", stage);
        }

        if let (Some(dump_chat), Some(output)) = (self.config.dump_chat, &record.paths.output) {
            let request = UploadRequest::new(dump_chat, output, dump_caption(task, record.delivered_name()))
                .with_thumbnail(record.thumbnail.clone())
                .with_button(InlineButton::callback(
                    "🚫 Ban User",
                    format!("ban_{}", task.user_id),
                ));

            if let Err(e) = self.transport().upload(task.media_kind, request, None).await {
                logger.log_warning(stage, &format!("dump copy not delivered: {}", e));
                record_best_effort_failure("dump", stage);
            }
        }

        record
    }
}
