//! End-to-end runs of the stage machine against scripted collaborators.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use renamer_media::{MediaError, MediaProbe, MediaResult, MediaTool, ProgressCallback, RemuxRequest};
use renamer_messaging::mock::{Operation, RecordingTransport, ScriptedFailure};
use renamer_messaging::IncomingFile;
use renamer_models::{
    ChatId, DegradedReason, MediaKind, MessageRef, PipelineStage, SourceRef, Task, TaskOutcome,
    UserId,
};
use renamer_queue::RateLimitedNotifier;
use renamer_store::{InMemoryMetadataStore, MetadataService};
use renamer_worker::{Pipeline, RenameService, WorkerConfig};

const USER: UserId = UserId(7);
const CHAT: ChatId = ChatId(7);
const DUMP: ChatId = ChatId(-100);
const TEMPLATE: &str = "Show S{season}E{episode} [{quality}]";
const DELIVERED: &str = "Show S01E02 [720p].mkv";

/// Media tool whose probe results and remux failures are scripted.
struct ScriptedMediaTool {
    input: Option<MediaProbe>,
    output: Option<MediaProbe>,
    remux_failures: Mutex<usize>,
    requests: Mutex<Vec<RemuxRequest>>,
}

impl ScriptedMediaTool {
    fn new(input: Option<MediaProbe>, output: Option<MediaProbe>) -> Self {
        Self {
            input,
            output,
            remux_failures: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn healthy(duration_secs: f64) -> Self {
        let probe = MediaProbe {
            duration_secs: Some(duration_secs),
            resolution: Some((1280, 720)),
        };
        Self::new(Some(probe), Some(probe))
    }

    fn failing_remuxes(self, count: usize) -> Self {
        *self.remux_failures.lock().unwrap() = count;
        self
    }

    fn requests(&self) -> Vec<RemuxRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaTool for ScriptedMediaTool {
    async fn probe(&self, path: &Path) -> MediaResult<MediaProbe> {
        let is_output = path.components().any(|c| c.as_os_str() == "metadata");
        let probe = if is_output { self.output } else { self.input };
        probe.ok_or_else(|| MediaError::internal("ffprobe failed"))
    }

    async fn remux(&self, request: &RemuxRequest, progress: Option<ProgressCallback>) -> MediaResult<()> {
        self.requests.lock().unwrap().push(request.clone());
        {
            let mut failures = self.remux_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(MediaError::ffmpeg_failed("scripted failure", None, Some(1)));
            }
        }

        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output, b"remuxed media bytes").await?;
        if let Some(callback) = progress {
            callback(renamer_media::FfmpegProgress {
                out_time_ms: 1_000,
                ..Default::default()
            });
        }
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    work_dir: PathBuf,
    transport: Arc<RecordingTransport>,
    store: Arc<InMemoryMetadataStore>,
    media: Arc<ScriptedMediaTool>,
    pipeline: Pipeline,
}

fn config(work_dir: &Path) -> WorkerConfig {
    WorkerConfig {
        bot_token: "123:test".to_string(),
        dump_chat: Some(DUMP),
        work_dir: work_dir.to_path_buf(),
        shutdown_timeout: Duration::from_secs(10),
        ..WorkerConfig::default()
    }
}

async fn harness(media: ScriptedMediaTool) -> Harness {
    let dir = TempDir::new().unwrap();
    let work_dir = dir.path().to_path_buf();
    let transport = Arc::new(RecordingTransport::new());
    let store = Arc::new(InMemoryMetadataStore::new());
    store.set_format_template(USER, TEMPLATE).await.unwrap();
    let media = Arc::new(media);

    let pipeline = Pipeline::new(
        config(&work_dir),
        RateLimitedNotifier::new(transport.clone(), 3),
        store.clone(),
        media.clone(),
    );

    Harness {
        _dir: dir,
        work_dir,
        transport,
        store,
        media,
        pipeline,
    }
}

fn video_task() -> Task {
    Task::new(
        USER,
        CHAT,
        SourceRef {
            file_id: "source-file".to_string(),
            thumb_file_id: Some("source-thumb".to_string()),
        },
        "Show.S01E02.720p.mp4",
        MediaKind::Video,
    )
    .with_requester("@viewer")
}

fn remaining_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}

#[tokio::test]
async fn test_successful_rename_delivers_tagged_file() {
    let h = harness(ScriptedMediaTool::healthy(120.0)).await;

    let outcome = h.pipeline.execute(video_task()).await;

    assert_eq!(outcome, TaskOutcome::Completed { degraded: None });

    let uploads = h.transport.uploads();
    assert_eq!(uploads.len(), 2);
    let delivered = &uploads[0];
    assert_eq!(delivered.chat, CHAT);
    assert_eq!(delivered.kind, MediaKind::Video);
    assert_eq!(delivered.file_name, DELIVERED);
    assert_eq!(delivered.caption, DELIVERED);
    assert_eq!(delivered.content, b"remuxed media bytes");

    let dump = &uploads[1];
    assert_eq!(dump.chat, DUMP);
    assert!(dump.caption.contains("👤 User: @viewer"));
    assert!(dump.caption.contains(DELIVERED));
    assert_eq!(dump.buttons[0].callback_data, "ban_7");

    let requests = h.media.requests();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].reencode_video);
    assert!(!requests[0].reencode_audio);

    // Status message is gone once the task completes
    assert!(h.transport.live_messages(CHAT).is_empty());
    assert!(!h.transport.sent().is_empty());
    assert_eq!(h.store.get_rename_count(USER).await.unwrap(), 1);
    assert!(remaining_files(&h.work_dir).is_empty());
}

#[tokio::test]
async fn test_chat_caption_is_used_when_set() {
    let h = harness(ScriptedMediaTool::healthy(60.0)).await;
    h.store.set_caption(CHAT, Some("From the archive")).await.unwrap();

    h.pipeline.execute(video_task()).await;

    assert_eq!(h.transport.uploads()[0].caption, "From the archive");
}

#[tokio::test]
async fn test_double_remux_failure_delivers_original_bytes() {
    let h = harness(ScriptedMediaTool::healthy(120.0).failing_remuxes(2)).await;

    let outcome = h.pipeline.execute(video_task()).await;

    assert_eq!(
        outcome,
        TaskOutcome::Completed {
            degraded: Some(DegradedReason::RemuxFallback)
        }
    );

    let requests = h.media.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].reencode_video);
    assert!(requests[1].reencode_audio);

    let delivered = &h.transport.uploads()[0];
    assert_eq!(delivered.file_name, DELIVERED);
    assert_eq!(delivered.content, b"source media bytes");

    let live = h.transport.live_messages(CHAT);
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].1, DegradedReason::RemuxFallback.user_notice());
    assert!(remaining_files(&h.work_dir).is_empty());
}

#[tokio::test]
async fn test_forced_reencode_recovers_from_first_failure() {
    let h = harness(ScriptedMediaTool::healthy(120.0).failing_remuxes(1)).await;

    let outcome = h.pipeline.execute(video_task()).await;

    assert_eq!(outcome, TaskOutcome::Completed { degraded: None });
    assert_eq!(h.media.requests().len(), 2);
    assert_eq!(h.transport.uploads()[0].content, b"remuxed media bytes");
}

#[tokio::test]
async fn test_unknown_duration_reencodes_audio_only() {
    let output = MediaProbe {
        duration_secs: Some(30.0),
        resolution: Some((1280, 720)),
    };
    let h = harness(ScriptedMediaTool::new(None, Some(output))).await;

    let outcome = h.pipeline.execute(video_task()).await;

    assert_eq!(outcome, TaskOutcome::Completed { degraded: None });
    let requests = h.media.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].reencode_audio);
    assert!(!requests[0].reencode_video);
}

#[tokio::test]
async fn test_unreadable_video_retry_reencodes_video() {
    let output = MediaProbe {
        duration_secs: Some(30.0),
        resolution: Some((1280, 720)),
    };
    let h = harness(ScriptedMediaTool::new(None, Some(output)).failing_remuxes(1)).await;

    let outcome = h.pipeline.execute(video_task()).await;

    assert_eq!(outcome, TaskOutcome::Completed { degraded: None });
    let requests = h.media.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].reencode_video);
    assert!(requests[1].reencode_video);
    assert!(requests[1].reencode_audio);
}

#[tokio::test]
async fn test_duration_drift_degrades_completion() {
    let input = MediaProbe {
        duration_secs: Some(100.0),
        resolution: Some((1280, 720)),
    };
    let output = MediaProbe {
        duration_secs: Some(50.0),
        ..input
    };
    let h = harness(ScriptedMediaTool::new(Some(input), Some(output))).await;

    let outcome = h.pipeline.execute(video_task()).await;

    let expected = DegradedReason::DurationMismatch {
        input_secs: 100.0,
        output_secs: 50.0,
    };
    assert_eq!(
        outcome,
        TaskOutcome::Completed {
            degraded: Some(expected.clone())
        }
    );
    assert_eq!(h.transport.uploads()[0].content, b"remuxed media bytes");
    assert_eq!(h.transport.live_messages(CHAT)[0].1, expected.user_notice());
}

#[tokio::test]
async fn test_download_failure_fails_and_cleans_up() {
    let h = harness(ScriptedMediaTool::healthy(120.0)).await;
    h.transport.fail_next(
        Operation::Download,
        ScriptedFailure::Api(400, "Bad Request: file is too big".to_string()),
    );

    let outcome = h.pipeline.execute(video_task()).await;

    match outcome {
        TaskOutcome::Failed { stage, .. } => assert_eq!(stage, PipelineStage::Downloading),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(h.transport.uploads().is_empty());
    assert_eq!(h.store.get_rename_count(USER).await.unwrap(), 0);

    let live = h.transport.live_messages(CHAT);
    assert_eq!(live.len(), 1);
    assert!(live[0].1.starts_with("❌ Failed while downloading"));
    assert!(remaining_files(&h.work_dir).is_empty());
}

#[tokio::test]
async fn test_upload_failure_fails_after_mux() {
    let h = harness(ScriptedMediaTool::healthy(120.0)).await;
    h.transport.fail_uploads_to(CHAT);

    let outcome = h.pipeline.execute(video_task()).await;

    match outcome {
        TaskOutcome::Failed { stage, .. } => assert_eq!(stage, PipelineStage::Uploading),
        other => panic!("expected failure, got {:?}", other),
    }
    // No fan-out after a failed delivery
    assert_eq!(h.store.get_rename_count(USER).await.unwrap(), 0);
    assert!(remaining_files(&h.work_dir).is_empty());
}

#[tokio::test]
async fn test_missing_template_fails_at_download() {
    let h = harness(ScriptedMediaTool::healthy(120.0)).await;
    let mut task = video_task();
    task.user_id = UserId(99);

    let outcome = h.pipeline.execute(task).await;

    match outcome {
        TaskOutcome::Failed { stage, .. } => assert_eq!(stage, PipelineStage::Downloading),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(h.transport.attempts(Operation::Download), 0);
    let live = h.transport.live_messages(CHAT);
    assert!(live[0].1.contains("/autorename"));
}

#[tokio::test]
async fn test_dump_failure_does_not_fail_task() {
    let h = harness(ScriptedMediaTool::healthy(120.0)).await;
    h.transport.fail_uploads_to(DUMP);

    let outcome = h.pipeline.execute(video_task()).await;

    assert_eq!(outcome, TaskOutcome::Completed { degraded: None });
    let uploads = h.transport.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].chat, CHAT);
    assert_eq!(h.store.get_rename_count(USER).await.unwrap(), 1);
}

#[tokio::test]
async fn test_counter_failure_does_not_fail_task() {
    let h = harness(ScriptedMediaTool::healthy(120.0)).await;
    h.store.set_fail_increments(true);

    let outcome = h.pipeline.execute(video_task()).await;

    assert_eq!(outcome, TaskOutcome::Completed { degraded: None });
    assert_eq!(h.transport.uploads().len(), 2);
}

#[tokio::test]
async fn test_tag_read_failure_leaves_tags_empty() {
    let h = harness(ScriptedMediaTool::healthy(120.0)).await;
    h.store.set_fail_tag_reads(true);

    let outcome = h.pipeline.execute(video_task()).await;

    assert_eq!(outcome, TaskOutcome::Completed { degraded: None });
    assert_eq!(h.media.requests()[0].tags, renamer_models::MetadataTags::default());
}

#[tokio::test]
async fn test_document_without_media_is_copied_unchanged() {
    let h = harness(ScriptedMediaTool::new(Some(MediaProbe::default()), None)).await;
    let task = Task::new(
        USER,
        CHAT,
        SourceRef {
            file_id: "doc".to_string(),
            thumb_file_id: None,
        },
        "notes S01E02.pdf",
        MediaKind::Document,
    );

    let outcome = h.pipeline.execute(task).await;

    assert_eq!(outcome, TaskOutcome::Completed { degraded: None });
    assert!(h.media.requests().is_empty());
    let delivered = &h.transport.uploads()[0];
    assert_eq!(delivered.kind, MediaKind::Document);
    assert!(delivered.file_name.ends_with(".pdf"));
    assert_eq!(delivered.content, b"source media bytes");
}

fn document_task() -> Task {
    Task::new(
        USER,
        CHAT,
        SourceRef {
            file_id: "doc".to_string(),
            thumb_file_id: None,
        },
        "Show.S01E02.720p.mkv",
        MediaKind::Document,
    )
}

#[tokio::test]
async fn test_unreadable_document_is_still_remuxed() {
    let h = harness(ScriptedMediaTool::new(None, None)).await;

    let outcome = h.pipeline.execute(document_task()).await;

    assert_eq!(outcome, TaskOutcome::Completed { degraded: None });
    let requests = h.media.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].reencode_audio);
    assert_eq!(h.transport.uploads()[0].content, b"remuxed media bytes");
}

#[tokio::test]
async fn test_unreadable_document_falls_back_after_two_remux_failures() {
    let h = harness(ScriptedMediaTool::new(None, None).failing_remuxes(2)).await;

    let outcome = h.pipeline.execute(document_task()).await;

    assert_eq!(
        outcome,
        TaskOutcome::Completed {
            degraded: Some(DegradedReason::RemuxFallback)
        }
    );
    let requests = h.media.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[1].reencode_video);
    assert!(requests[1].reencode_audio);
    let delivered = &h.transport.uploads()[0];
    assert_eq!(delivered.kind, MediaKind::Document);
    assert_eq!(delivered.content, b"source media bytes");
    assert!(remaining_files(&h.work_dir).is_empty());
}

#[tokio::test]
async fn test_service_runs_admitted_files_before_shutdown() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(RecordingTransport::new());
    let store = Arc::new(InMemoryMetadataStore::new());
    store.set_format_template(USER, TEMPLATE).await.unwrap();

    let service = RenameService::new(
        config(dir.path()),
        transport.clone(),
        store.clone(),
        Arc::new(ScriptedMediaTool::healthy(120.0)),
    );

    for (update_id, file_id) in [(1, "a"), (2, "b"), (3, "a")] {
        let file = IncomingFile {
            update_id,
            chat_id: CHAT,
            user_id: USER,
            requester: "@viewer".to_string(),
            message_id: MessageRef(update_id),
            media_kind: Some(MediaKind::Video),
            file_id: file_id.to_string(),
            file_name: Some("Show.S01E02.720p.mp4".to_string()),
            file_size: None,
            thumb_file_id: None,
        };
        let _ = service.admission().handle(file).await;
    }

    service.shutdown().await.unwrap();

    // The repeated id inside the window is dropped silently
    let delivered: Vec<_> = transport
        .uploads()
        .into_iter()
        .filter(|u| u.chat == CHAT)
        .collect();
    assert_eq!(delivered.len(), 2);
    assert_eq!(store.get_rename_count(USER).await.unwrap(), 2);
    assert!(remaining_files(dir.path()).is_empty());
}
