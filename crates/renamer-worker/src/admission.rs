//! Turning inbound files into queued tasks.

use std::sync::Arc;
use tracing::{debug, info, warn};

use renamer_messaging::IncomingFile;
use renamer_models::{SourceRef, Task};
use renamer_queue::{DedupWindow, KeyedTaskQueue, RateLimitedNotifier};
use renamer_store::MetadataService;

use crate::error::AdmissionError;
use crate::metrics::record_admission_rejected;

/// Checks an inbound file and enqueues it.
pub struct Admission {
    store: Arc<dyn MetadataService>,
    notifier: RateLimitedNotifier,
    dedup: DedupWindow,
    queue: KeyedTaskQueue,
}

impl Admission {
    pub fn new(
        store: Arc<dyn MetadataService>,
        notifier: RateLimitedNotifier,
        dedup: DedupWindow,
        queue: KeyedTaskQueue,
    ) -> Self {
        Self {
            store,
            notifier,
            dedup,
            queue,
        }
    }

    pub fn queue(&self) -> &KeyedTaskQueue {
        &self.queue
    }

    /// Validate `file` into a task.
    ///
    /// The template is checked first, then the media kind, then the
    /// deduplication window, so a rejected file never occupies the window.
    pub async fn check(&self, file: &IncomingFile) -> Result<Task, AdmissionError> {
        if let Err(e) = self.store.ensure_user(file.user_id).await {
            warn!(user_id = file.user_id.0, error = %e, "Could not register user");
        }

        if self.store.get_format_template(file.user_id).await?.is_none() {
            return Err(AdmissionError::NoTemplate);
        }

        let kind = file.media_kind.ok_or(AdmissionError::UnsupportedMedia)?;

        if !self.dedup.admit(&file.file_id) {
            return Err(AdmissionError::Duplicate);
        }

        let file_name = file
            .file_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| kind.default_file_name().to_string());

        let mut task = Task::new(
            file.user_id,
            file.chat_id,
            SourceRef {
                file_id: file.file_id.clone(),
                thumb_file_id: file.thumb_file_id.clone(),
            },
            file_name,
            kind,
        )
        .with_requester(file.requester.clone());
        if let Some(size) = file.file_size {
            task = task.with_file_size(size);
        }
        Ok(task)
    }

    /// Admit `file` and submit the task. Rejections are answered here.
    pub async fn handle(&self, file: IncomingFile) -> Result<(), AdmissionError> {
        let result = match self.check(&file).await {
            Ok(task) => {
                info!(
                    task_id = %task.id,
                    user_id = task.user_id.0,
                    media_kind = %task.media_kind,
                    file_name = %task.file_name,
                    "Task admitted"
                );
                self.queue.submit(task).await.map_err(AdmissionError::from)
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            record_admission_rejected(e.reason());
            debug!(user_id = file.user_id.0, file_id = %file.file_id, reason = e.reason(), "File not admitted");
            if let Some(reply) = e.user_reply() {
                self.notifier.send_logged(file.chat_id, reply).await;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use renamer_messaging::mock::RecordingTransport;
    use renamer_models::{ChatId, MediaKind, MessageRef, TaskOutcome, UserId};
    use renamer_queue::{QueueConfig, TaskRunner};
    use renamer_store::InMemoryMetadataStore;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Default)]
    struct CollectingRunner {
        tasks: Mutex<Vec<Task>>,
    }

    #[async_trait]
    impl TaskRunner for CollectingRunner {
        async fn run(&self, task: Task) -> TaskOutcome {
            self.tasks.lock().unwrap().push(task);
            TaskOutcome::Completed { degraded: None }
        }
    }

    struct Fixture {
        transport: Arc<RecordingTransport>,
        store: Arc<InMemoryMetadataStore>,
        runner: Arc<CollectingRunner>,
        admission: Admission,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(RecordingTransport::new());
        let store = Arc::new(InMemoryMetadataStore::new());
        let runner = Arc::new(CollectingRunner::default());
        let notifier = RateLimitedNotifier::new(transport.clone(), 3);
        let queue = KeyedTaskQueue::new(QueueConfig::default(), runner.clone(), notifier.clone());
        let admission = Admission::new(store.clone(), notifier, DedupWindow::default(), queue);
        Fixture {
            transport,
            store,
            runner,
            admission,
        }
    }

    fn incoming(file_id: &str, kind: Option<MediaKind>) -> IncomingFile {
        IncomingFile {
            update_id: 1,
            chat_id: ChatId(10),
            user_id: UserId(10),
            requester: "@sender".to_string(),
            message_id: MessageRef(99),
            media_kind: kind,
            file_id: file_id.to_string(),
            file_name: Some("Show.S01E02.720p.mp4".to_string()),
            file_size: Some(1024),
            thumb_file_id: Some("thumb-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_no_template_replies_once_and_creates_no_task() {
        let f = fixture();

        let err = f.admission.handle(incoming("file-1", Some(MediaKind::Video))).await.unwrap_err();

        assert!(matches!(err, AdmissionError::NoTemplate));
        assert_eq!(f.transport.sent().len(), 1);
        assert!(f.transport.sent()[0].1.contains("/autorename"));
        assert_eq!(f.admission.queue().total_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_media_is_answered() {
        let f = fixture();
        f.store.set_format_template(UserId(10), "Show {episode}").await.unwrap();

        let err = f.admission.handle(incoming("photo-1", None)).await.unwrap_err();

        assert!(matches!(err, AdmissionError::UnsupportedMedia));
        assert_eq!(f.transport.sent()[0].1, "Unsupported file type");
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_dropped_silently() {
        let f = fixture();
        f.store.set_format_template(UserId(10), "Show {episode}").await.unwrap();

        assert_ok!(f.admission.handle(incoming("file-1", Some(MediaKind::Video))).await);
        let err = assert_err!(f.admission.handle(incoming("file-1", Some(MediaKind::Video))).await);
        assert!(matches!(err, AdmissionError::Duplicate));
        assert!(f.transport.sent().is_empty());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_ok!(f.admission.handle(incoming("file-1", Some(MediaKind::Video))).await);

        f.admission.queue().drain(Duration::from_secs(5)).await.unwrap();
        assert_eq!(f.runner.tasks.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_task_carries_source_details() {
        let f = fixture();
        f.store.set_format_template(UserId(10), "Show {episode}").await.unwrap();

        let mut file = incoming("file-9", Some(MediaKind::Audio));
        file.file_name = None;
        let task = f.admission.check(&file).await.unwrap();

        assert_eq!(task.file_name, "audio");
        assert_eq!(task.requester, "@sender");
        assert_eq!(task.file_size, Some(1024));
        assert_eq!(task.source.thumb_file_id.as_deref(), Some("thumb-1"));
        assert!(f.store.get_tag(UserId(10), renamer_models::TagField::Title).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let f = fixture();
        f.store.set_format_template(UserId(10), "Show {episode}").await.unwrap();
        f.admission.queue().close();

        let err = f.admission.handle(incoming("file-1", Some(MediaKind::Video))).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Queue(_)));
        assert_eq!(f.transport.sent().len(), 1);
    }
}
