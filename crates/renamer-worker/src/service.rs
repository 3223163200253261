//! Service loop: poll updates, admit files, drain on shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use renamer_media::MediaTool;
use renamer_messaging::{BotApiClient, MessagingTransport, UpdatePoller};
use renamer_queue::{
    DedupWindow, FailureTracker, KeyedTaskQueue, QueueConfig, RateLimitedNotifier, RetryConfig,
};
use renamer_store::MetadataService;

use crate::admission::Admission;
use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::pipeline::Pipeline;

/// Backoff between failed polls: 2s doubling up to 60s.
fn poll_backoff() -> RetryConfig {
    RetryConfig {
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(60),
        ..RetryConfig::new("get_updates")
    }
}

/// Wires admission, queue and pipeline together.
pub struct RenameService {
    config: WorkerConfig,
    admission: Admission,
}

impl RenameService {
    pub fn new(
        config: WorkerConfig,
        transport: Arc<dyn MessagingTransport>,
        store: Arc<dyn MetadataService>,
        media: Arc<dyn MediaTool>,
    ) -> Self {
        let notifier = RateLimitedNotifier::new(transport, config.notify_max_retries);
        let pipeline = Arc::new(Pipeline::new(
            config.clone(),
            notifier.clone(),
            Arc::clone(&store),
            media,
        ));
        let queue = KeyedTaskQueue::new(
            QueueConfig {
                concurrency: config.per_user_concurrency,
            },
            pipeline,
            notifier.clone(),
        );
        let admission = Admission::new(store, notifier, DedupWindow::new(config.dedup_window), queue);

        Self { config, admission }
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    /// Poll until `shutdown` resolves, then drain in-flight tasks.
    pub async fn run(&self, client: BotApiClient, shutdown: impl Future<Output = ()>) -> WorkerResult<()> {
        let mut poller = UpdatePoller::new(client, self.config.poll_timeout_secs);
        let mut failures = FailureTracker::new(3);
        let backoff = poll_backoff();
        tokio::pin!(shutdown);

        info!(
            concurrency = self.config.per_user_concurrency,
            work_dir = %self.config.work_dir.display(),
            "Rename service started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping update polling");
                    break;
                }
                batch = poller.next_batch() => match batch {
                    Ok(files) => {
                        failures.record_success();
                        for file in files {
                            // Rejections are answered and counted inside
                            let _ = self.admission.handle(file).await;
                        }
                    }
                    Err(e) => {
                        if failures.record_failure() {
                            warn!(error = %e, offset = poller.offset(), "Polling updates failed");
                        }
                        let delay = backoff.delay_for(failures.failure_count(), "");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.shutdown().await
    }

    /// Stop admitting and wait for in-flight tasks to reach cleanup.
    pub async fn shutdown(&self) -> WorkerResult<()> {
        let queue = self.admission.queue();
        queue.close();

        info!(in_flight = queue.total_in_flight(), "Waiting for in-flight tasks to complete...");
        match queue.drain(self.config.shutdown_timeout).await {
            Ok(()) => {
                info!("All tasks finished");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Shutdown timed out");
                Err(e.into())
            }
        }
    }
}
