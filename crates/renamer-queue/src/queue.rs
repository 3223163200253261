//! Per-user task queue with a bounded concurrency gate.
//!
//! Each key (user) owns a FIFO of pending tasks, a semaphore of capacity C
//! and at most one "queue depth" status message. One worker loop per key
//! drains the FIFO: it takes a gate permit, pops the next task and hands both
//! to a spawned run, so up to C tasks of a key execute at once while
//! admission into the gate stays in submission order. Keys never share a
//! gate, so one busy user cannot starve another.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info};

use renamer_models::{ChatId, MessageRef, Task, TaskOutcome, UserId};

use crate::error::{QueueError, QueueResult};
use crate::metrics::{record_running, record_submitted};
use crate::notifier::RateLimitedNotifier;

/// Default per-key concurrency.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Executes one task to a terminal outcome.
///
/// Implementations own their error handling: whatever happens inside a run
/// is reported through the returned outcome.
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    async fn run(&self, task: Task) -> TaskOutcome;
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Gate capacity per key
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Snapshot of one key's queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
}

impl QueueStats {
    pub fn depth(&self) -> usize {
        self.pending + self.running
    }
}

#[derive(Debug, Default)]
struct Slots {
    pending: VecDeque<Task>,
    running: usize,
    loop_active: bool,
}

#[derive(Debug)]
struct DepthNotice {
    chat: ChatId,
    message: MessageRef,
    text: String,
}

struct KeyState {
    key: UserId,
    gate: Arc<Semaphore>,
    slots: Mutex<Slots>,
    notice: tokio::sync::Mutex<Option<DepthNotice>>,
}

impl KeyState {
    fn new(key: UserId, concurrency: usize) -> Self {
        Self {
            key,
            gate: Arc::new(Semaphore::new(concurrency)),
            slots: Mutex::new(Slots::default()),
            notice: tokio::sync::Mutex::new(None),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stats(&self) -> QueueStats {
        let slots = self.slots();
        QueueStats {
            pending: slots.pending.len(),
            running: slots.running,
        }
    }
}

struct Inner {
    config: QueueConfig,
    runner: Arc<dyn TaskRunner>,
    notifier: RateLimitedNotifier,
    keys: Mutex<HashMap<UserId, Arc<KeyState>>>,
    closed: AtomicBool,
    running_total: AtomicUsize,
    settled: Notify,
}

/// Text of the queue-depth status message.
fn depth_text(stats: QueueStats, concurrency: usize) -> String {
    format!(
        "⏳ Queue: {} waiting, {} processing (limit {}). Files are handled in the order you sent them.",
        stats.pending, stats.running, concurrency
    )
}

impl Inner {
    fn key_state(&self, key: UserId) -> Arc<KeyState> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            keys.entry(key)
                .or_insert_with(|| Arc::new(KeyState::new(key, self.config.concurrency))),
        )
    }

    fn existing_key_state(&self, key: UserId) -> Option<Arc<KeyState>> {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
    }

    fn all_key_states(&self) -> Vec<Arc<KeyState>> {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Bring the depth notice in line with the current depth.
    ///
    /// Counts are read while holding the notice lock, so the last refresh to
    /// run always acts on the latest state.
    async fn refresh_notice(&self, state: &KeyState, chat: ChatId) {
        let mut notice = state.notice.lock().await;
        let stats = state.stats();

        if stats.depth() > self.config.concurrency {
            let text = depth_text(stats, self.config.concurrency);
            match notice.as_mut() {
                Some(existing) if existing.text == text => {}
                Some(existing) => {
                    if self
                        .notifier
                        .edit(existing.chat, existing.message, &text)
                        .await
                        .is_ok()
                    {
                        existing.text = text;
                    }
                }
                None => {
                    if let Some(message) = self.notifier.send_logged(chat, &text).await {
                        *notice = Some(DepthNotice {
                            chat,
                            message,
                            text,
                        });
                    }
                }
            }
        } else if let Some(existing) = notice.take() {
            self.notifier
                .delete_logged(existing.chat, existing.message)
                .await;
        }
    }

    fn task_started(&self) {
        let running = self.running_total.fetch_add(1, Ordering::SeqCst) + 1;
        record_running(running);
    }

    fn task_finished(&self) {
        let running = self.running_total.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        record_running(running);
        self.settled.notify_waiters();
    }

    fn total_in_flight(&self) -> usize {
        self.all_key_states()
            .iter()
            .map(|state| state.stats().depth())
            .sum()
    }
}

/// Drain one key's FIFO until it is empty.
async fn worker_loop(inner: Arc<Inner>, state: Arc<KeyState>) {
    debug!(user_id = state.key.0, "Worker loop started");

    loop {
        let permit = match Arc::clone(&state.gate).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // Gates are never closed, but do not strand the FIFO if one is
                state.slots().loop_active = false;
                error!(user_id = state.key.0, "Concurrency gate closed");
                return;
            }
        };

        let task = {
            let mut slots = state.slots();
            match slots.pending.pop_front() {
                Some(task) => {
                    slots.running += 1;
                    task
                }
                None => {
                    slots.loop_active = false;
                    break;
                }
            }
        };

        let chat = task.chat_id;
        inner.task_started();
        // A rate-limited notice must not hold up the next pop
        let inner_notice = Arc::clone(&inner);
        let state_notice = Arc::clone(&state);
        tokio::spawn(async move { inner_notice.refresh_notice(&state_notice, chat).await });

        let inner_run = Arc::clone(&inner);
        let state_run = Arc::clone(&state);
        tokio::spawn(async move {
            let task_id = task.id.clone();
            let runner = Arc::clone(&inner_run.runner);

            // Run in its own task so a panic still releases the slot below
            match tokio::spawn(async move { runner.run(task).await }).await {
                Ok(outcome) => {
                    debug!(task_id = %task_id, outcome = outcome.as_str(), "Task reached terminal state");
                }
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "Task run aborted");
                }
            }

            state_run.slots().running -= 1;
            inner_run.task_finished();
            drop(permit);
            inner_run.refresh_notice(&state_run, chat).await;
        });
    }

    debug!(user_id = state.key.0, "Worker loop idle");
}

/// The per-key task queue.
#[derive(Clone)]
pub struct KeyedTaskQueue {
    inner: Arc<Inner>,
}

impl KeyedTaskQueue {
    pub fn new(config: QueueConfig, runner: Arc<dyn TaskRunner>, notifier: RateLimitedNotifier) -> Self {
        info!(concurrency = config.concurrency, "Task queue created");
        Self {
            inner: Arc::new(Inner {
                config,
                runner,
                notifier,
                keys: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                running_total: AtomicUsize::new(0),
                settled: Notify::new(),
            }),
        }
    }

    /// Enqueue `task` under its user key.
    pub async fn submit(&self, task: Task) -> QueueResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }

        let state = self.inner.key_state(task.user_id);
        let chat = task.chat_id;

        let spawn_loop = {
            let mut slots = state.slots();
            slots.pending.push_back(task);
            !std::mem::replace(&mut slots.loop_active, true)
        };
        record_submitted();

        if spawn_loop {
            tokio::spawn(worker_loop(Arc::clone(&self.inner), Arc::clone(&state)));
        }

        self.inner.refresh_notice(&state, chat).await;
        Ok(())
    }

    /// Pending and running counts for `key`.
    pub fn stats(&self, key: UserId) -> QueueStats {
        self.inner
            .existing_key_state(key)
            .map(|state| state.stats())
            .unwrap_or_default()
    }

    /// Tasks pending or running across all keys.
    pub fn total_in_flight(&self) -> usize {
        self.inner.total_in_flight()
    }

    /// Stop accepting submissions. Accepted tasks still run.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Wait until every accepted task has reached a terminal state.
    pub async fn drain(&self, timeout: Duration) -> QueueResult<()> {
        let wait = async {
            loop {
                let settled = self.inner.settled.notified();
                if self.total_in_flight() == 0 {
                    return;
                }
                settled.await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| QueueError::DrainTimeout {
                in_flight: self.total_in_flight(),
            })
    }
}
