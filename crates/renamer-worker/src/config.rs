//! Worker configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use renamer_messaging::DEFAULT_API_URL;
use renamer_models::encoding::DURATION_TOLERANCE_SECS;
use renamer_models::ChatId;
use renamer_queue::{DEFAULT_CONCURRENCY, DEFAULT_DEDUP_WINDOW};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Clone)]
pub struct WorkerConfig {
    /// Bot API token
    pub bot_token: String,
    /// Bot API base URL
    pub bot_api_url: String,
    /// Chat that receives a copy of every renamed file
    pub dump_chat: Option<ChatId>,
    /// Work directory for downloads, outputs and thumbnails
    pub work_dir: PathBuf,
    /// Redis URL; preferences stay in memory when unset
    pub redis_url: Option<String>,
    /// Tasks of one user that may run at once
    pub per_user_concurrency: usize,
    /// Window in which a repeated file id is dropped
    pub dedup_window: Duration,
    /// Status-message retries after the first attempt
    pub notify_max_retries: u32,
    /// Allowed drift between input and output duration
    pub duration_tolerance_secs: f64,
    /// FFmpeg run timeout
    pub ffmpeg_timeout_secs: u64,
    /// Minimum spacing of progress edits
    pub progress_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Long-poll timeout for getUpdates
    pub poll_timeout_secs: u64,
    /// Prometheus listener port
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            bot_api_url: DEFAULT_API_URL.to_string(),
            dump_chat: None,
            work_dir: PathBuf::from("/tmp/renamer"),
            redis_url: None,
            per_user_concurrency: DEFAULT_CONCURRENCY,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            notify_max_retries: 3,
            duration_tolerance_secs: DURATION_TOLERANCE_SECS,
            ffmpeg_timeout_secs: 3600, // 1 hour
            progress_interval: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(60),
            poll_timeout_secs: 30,
            metrics_port: None,
        }
    }
}

// Keeps the token out of logs
impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("bot_token", &"<redacted>")
            .field("bot_api_url", &self.bot_api_url)
            .field("dump_chat", &self.dump_chat)
            .field("work_dir", &self.work_dir)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "<set>"))
            .field("per_user_concurrency", &self.per_user_concurrency)
            .field("dedup_window", &self.dedup_window)
            .field("notify_max_retries", &self.notify_max_retries)
            .field("duration_tolerance_secs", &self.duration_tolerance_secs)
            .field("ffmpeg_timeout_secs", &self.ffmpeg_timeout_secs)
            .field("progress_interval", &self.progress_interval)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("metrics_port", &self.metrics_port)
            .finish()
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.trim().parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// Only `BOT_TOKEN` is required.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();

        let bot_token = env_string("BOT_TOKEN")
            .ok_or_else(|| WorkerError::config_error("BOT_TOKEN is not set"))?;

        let per_user_concurrency = env_parse("PER_USER_CONCURRENCY")
            .unwrap_or(defaults.per_user_concurrency);
        if per_user_concurrency == 0 {
            return Err(WorkerError::config_error("PER_USER_CONCURRENCY must be at least 1"));
        }

        Ok(Self {
            bot_token,
            bot_api_url: env_string("BOT_API_URL").unwrap_or(defaults.bot_api_url),
            dump_chat: env_parse("DUMP_CHAT_ID").map(ChatId),
            work_dir: env_string("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            redis_url: env_string("REDIS_URL"),
            per_user_concurrency,
            dedup_window: env_parse("DEDUP_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.dedup_window),
            notify_max_retries: env_parse("NOTIFY_MAX_RETRIES")
                .unwrap_or(defaults.notify_max_retries),
            duration_tolerance_secs: env_parse("DURATION_TOLERANCE_SECS")
                .unwrap_or(defaults.duration_tolerance_secs),
            ffmpeg_timeout_secs: env_parse("FFMPEG_TIMEOUT_SECS")
                .unwrap_or(defaults.ffmpeg_timeout_secs),
            progress_interval: env_parse("PROGRESS_UPDATE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.progress_interval),
            shutdown_timeout: env_parse("SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            poll_timeout_secs: env_parse("POLL_TIMEOUT_SECS")
                .unwrap_or(defaults.poll_timeout_secs),
            metrics_port: env_parse("METRICS_PORT"),
        })
    }
}
