//! Worker error types.

use thiserror::Error;

use renamer_media::MediaError;
use renamer_messaging::TransportError;
use renamer_queue::QueueError;
use renamer_store::StoreError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("No rename format set")]
    MissingTemplate,

    #[error("Download failed: {0}")]
    Download(#[source] TransportError),

    #[error("Upload failed: {0}")]
    Upload(#[source] TransportError),

    #[error("Messaging error: {0}")]
    Transport(#[from] TransportError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn download(e: TransportError) -> Self {
        Self::Download(e)
    }

    pub fn upload(e: TransportError) -> Self {
        Self::Upload(e)
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a retry of the whole task could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            WorkerError::Download(e) | WorkerError::Upload(e) | WorkerError::Transport(e) => {
                e.is_rate_limited() || matches!(e, TransportError::Network(_))
            }
            WorkerError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Short text shown to the requester.
    pub fn user_message(&self) -> String {
        match self {
            WorkerError::MissingTemplate => {
                "Please set a rename format using /autorename".to_string()
            }
            WorkerError::Download(_) => "Could not download the file.".to_string(),
            WorkerError::Upload(e) if e.is_rate_limited() => {
                "Upload was rate limited, please resend the file later.".to_string()
            }
            WorkerError::Upload(_) => "Could not upload the renamed file.".to_string(),
            WorkerError::Store(_) => "Settings are unavailable right now.".to_string(),
            _ => "Processing failed.".to_string(),
        }
    }
}

/// Why an inbound file did not become a task.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("No rename format set")]
    NoTemplate,

    #[error("Unsupported media")]
    UnsupportedMedia,

    /// Same file submitted again inside the deduplication window
    #[error("Duplicate submission")]
    Duplicate,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl AdmissionError {
    /// Reply sent to the user, if any. Duplicates are dropped silently.
    pub fn user_reply(&self) -> Option<&'static str> {
        match self {
            AdmissionError::NoTemplate => Some("Please set a rename format using /autorename"),
            AdmissionError::UnsupportedMedia => Some("Unsupported file type"),
            AdmissionError::Duplicate => None,
            AdmissionError::Store(_) => Some("Settings are unavailable right now, please try again."),
            AdmissionError::Queue(_) => Some("The bot is restarting, please send the file again shortly."),
        }
    }

    /// Metric label for this rejection.
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionError::NoTemplate => "no_template",
            AdmissionError::UnsupportedMedia => "unsupported_media",
            AdmissionError::Duplicate => "duplicate",
            AdmissionError::Store(_) => "store",
            AdmissionError::Queue(_) => "queue_closed",
        }
    }
}
