//! Task definitions for queue processing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::encoding::{AUDIO_EXTENSION, DOCUMENT_FALLBACK_EXTENSION, VIDEO_EXTENSION};

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messaging-platform user identity. This is the queue key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversation the task was submitted from and is delivered back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a message previously sent by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(pub i64);

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of media attached to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
        }
    }

    /// Label used in the operational dump caption.
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Video => "📹 Video",
            MediaKind::Audio => "🎵 Audio",
            MediaKind::Document => "📄 Document",
        }
    }

    /// Name used when the platform does not report one.
    pub fn default_file_name(&self) -> &'static str {
        self.as_str()
    }

    /// Output extension (with leading dot) for a file of this kind.
    ///
    /// Video and audio containers are forced; documents keep their source
    /// extension and fall back to a generic one.
    pub fn output_extension(&self, source_name: &str) -> String {
        match self {
            MediaKind::Video => format!(".{}", VIDEO_EXTENSION),
            MediaKind::Audio => format!(".{}", AUDIO_EXTENSION),
            MediaKind::Document => Path::new(source_name)
                .extension()
                .and_then(|ext| ext.to_str())
                .filter(|ext| !ext.is_empty())
                .map(|ext| format!(".{}", ext))
                .unwrap_or_else(|| format!(".{}", DOCUMENT_FALLBACK_EXTENSION)),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform references needed to fetch the source bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Opaque file reference understood by the transport
    pub file_id: String,
    /// Embedded thumbnail reference, if the platform supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb_file_id: Option<String>,
}

/// A unit of rename work owned by one queue slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID
    pub id: TaskId,
    /// Submitting user (queue key)
    pub user_id: UserId,
    /// Chat the file came from
    pub chat_id: ChatId,
    /// Display name of the requester
    pub requester: String,
    /// Source file references
    pub source: SourceRef,
    /// Display filename as reported by the platform
    pub file_name: String,
    /// Media kind
    pub media_kind: MediaKind,
    /// Size in bytes, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// When the task was admitted
    pub submitted_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task.
    pub fn new(
        user_id: UserId,
        chat_id: ChatId,
        source: SourceRef,
        file_name: impl Into<String>,
        media_kind: MediaKind,
    ) -> Self {
        Self {
            id: TaskId::new(),
            user_id,
            chat_id,
            requester: format!("User {}", user_id),
            source,
            file_name: file_name.into(),
            media_kind,
            file_size: None,
            submitted_at: Utc::now(),
        }
    }

    /// Set the requester display name.
    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = requester.into();
        self
    }

    /// Set the reported file size.
    pub fn with_file_size(mut self, size: u64) -> Self {
        self.file_size = Some(size);
        self
    }
}
