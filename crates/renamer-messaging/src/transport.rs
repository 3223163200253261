//! The transport contract the pipeline talks through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use renamer_models::{ChatId, MediaKind, MessageRef};

use crate::error::TransportResult;

/// Bytes moved so far in a download or upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub transferred: u64,
    pub total: Option<u64>,
}

impl TransferProgress {
    /// Percentage complete, when the total is known.
    pub fn percentage(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => {
                Some((self.transferred as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
            }
            _ => None,
        }
    }
}

/// Callback type for transfer progress.
pub type TransferCallback = Box<dyn Fn(TransferProgress) + Send + Sync + 'static>;

/// Inline keyboard button attached to an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: data.into(),
        }
    }
}

/// A file to deliver to a chat.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub chat: ChatId,
    pub path: PathBuf,
    pub caption: String,
    pub thumbnail: Option<PathBuf>,
    pub buttons: Vec<InlineButton>,
}

impl UploadRequest {
    pub fn new(chat: ChatId, path: impl Into<PathBuf>, caption: impl Into<String>) -> Self {
        Self {
            chat,
            path: path.into(),
            caption: caption.into(),
            thumbnail: None,
            buttons: Vec::new(),
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<PathBuf>) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    pub fn with_button(mut self, button: InlineButton) -> Self {
        self.buttons.push(button);
        self
    }
}

/// Messaging platform operations used by the service.
///
/// Every call may fail with [`TransportError::RateLimited`](crate::TransportError::RateLimited).
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    async fn send_message(&self, chat: ChatId, text: &str) -> TransportResult<MessageRef>;

    async fn edit_message(&self, chat: ChatId, message: MessageRef, text: &str) -> TransportResult<()>;

    async fn delete_message(&self, chat: ChatId, message: MessageRef) -> TransportResult<()>;

    /// Fetch a platform file into `dest` and return the written path.
    async fn download_media(
        &self,
        file_id: &str,
        dest: &Path,
        progress: Option<TransferCallback>,
    ) -> TransportResult<PathBuf>;

    /// Deliver a local file as `kind`.
    async fn upload(
        &self,
        kind: MediaKind,
        request: UploadRequest,
        progress: Option<TransferCallback>,
    ) -> TransportResult<MessageRef>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_percentage() {
        let p = TransferProgress {
            transferred: 25,
            total: Some(100),
        };
        assert_eq!(p.percentage(), Some(25.0));
        assert_eq!(TransferProgress::default().percentage(), None);
    }

    #[test]
    fn test_upload_request_builder() {
        let req = UploadRequest::new(ChatId(-100), "/tmp/a.mkv", "caption")
            .with_thumbnail(Some(PathBuf::from("/tmp/t.jpg")))
            .with_button(InlineButton::callback("🚫 Ban User", "ban_42"));
        assert_eq!(req.buttons.len(), 1);
        assert_eq!(req.buttons[0].callback_data, "ban_42");
        assert!(req.thumbnail.is_some());
    }
}
