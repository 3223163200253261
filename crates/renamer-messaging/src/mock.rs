//! In-memory transport that records every call.
//!
//! Failures can be scripted per operation so retry and fallback paths are
//! testable without a network.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use renamer_models::{ChatId, MediaKind, MessageRef};

use crate::error::{TransportError, TransportResult};
use crate::transport::{
    InlineButton, MessagingTransport, TransferCallback, TransferProgress, UploadRequest,
};

/// Transport operation a failure can be scripted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Send,
    Edit,
    Delete,
    Download,
    Upload,
}

/// Failure to return from the next call of an operation.
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    RateLimited(String),
    Api(u16, String),
    NotModified,
}

impl ScriptedFailure {
    fn into_error(self) -> TransportError {
        match self {
            ScriptedFailure::RateLimited(msg) => TransportError::RateLimited(msg),
            ScriptedFailure::Api(code, desc) => TransportError::api(code, desc),
            ScriptedFailure::NotModified => TransportError::MessageNotModified,
        }
    }
}

/// A completed upload as seen by the recording transport.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub kind: MediaKind,
    pub chat: ChatId,
    pub file_name: String,
    pub caption: String,
    pub content: Vec<u8>,
    pub had_thumbnail: bool,
    pub buttons: Vec<InlineButton>,
}

#[derive(Debug, Default)]
struct State {
    live: HashMap<(ChatId, MessageRef), String>,
    sent: Vec<(ChatId, String)>,
    edits: Vec<(ChatId, MessageRef, String)>,
    deletes: Vec<(ChatId, MessageRef)>,
    uploads: Vec<RecordedUpload>,
    attempts: HashMap<Operation, usize>,
    failures: HashMap<Operation, VecDeque<ScriptedFailure>>,
    failing_upload_chats: HashSet<ChatId>,
}

/// Recording [`MessagingTransport`] for tests.
#[derive(Debug)]
pub struct RecordingTransport {
    state: Mutex<State>,
    next_message_id: AtomicI64,
    download_content: Vec<u8>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::with_download_content(b"source media bytes".to_vec())
    }

    /// Every download writes `content` to its destination.
    pub fn with_download_content(content: Vec<u8>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            next_message_id: AtomicI64::new(1),
            download_content: content,
        }
    }

    /// Queue a failure for the next call of `op`.
    pub fn fail_next(&self, op: Operation, failure: ScriptedFailure) {
        self.lock().failures.entry(op).or_default().push_back(failure);
    }

    /// Queue `count` consecutive failures for `op`.
    pub fn fail_next_n(&self, op: Operation, count: usize, failure: ScriptedFailure) {
        for _ in 0..count {
            self.fail_next(op, failure.clone());
        }
    }

    /// Make every upload to `chat` fail.
    pub fn fail_uploads_to(&self, chat: ChatId) {
        self.lock().failing_upload_chats.insert(chat);
    }

    /// Messages sent and not yet deleted in `chat`.
    pub fn live_messages(&self, chat: ChatId) -> Vec<(MessageRef, String)> {
        let mut live: Vec<_> = self
            .lock()
            .live
            .iter()
            .filter(|((c, _), _)| *c == chat)
            .map(|((_, m), text)| (*m, text.clone()))
            .collect();
        live.sort_by_key(|(m, _)| m.0);
        live
    }

    /// Every successful send, in order.
    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.lock().sent.clone()
    }

    pub fn edits(&self) -> Vec<(ChatId, MessageRef, String)> {
        self.lock().edits.clone()
    }

    pub fn deletes(&self) -> Vec<(ChatId, MessageRef)> {
        self.lock().deletes.clone()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.lock().uploads.clone()
    }

    /// Calls made for `op`, failed ones included.
    pub fn attempts(&self, op: Operation) -> usize {
        self.lock().attempts.get(&op).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, op: Operation) -> TransportResult<()> {
        let mut state = self.lock();
        *state.attempts.entry(op).or_insert(0) += 1;
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MessagingTransport for RecordingTransport {
    async fn send_message(&self, chat: ChatId, text: &str) -> TransportResult<MessageRef> {
        self.begin(Operation::Send)?;
        let message = MessageRef(self.next_message_id.fetch_add(1, Ordering::SeqCst));
        let mut state = self.lock();
        state.live.insert((chat, message), text.to_string());
        state.sent.push((chat, text.to_string()));
        Ok(message)
    }

    async fn edit_message(&self, chat: ChatId, message: MessageRef, text: &str) -> TransportResult<()> {
        self.begin(Operation::Edit)?;
        let mut state = self.lock();
        match state.live.get_mut(&(chat, message)) {
            Some(existing) if existing.as_str() == text => Err(TransportError::MessageNotModified),
            Some(existing) => {
                *existing = text.to_string();
                state.edits.push((chat, message, text.to_string()));
                Ok(())
            }
            None => Err(TransportError::api(400, "Bad Request: message to edit not found")),
        }
    }

    async fn delete_message(&self, chat: ChatId, message: MessageRef) -> TransportResult<()> {
        self.begin(Operation::Delete)?;
        let mut state = self.lock();
        if state.live.remove(&(chat, message)).is_none() {
            return Err(TransportError::api(400, "Bad Request: message to delete not found"));
        }
        state.deletes.push((chat, message));
        Ok(())
    }

    async fn download_media(
        &self,
        _file_id: &str,
        dest: &Path,
        progress: Option<TransferCallback>,
    ) -> TransportResult<PathBuf> {
        self.begin(Operation::Download)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &self.download_content).await?;
        if let Some(callback) = progress {
            let total = self.download_content.len() as u64;
            callback(TransferProgress {
                transferred: total,
                total: Some(total),
            });
        }
        Ok(dest.to_path_buf())
    }

    async fn upload(
        &self,
        kind: MediaKind,
        request: UploadRequest,
        progress: Option<TransferCallback>,
    ) -> TransportResult<MessageRef> {
        self.begin(Operation::Upload)?;
        if self.lock().failing_upload_chats.contains(&request.chat) {
            return Err(TransportError::api(403, "Forbidden: bot is not a member of the chat"));
        }

        let content = tokio::fs::read(&request.path).await?;
        if let Some(callback) = progress {
            let total = content.len() as u64;
            callback(TransferProgress {
                transferred: total,
                total: Some(total),
            });
        }

        let message = MessageRef(self.next_message_id.fetch_add(1, Ordering::SeqCst));
        self.lock().uploads.push(RecordedUpload {
            kind,
            chat: request.chat,
            file_name: request
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            caption: request.caption,
            content,
            had_thumbnail: request.thumbnail.as_deref().is_some_and(Path::exists),
            buttons: request.buttons,
        });
        Ok(message)
    }
}
