//! Telegram Bot API client.
//!
//! Thin HTTP layer over the JSON methods the service needs, plus streaming
//! file download and multipart upload with byte progress.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info_span, Instrument};

use renamer_models::{ChatId, MediaKind, MessageRef};

use crate::error::{TransportError, TransportResult};
use crate::transport::{
    InlineButton, MessagingTransport, TransferCallback, TransferProgress, UploadRequest,
};

/// Public Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Bot API client configuration.
#[derive(Debug, Clone)]
pub struct BotApiConfig {
    /// Bot token issued by BotFather
    pub token: String,
    /// API base URL (a self-hosted Bot API server lifts the upload size cap)
    pub api_url: String,
    /// Whole-request timeout, must exceed the long-poll timeout
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl BotApiConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Envelope every Bot API method responds with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
    file_size: Option<u64>,
}

/// Telegram Bot API HTTP client.
#[derive(Debug, Clone)]
pub struct BotApiClient {
    http: Client,
    config: BotApiConfig,
}

impl BotApiClient {
    pub fn new(config: BotApiConfig) -> TransportResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("renamer-messaging/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, config })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.config.api_url, self.config.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.config.api_url, self.config.token, file_path)
    }

    /// Call a JSON method and decode its `result`.
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> TransportResult<T> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .send()
            .instrument(info_span!("bot_api", method))
            .await?;

        Self::parse_response(method, response).await
    }

    async fn parse_response<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> TransportResult<T> {
        let status = response.status();
        let text = response.text().await?;

        let parsed: ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) if status == StatusCode::TOO_MANY_REQUESTS => {
                return Err(TransportError::rate_limited(text));
            }
            Err(e) if status.is_success() => return Err(TransportError::Json(e)),
            Err(_) => {
                return Err(TransportError::api(
                    status.as_u16(),
                    format!("{} failed: {}", method, text),
                ));
            }
        };

        if parsed.ok {
            return parsed.result.ok_or_else(|| {
                TransportError::InvalidResponse(format!("{} returned no result", method))
            });
        }

        let code = parsed.error_code.unwrap_or_else(|| status.as_u16());
        let retry_after = parsed.parameters.and_then(|p| p.retry_after);
        debug!(method, code, ?retry_after, "Bot API call rejected");
        Err(TransportError::from_api_error(
            code,
            parsed.description.unwrap_or_default(),
            retry_after,
        ))
    }

    /// Multipart body part that streams `path` and reports bytes sent.
    async fn file_part(path: &Path, progress: Option<TransferCallback>) -> TransportResult<Part> {
        let file = tokio::fs::File::open(path).await?;
        let total = file.metadata().await?.len();

        let mut sent = 0u64;
        let stream = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                if let Some(callback) = &progress {
                    callback(TransferProgress {
                        transferred: sent,
                        total: Some(total),
                    });
                }
            }
            chunk
        });

        Ok(Part::stream_with_length(Body::wrap_stream(stream), total).file_name(file_name_of(path)))
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

fn upload_method(kind: MediaKind) -> (&'static str, &'static str) {
    match kind {
        MediaKind::Video => ("sendVideo", "video"),
        MediaKind::Audio => ("sendAudio", "audio"),
        MediaKind::Document => ("sendDocument", "document"),
    }
}

fn inline_keyboard(buttons: &[InlineButton]) -> serde_json::Value {
    let row: Vec<_> = buttons
        .iter()
        .map(|b| json!({ "text": b.text, "callback_data": b.callback_data }))
        .collect();
    json!({ "inline_keyboard": [row] })
}

#[async_trait]
impl MessagingTransport for BotApiClient {
    async fn send_message(&self, chat: ChatId, text: &str) -> TransportResult<MessageRef> {
        let sent: SentMessage = self
            .call("sendMessage", json!({ "chat_id": chat.0, "text": text }))
            .await?;
        Ok(MessageRef(sent.message_id))
    }

    async fn edit_message(&self, chat: ChatId, message: MessageRef, text: &str) -> TransportResult<()> {
        // Result is either the edited message or `true`
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                json!({ "chat_id": chat.0, "message_id": message.0, "text": text }),
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, chat: ChatId, message: MessageRef) -> TransportResult<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": chat.0, "message_id": message.0 }),
            )
            .await?;
        Ok(())
    }

    async fn download_media(
        &self,
        file_id: &str,
        dest: &Path,
        progress: Option<TransferCallback>,
    ) -> TransportResult<PathBuf> {
        let info: FileInfo = self.call("getFile", json!({ "file_id": file_id })).await?;
        let file_path = info.file_path.ok_or_else(|| {
            TransportError::InvalidResponse("getFile returned no file_path".to_string())
        })?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.http.get(self.file_url(&file_path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_api_error(
                status.as_u16(),
                format!("file download failed: {}", body),
                None,
            ));
        }

        let total = response.content_length().or(info.file_size);
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut received = 0u64;

        while let Some(chunk) = stream.next().await {
            let data = chunk?;
            file.write_all(&data).await?;
            received += data.len() as u64;
            if let Some(callback) = &progress {
                callback(TransferProgress {
                    transferred: received,
                    total,
                });
            }
        }
        file.flush().await?;

        debug!(file_id, bytes = received, dest = %dest.display(), "Download complete");
        Ok(dest.to_path_buf())
    }

    async fn upload(
        &self,
        kind: MediaKind,
        request: UploadRequest,
        progress: Option<TransferCallback>,
    ) -> TransportResult<MessageRef> {
        let (method, field) = upload_method(kind);

        let mut form = Form::new()
            .text("chat_id", request.chat.0.to_string())
            .text("caption", request.caption.clone())
            .part(field, Self::file_part(&request.path, progress).await?);

        if kind == MediaKind::Video {
            form = form.text("supports_streaming", "true");
        }

        if let Some(thumb) = &request.thumbnail {
            let bytes = tokio::fs::read(thumb).await?;
            let part = Part::bytes(bytes)
                .file_name(file_name_of(thumb))
                .mime_str("image/jpeg")?;
            form = form.part("thumbnail", part);
        }

        if !request.buttons.is_empty() {
            form = form.text("reply_markup", inline_keyboard(&request.buttons).to_string());
        }

        let response = self
            .http
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .instrument(info_span!("bot_api", method))
            .await?;

        let sent: SentMessage = Self::parse_response(method, response).await?;
        Ok(MessageRef(sent.message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> BotApiClient {
        BotApiClient::new(BotApiConfig::new("TEST").with_api_url(server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_send_message_returns_ref() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTEST/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": { "message_id": 77, "chat": { "id": 5 } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let msg = client_for(&server).send_message(ChatId(5), "hello").await.unwrap();
        assert_eq!(msg, MessageRef(77));
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTEST/sendMessage"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 3",
                "parameters": { "retry_after": 3 }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send_message(ChatId(5), "hello")
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("retry after 3"));
    }

    #[tokio::test]
    async fn test_edit_not_modified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTEST/editMessageText"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: message is not modified"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .edit_message(ChatId(5), MessageRef(1), "same")
            .await
            .unwrap_err();
        assert!(err.is_not_modified());
    }

    #[tokio::test]
    async fn test_download_streams_to_disk() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTEST/getFile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": { "file_id": "abc", "file_size": 11, "file_path": "videos/file_1.mp4" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/file/botTEST/videos/file_1.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("downloads/1/out.mkv");
        let seen = Arc::new(AtomicU64::new(0));
        let seen_cb = Arc::clone(&seen);

        let written = client_for(&server)
            .download_media(
                "abc",
                &dest,
                Some(Box::new(move |p| seen_cb.store(p.transferred, Ordering::SeqCst))),
            )
            .await
            .unwrap();

        assert_eq!(written, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
        assert_eq!(seen.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn test_upload_document_with_button() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTEST/sendDocument"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": { "message_id": 9 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("report.pdf");
        std::fs::write(&file, b"%PDF-1.4").unwrap();

        let request = UploadRequest::new(ChatId(-100), &file, "report.pdf")
            .with_button(InlineButton::callback("🚫 Ban User", "ban_42"));
        let msg = client_for(&server)
            .upload(MediaKind::Document, request, None)
            .await
            .unwrap();
        assert_eq!(msg, MessageRef(9));

        let received = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&received[0].body);
        assert!(body.contains("ban_42"));
        assert!(body.contains("%PDF-1.4"));
    }
}
