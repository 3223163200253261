//! Long-poll source of inbound file messages.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use renamer_models::{ChatId, MediaKind, MessageRef, UserId};

use crate::bot_api::BotApiClient;
use crate::error::TransportResult;

/// A user message that carries an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingFile {
    pub update_id: i64,
    pub chat_id: ChatId,
    pub user_id: UserId,
    /// Display handle of the sender
    pub requester: String,
    pub message_id: MessageRef,
    /// `None` for attachments the service cannot rename (photos, stickers, voice notes)
    pub media_kind: Option<MediaKind>,
    pub file_id: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub thumb_file_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    message_id: i64,
    chat: WireChat,
    from: Option<WireUser>,
    video: Option<WireFile>,
    audio: Option<WireFile>,
    document: Option<WireFile>,
    voice: Option<WireFile>,
    sticker: Option<WireFile>,
    video_note: Option<WireFile>,
    #[serde(default)]
    photo: Vec<WirePhoto>,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: i64,
    first_name: String,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireFile {
    file_id: String,
    file_name: Option<String>,
    file_size: Option<u64>,
    thumbnail: Option<WirePhoto>,
    // Older servers still send the deprecated field name
    thumb: Option<WirePhoto>,
}

#[derive(Debug, Deserialize)]
struct WirePhoto {
    file_id: String,
}

impl WireUser {
    fn handle(&self) -> String {
        match &self.username {
            Some(username) => format!("@{}", username),
            None => self.first_name.clone(),
        }
    }
}

impl WireMessage {
    fn into_incoming(self, update_id: i64) -> Option<IncomingFile> {
        let (media_kind, file) = if let Some(f) = self.video {
            (Some(MediaKind::Video), f)
        } else if let Some(f) = self.audio {
            (Some(MediaKind::Audio), f)
        } else if let Some(f) = self.document {
            (Some(MediaKind::Document), f)
        } else if let Some(f) = self.voice.or(self.video_note).or(self.sticker) {
            (None, f)
        } else {
            let photo = self.photo.into_iter().last()?;
            (
                None,
                WireFile {
                    file_id: photo.file_id,
                    file_name: None,
                    file_size: None,
                    thumbnail: None,
                    thumb: None,
                },
            )
        };

        // Channel posts and anonymous admins have no sender; key them by chat
        let (user_id, requester) = match &self.from {
            Some(user) => (UserId(user.id), user.handle()),
            None => (UserId(self.chat.id), format!("Chat {}", self.chat.id)),
        };

        Some(IncomingFile {
            update_id,
            chat_id: ChatId(self.chat.id),
            user_id,
            requester,
            message_id: MessageRef(self.message_id),
            media_kind,
            file_id: file.file_id,
            file_name: file.file_name,
            file_size: file.file_size,
            thumb_file_id: file.thumbnail.or(file.thumb).map(|t| t.file_id),
        })
    }
}

/// Long-polls `getUpdates`, tracking the acknowledgement offset.
pub struct UpdatePoller {
    client: BotApiClient,
    offset: i64,
    timeout_secs: u64,
}

impl UpdatePoller {
    pub fn new(client: BotApiClient, timeout_secs: u64) -> Self {
        Self {
            client,
            offset: 0,
            timeout_secs,
        }
    }

    /// Wait for the next batch of updates and return the file-bearing ones.
    ///
    /// Updates without attachments are acknowledged and skipped.
    pub async fn next_batch(&mut self) -> TransportResult<Vec<IncomingFile>> {
        let updates: Vec<Update> = self
            .client
            .call(
                "getUpdates",
                json!({
                    "offset": self.offset,
                    "timeout": self.timeout_secs,
                    "allowed_updates": ["message"],
                }),
            )
            .await?;

        let mut files = Vec::new();
        for update in updates {
            self.offset = self.offset.max(update.update_id + 1);
            if let Some(file) = update
                .message
                .and_then(|m| m.into_incoming(update.update_id))
            {
                files.push(file);
            }
        }

        if !files.is_empty() {
            debug!(count = files.len(), offset = self.offset, "Received file updates");
        }
        Ok(files)
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot_api::BotApiConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_next_batch_extracts_files() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTEST/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    {
                        "update_id": 10,
                        "message": {
                            "message_id": 1,
                            "chat": { "id": 42 },
                            "from": { "id": 42, "first_name": "Ann", "username": "ann" },
                            "video": {
                                "file_id": "vid-1",
                                "file_name": "Show.S01E02.mp4",
                                "file_size": 1024,
                                "thumbnail": { "file_id": "thumb-1" },
                                "thumb": { "file_id": "thumb-1" }
                            }
                        }
                    },
                    {
                        "update_id": 11,
                        "message": { "message_id": 2, "chat": { "id": 42 }, "text": "/start" }
                    },
                    {
                        "update_id": 12,
                        "message": {
                            "message_id": 3,
                            "chat": { "id": 7 },
                            "from": { "id": 7, "first_name": "Bo" },
                            "photo": [{ "file_id": "small" }, { "file_id": "large" }]
                        }
                    }
                ]
            })))
            .mount(&server)
            .await;

        let client = BotApiClient::new(BotApiConfig::new("TEST").with_api_url(server.uri())).unwrap();
        let mut poller = UpdatePoller::new(client, 0);
        let files = poller.next_batch().await.unwrap();

        assert_eq!(poller.offset(), 13);
        assert_eq!(files.len(), 2);

        let video = &files[0];
        assert_eq!(video.media_kind, Some(MediaKind::Video));
        assert_eq!(video.requester, "@ann");
        assert_eq!(video.file_name.as_deref(), Some("Show.S01E02.mp4"));
        assert_eq!(video.thumb_file_id.as_deref(), Some("thumb-1"));

        let photo = &files[1];
        assert_eq!(photo.media_kind, None);
        assert_eq!(photo.file_id, "large");
        assert_eq!(photo.requester, "Bo");
    }
}
