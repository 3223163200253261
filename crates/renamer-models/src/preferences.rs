//! Per-user preferences kept by the metadata service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::task::UserId;

/// Credit written into tags for users who never customised them.
pub const DEFAULT_CREDIT: &str = "Renamed by @AutoRenamer";

/// Free-text tag written into the output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagField {
    Title,
    Artist,
    Author,
    VideoTitle,
    AudioTitle,
    SubtitleTitle,
}

impl TagField {
    pub const ALL: [TagField; 6] = [
        TagField::Title,
        TagField::Artist,
        TagField::Author,
        TagField::VideoTitle,
        TagField::AudioTitle,
        TagField::SubtitleTitle,
    ];

    /// Storage key of the field.
    pub fn key(&self) -> &'static str {
        match self {
            TagField::Title => "title",
            TagField::Artist => "artist",
            TagField::Author => "author",
            TagField::VideoTitle => "video_title",
            TagField::AudioTitle => "audio_title",
            TagField::SubtitleTitle => "subtitle_title",
        }
    }

    /// Value seeded when a user record is first created.
    pub fn initial_value(&self) -> &'static str {
        DEFAULT_CREDIT
    }
}

impl fmt::Display for TagField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Error)]
#[error("Unknown tag field: {0}")]
pub struct UnknownTagField(pub String);

impl FromStr for TagField {
    type Err = UnknownTagField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TagField::ALL
            .into_iter()
            .find(|field| field.key() == s)
            .ok_or_else(|| UnknownTagField(s.to_string()))
    }
}

/// Tag values applied to one output file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataTags {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub video_title: String,
    #[serde(default)]
    pub audio_title: String,
    #[serde(default)]
    pub subtitle_title: String,
}

impl MetadataTags {
    /// Tags seeded for a newly created user.
    pub fn initial() -> Self {
        let mut tags = Self::default();
        for field in TagField::ALL {
            tags.set(field, field.initial_value());
        }
        tags
    }

    pub fn get(&self, field: TagField) -> &str {
        match field {
            TagField::Title => &self.title,
            TagField::Artist => &self.artist,
            TagField::Author => &self.author,
            TagField::VideoTitle => &self.video_title,
            TagField::AudioTitle => &self.audio_title,
            TagField::SubtitleTitle => &self.subtitle_title,
        }
    }

    pub fn set(&mut self, field: TagField, value: impl Into<String>) {
        let value = value.into();
        match field {
            TagField::Title => self.title = value,
            TagField::Artist => self.artist = value,
            TagField::Author => self.author = value,
            TagField::VideoTitle => self.video_title = value,
            TagField::AudioTitle => self.audio_title = value,
            TagField::SubtitleTitle => self.subtitle_title = value,
        }
    }
}

/// Everything the service stores about a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: UserId,
    /// Rename template with `{season}`, `{episode}` and `{quality}` placeholders
    #[serde(default)]
    pub format_template: Option<String>,
    #[serde(default)]
    pub tags: MetadataTags,
    /// Upscale low-resolution video while remuxing
    #[serde(default)]
    pub enhance_quality: bool,
    /// Files renamed so far
    #[serde(default)]
    pub rename_count: u64,
}

impl UserPreferences {
    /// Record created the first time a user is seen.
    pub fn new_user(user_id: UserId) -> Self {
        Self {
            user_id,
            format_template: None,
            tags: MetadataTags::initial(),
            enhance_quality: false,
            rename_count: 0,
        }
    }
}

/// One row of the renamer leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub rename_count: u64,
}
