//! The metadata service contract.

use async_trait::async_trait;

use renamer_models::{ChatId, LeaderboardEntry, TagField, UserId};

use crate::error::StoreResult;

/// Per-user and per-chat preferences plus the rename leaderboard.
///
/// Implementations are independently consistent: callers re-read values
/// instead of caching them between operations.
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Create the user record with default tags. Returns `true` if it was created.
    async fn ensure_user(&self, user: UserId) -> StoreResult<bool>;

    async fn get_format_template(&self, user: UserId) -> StoreResult<Option<String>>;
    async fn set_format_template(&self, user: UserId, template: &str) -> StoreResult<()>;

    async fn get_caption(&self, chat: ChatId) -> StoreResult<Option<String>>;
    /// `None` clears the caption.
    async fn set_caption(&self, chat: ChatId, caption: Option<&str>) -> StoreResult<()>;

    /// Platform file id of the chat's custom thumbnail.
    async fn get_thumbnail(&self, chat: ChatId) -> StoreResult<Option<String>>;
    async fn set_thumbnail(&self, chat: ChatId, file_id: Option<&str>) -> StoreResult<()>;

    async fn get_tag(&self, user: UserId, field: TagField) -> StoreResult<Option<String>>;
    async fn set_tag(&self, user: UserId, field: TagField, value: &str) -> StoreResult<()>;

    async fn get_enhance_quality(&self, user: UserId) -> StoreResult<bool>;
    async fn set_enhance_quality(&self, user: UserId, enabled: bool) -> StoreResult<()>;

    /// Atomically bump the user's counter and leaderboard score.
    async fn increment_rename_count(&self, user: UserId) -> StoreResult<u64>;
    async fn get_rename_count(&self, user: UserId) -> StoreResult<u64>;

    /// Users with a positive count, highest first.
    async fn get_top_renamers(&self, limit: usize) -> StoreResult<Vec<LeaderboardEntry>>;
}
