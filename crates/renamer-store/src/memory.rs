//! In-memory metadata store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use renamer_models::{ChatId, LeaderboardEntry, TagField, UserId, UserPreferences};

use crate::error::{StoreError, StoreResult};
use crate::service::MetadataService;

#[derive(Debug, Default, Clone)]
struct ChatSettings {
    caption: Option<String>,
    thumbnail: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<UserId, UserPreferences>,
    chats: HashMap<ChatId, ChatSettings>,
}

/// Process-local [`MetadataService`]. Nothing survives a restart.
///
/// Reads and counter increments can be made to fail for exercising
/// fallback paths.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    inner: Mutex<Inner>,
    fail_tag_reads: AtomicBool,
    fail_increments: AtomicBool,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `get_tag` fail until reset.
    pub fn set_fail_tag_reads(&self, fail: bool) {
        self.fail_tag_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `increment_rename_count` fail until reset.
    pub fn set_fail_increments(&self, fail: bool) {
        self.fail_increments.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_user<T>(&self, user: UserId, f: impl FnOnce(&mut UserPreferences) -> T) -> T {
        let mut inner = self.lock();
        let prefs = inner
            .users
            .entry(user)
            .or_insert_with(|| UserPreferences::new_user(user));
        f(prefs)
    }

    fn with_chat<T>(&self, chat: ChatId, f: impl FnOnce(&mut ChatSettings) -> T) -> T {
        let mut inner = self.lock();
        f(inner.chats.entry(chat).or_default())
    }
}

#[async_trait]
impl MetadataService for InMemoryMetadataStore {
    async fn ensure_user(&self, user: UserId) -> StoreResult<bool> {
        let mut inner = self.lock();
        if inner.users.contains_key(&user) {
            return Ok(false);
        }
        inner.users.insert(user, UserPreferences::new_user(user));
        Ok(true)
    }

    async fn get_format_template(&self, user: UserId) -> StoreResult<Option<String>> {
        Ok(self
            .lock()
            .users
            .get(&user)
            .and_then(|p| p.format_template.clone())
            .filter(|t| !t.trim().is_empty()))
    }

    async fn set_format_template(&self, user: UserId, template: &str) -> StoreResult<()> {
        self.with_user(user, |p| p.format_template = Some(template.to_string()));
        Ok(())
    }

    async fn get_caption(&self, chat: ChatId) -> StoreResult<Option<String>> {
        Ok(self.lock().chats.get(&chat).and_then(|c| c.caption.clone()))
    }

    async fn set_caption(&self, chat: ChatId, caption: Option<&str>) -> StoreResult<()> {
        self.with_chat(chat, |c| c.caption = caption.map(String::from));
        Ok(())
    }

    async fn get_thumbnail(&self, chat: ChatId) -> StoreResult<Option<String>> {
        Ok(self.lock().chats.get(&chat).and_then(|c| c.thumbnail.clone()))
    }

    async fn set_thumbnail(&self, chat: ChatId, file_id: Option<&str>) -> StoreResult<()> {
        self.with_chat(chat, |c| c.thumbnail = file_id.map(String::from));
        Ok(())
    }

    async fn get_tag(&self, user: UserId, field: TagField) -> StoreResult<Option<String>> {
        if self.fail_tag_reads.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("tag reads disabled"));
        }
        Ok(self
            .lock()
            .users
            .get(&user)
            .map(|p| p.tags.get(field).to_string()))
    }

    async fn set_tag(&self, user: UserId, field: TagField, value: &str) -> StoreResult<()> {
        self.with_user(user, |p| p.tags.set(field, value));
        Ok(())
    }

    async fn get_enhance_quality(&self, user: UserId) -> StoreResult<bool> {
        Ok(self
            .lock()
            .users
            .get(&user)
            .is_some_and(|p| p.enhance_quality))
    }

    async fn set_enhance_quality(&self, user: UserId, enabled: bool) -> StoreResult<()> {
        self.with_user(user, |p| p.enhance_quality = enabled);
        Ok(())
    }

    async fn increment_rename_count(&self, user: UserId) -> StoreResult<u64> {
        if self.fail_increments.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("increments disabled"));
        }
        Ok(self.with_user(user, |p| {
            p.rename_count += 1;
            p.rename_count
        }))
    }

    async fn get_rename_count(&self, user: UserId) -> StoreResult<u64> {
        Ok(self
            .lock()
            .users
            .get(&user)
            .map_or(0, |p| p.rename_count))
    }

    async fn get_top_renamers(&self, limit: usize) -> StoreResult<Vec<LeaderboardEntry>> {
        let mut entries: Vec<_> = self
            .lock()
            .users
            .values()
            .filter(|p| p.rename_count > 0)
            .map(|p| LeaderboardEntry {
                user_id: p.user_id,
                rename_count: p.rename_count,
            })
            .collect();
        entries.sort_by(|a, b| {
            b.rename_count
                .cmp(&a.rename_count)
                .then(a.user_id.cmp(&b.user_id))
        });
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renamer_models::preferences::DEFAULT_CREDIT;

    #[tokio::test]
    async fn test_new_user_gets_default_tags() {
        let store = InMemoryMetadataStore::new();
        assert!(store.ensure_user(UserId(1)).await.unwrap());
        assert!(!store.ensure_user(UserId(1)).await.unwrap());

        let author = store.get_tag(UserId(1), TagField::Author).await.unwrap();
        assert_eq!(author.as_deref(), Some(DEFAULT_CREDIT));
        assert_eq!(store.get_format_template(UserId(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_blank_template_is_absent() {
        let store = InMemoryMetadataStore::new();
        store.set_format_template(UserId(1), "   ").await.unwrap();
        assert_eq!(store.get_format_template(UserId(1)).await.unwrap(), None);

        store
            .set_format_template(UserId(1), "Show S{season}E{episode}")
            .await
            .unwrap();
        assert!(store.get_format_template(UserId(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_chat_settings_round_trip() {
        let store = InMemoryMetadataStore::new();
        store.set_caption(ChatId(5), Some("hello")).await.unwrap();
        store.set_thumbnail(ChatId(5), Some("file-1")).await.unwrap();
        assert_eq!(store.get_caption(ChatId(5)).await.unwrap().as_deref(), Some("hello"));

        store.set_thumbnail(ChatId(5), None).await.unwrap();
        assert_eq!(store.get_thumbnail(ChatId(5)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_leaderboard_order_and_limit() {
        let store = InMemoryMetadataStore::new();
        for (user, count) in [(1, 2), (2, 5), (3, 1)] {
            for _ in 0..count {
                store.increment_rename_count(UserId(user)).await.unwrap();
            }
        }
        store.ensure_user(UserId(4)).await.unwrap();

        let top = store.get_top_renamers(2).await.unwrap();
        assert_eq!(
            top,
            vec![
                LeaderboardEntry { user_id: UserId(2), rename_count: 5 },
                LeaderboardEntry { user_id: UserId(1), rename_count: 2 },
            ]
        );
        assert_eq!(store.get_top_renamers(10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = InMemoryMetadataStore::new();
        store.set_fail_tag_reads(true);
        store.set_fail_increments(true);
        assert!(store.get_tag(UserId(1), TagField::Title).await.is_err());
        assert!(store.increment_rename_count(UserId(1)).await.unwrap_err().is_transient());
        assert_eq!(store.get_rename_count(UserId(1)).await.unwrap(), 0);
    }
}
