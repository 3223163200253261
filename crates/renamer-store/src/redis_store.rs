//! Redis-backed metadata store.
//!
//! Layout:
//! - `renamer:user:{id}` hash: `format_template`, `tag:<field>`, `enhance_quality`, `rename_count`, `created_at`
//! - `renamer:chat:{id}` hash: `caption`, `thumbnail`
//! - `renamer:leaderboard` sorted set scored by rename count

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, info};

use renamer_models::{ChatId, LeaderboardEntry, TagField, UserId};

use crate::error::{StoreError, StoreResult};
use crate::service::MetadataService;

const KEY_PREFIX: &str = "renamer";
const LEADERBOARD_KEY: &str = "renamer:leaderboard";

const FIELD_TEMPLATE: &str = "format_template";
const FIELD_ENHANCE: &str = "enhance_quality";
const FIELD_RENAME_COUNT: &str = "rename_count";
const FIELD_CREATED_AT: &str = "created_at";
const FIELD_CAPTION: &str = "caption";
const FIELD_THUMBNAIL: &str = "thumbnail";

fn user_key(user: UserId) -> String {
    format!("{}:user:{}", KEY_PREFIX, user.0)
}

fn chat_key(chat: ChatId) -> String {
    format!("{}:chat:{}", KEY_PREFIX, chat.0)
}

fn tag_field(field: TagField) -> String {
    format!("tag:{}", field.key())
}

/// Redis implementation of [`MetadataService`].
#[derive(Clone)]
pub struct RedisMetadataStore {
    conn: MultiplexedConnection,
}

impl RedisMetadataStore {
    /// Connect to `redis_url`.
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected metadata store to Redis");
        Ok(Self { conn })
    }

    async fn get_chat_field(&self, chat: ChatId, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(chat_key(chat), field).await?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    async fn set_chat_field(&self, chat: ChatId, field: &str, value: Option<&str>) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        match value {
            Some(v) => {
                let _: () = conn.hset(chat_key(chat), field, v).await?;
            }
            None => {
                let _: () = conn.hdel(chat_key(chat), field).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataService for RedisMetadataStore {
    async fn ensure_user(&self, user: UserId) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let key = user_key(user);

        let created: bool = conn
            .hset_nx(&key, FIELD_CREATED_AT, chrono::Utc::now().to_rfc3339())
            .await?;
        if !created {
            return Ok(false);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for field in TagField::ALL {
            pipe.hset_nx(&key, tag_field(field), field.initial_value()).ignore();
        }
        pipe.hset_nx(&key, FIELD_ENHANCE, 0).ignore();
        pipe.hset_nx(&key, FIELD_RENAME_COUNT, 0).ignore();
        let _: () = pipe.query_async(&mut conn).await?;

        debug!(user_id = user.0, "Created user record");
        Ok(true)
    }

    async fn get_format_template(&self, user: UserId) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(user_key(user), FIELD_TEMPLATE).await?;
        Ok(value.filter(|v| !v.trim().is_empty()))
    }

    async fn set_format_template(&self, user: UserId, template: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(user_key(user), FIELD_TEMPLATE, template).await?;
        Ok(())
    }

    async fn get_caption(&self, chat: ChatId) -> StoreResult<Option<String>> {
        self.get_chat_field(chat, FIELD_CAPTION).await
    }

    async fn set_caption(&self, chat: ChatId, caption: Option<&str>) -> StoreResult<()> {
        self.set_chat_field(chat, FIELD_CAPTION, caption).await
    }

    async fn get_thumbnail(&self, chat: ChatId) -> StoreResult<Option<String>> {
        self.get_chat_field(chat, FIELD_THUMBNAIL).await
    }

    async fn set_thumbnail(&self, chat: ChatId, file_id: Option<&str>) -> StoreResult<()> {
        self.set_chat_field(chat, FIELD_THUMBNAIL, file_id).await
    }

    async fn get_tag(&self, user: UserId, field: TagField) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(user_key(user), tag_field(field)).await?;
        Ok(value)
    }

    async fn set_tag(&self, user: UserId, field: TagField, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(user_key(user), tag_field(field), value).await?;
        Ok(())
    }

    async fn get_enhance_quality(&self, user: UserId) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(user_key(user), FIELD_ENHANCE).await?;
        match value.as_deref() {
            None | Some("0") | Some("") => Ok(false),
            Some("1") => Ok(true),
            Some(other) => Err(StoreError::InvalidValue {
                key: format!("{}.{}", user_key(user), FIELD_ENHANCE),
                value: other.to_string(),
            }),
        }
    }

    async fn set_enhance_quality(&self, user: UserId, enabled: bool) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .hset(user_key(user), FIELD_ENHANCE, u8::from(enabled))
            .await?;
        Ok(())
    }

    async fn increment_rename_count(&self, user: UserId) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let (count, _score): (u64, f64) = redis::pipe()
            .atomic()
            .hincr(user_key(user), FIELD_RENAME_COUNT, 1)
            .zincr(LEADERBOARD_KEY, user.0, 1)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn get_rename_count(&self, user: UserId) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = conn.hget(user_key(user), FIELD_RENAME_COUNT).await?;
        Ok(value.unwrap_or(0))
    }

    async fn get_top_renamers(&self, limit: usize) -> StoreResult<Vec<LeaderboardEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let rows: Vec<(i64, f64)> = conn
            .zrevrange_withscores(LEADERBOARD_KEY, 0, limit as isize - 1)
            .await?;

        Ok(rows
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(user, score)| LeaderboardEntry {
                user_id: UserId(user),
                rename_count: score as u64,
            })
            .collect())
    }
}
