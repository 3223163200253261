//! Shared data models for the media rename service.
//!
//! This crate provides Serde-serializable types for:
//! - Tasks and their identities (user, chat, source file)
//! - Pipeline stages and terminal outcomes
//! - Per-user preferences and metadata tags
//! - Encoding and container constants

pub mod encoding;
pub mod preferences;
pub mod stage;
pub mod task;

// Re-export common types
pub use preferences::{LeaderboardEntry, MetadataTags, TagField, UserPreferences};
pub use stage::{DegradedReason, PipelineStage, TaskOutcome};
pub use task::{ChatId, MediaKind, MessageRef, SourceRef, Task, TaskId, UserId};
