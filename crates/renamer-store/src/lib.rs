//! Preference storage for the rename service.
//!
//! `MetadataService` is the contract the pipeline reads tags, templates,
//! captions and thumbnails through. Two implementations ship: Redis for
//! deployments and an in-memory map for local runs and tests.

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod service;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryMetadataStore;
pub use redis_store::RedisMetadataStore;
pub use service::MetadataService;
