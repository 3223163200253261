//! Media rename worker.
//!
//! This crate provides:
//! - Admission of inbound files (template check, media kind, deduplication)
//! - The stage machine that downloads, tags, re-encodes and delivers a file
//! - Configuration, logging and metrics
//! - The service loop with graceful shutdown

pub mod admission;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod service;

pub use admission::Admission;
pub use config::WorkerConfig;
pub use error::{AdmissionError, WorkerError, WorkerResult};
pub use logging::{init_tracing, TaskLogger};
pub use pipeline::{Pipeline, PipelineRecord, StageFailure};
pub use service::RenameService;
