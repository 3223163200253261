#![deny(unreachable_patterns)]
//! Media handling for the rename pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with progress parsing
//! - FFprobe duration/resolution probing
//! - The `MediaTool` adapter used by the pipeline (remux, re-encode, probe)
//! - Filename analysis (season / episode / quality extraction)
//! - Thumbnail normalization and working-file helpers

pub mod command;
pub mod error;
pub mod filename;
pub mod fs_utils;
pub mod probe;
pub mod progress;
pub mod remux;
pub mod thumbnail;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use filename::{extract, FilenameInfo};
pub use fs_utils::{copy_verbatim, remove_paths};
pub use probe::{probe_media, MediaProbe};
pub use progress::{FfmpegProgress, ProgressCallback};
pub use remux::{FfmpegTool, MediaTool, RemuxRequest};
pub use thumbnail::normalize_thumbnail;
