//! Encoding, container and pipeline constants.

/// Container extension forced for video output
pub const VIDEO_EXTENSION: &str = "mkv";
/// Extension forced for audio output
pub const AUDIO_EXTENSION: &str = "mp3";
/// Extension used for documents without one
pub const DOCUMENT_FALLBACK_EXTENSION: &str = "bin";

/// Video codec used whenever video is re-encoded
pub const REENCODE_VIDEO_CODEC: &str = "libx264";
/// Preset used for re-encodes
pub const REENCODE_PRESET: &str = "fast";
/// CRF used for the forced re-encode retry
pub const FALLBACK_CRF: u8 = 23;
/// CRF used when the user asked for quality enhancement
pub const ENHANCE_CRF: u8 = 20;
/// Audio codec for non-mp3 containers
pub const REENCODE_AUDIO_CODEC: &str = "aac";
/// Audio codec for mp3 output
pub const MP3_AUDIO_CODEC: &str = "libmp3lame";
/// Audio bitrate for re-encodes
pub const REENCODE_AUDIO_BITRATE: &str = "192k";

/// Thumbnail geometry expected by the messaging platform
pub const THUMBNAIL_WIDTH: u32 = 1280;
pub const THUMBNAIL_HEIGHT: u32 = 720;

/// Allowed difference between input and output duration
pub const DURATION_TOLERANCE_SECS: f64 = 5.0;

/// Placeholder substituted for a missing season or episode
pub const MISSING_NUMBER_PLACEHOLDER: &str = "XX";

/// Quality reported when the filename carries no quality token
pub const UNKNOWN_QUALITY: &str = "Unknown";

/// Upscale target for the quality-enhancement option.
///
/// Sources up to 480 lines go to 720p, up to 720 lines to 1080p; anything
/// taller is left at its native size.
pub fn enhancement_target_height(source_height: u32) -> Option<u32> {
    match source_height {
        0 => None,
        h if h <= 480 => Some(720),
        h if h <= 720 => Some(1080),
        _ => None,
    }
}
