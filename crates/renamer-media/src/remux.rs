//! Media tool adapter: metadata remux and re-encode through FFmpeg.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use renamer_models::encoding::{
    FALLBACK_CRF, MP3_AUDIO_CODEC, REENCODE_AUDIO_BITRATE, REENCODE_AUDIO_CODEC, REENCODE_PRESET,
    REENCODE_VIDEO_CODEC,
};
use renamer_models::MetadataTags;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::{probe_media, MediaProbe};
use crate::progress::ProgressCallback;

/// One FFmpeg invocation that writes tags and optionally re-encodes.
#[derive(Debug, Clone, PartialEq)]
pub struct RemuxRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub tags: MetadataTags,
    pub reencode_video: bool,
    pub reencode_audio: bool,
    /// Upscale target height, only honoured when re-encoding video
    pub target_height: Option<u32>,
    pub crf: u8,
}

impl RemuxRequest {
    /// Stream-copy request carrying only the metadata tags.
    pub fn copy(input: impl Into<PathBuf>, output: impl Into<PathBuf>, tags: MetadataTags) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            tags,
            reencode_video: false,
            reencode_audio: false,
            target_height: None,
            crf: FALLBACK_CRF,
        }
    }

    /// The retry variant: both streams re-encoded at fixed quality.
    ///
    /// Video is only touched when the source actually carries a video stream,
    /// so audio files with cover art keep their artwork untouched.
    pub fn forced_reencode(&self, video_present: bool) -> Self {
        Self {
            reencode_video: video_present,
            reencode_audio: true,
            target_height: None,
            crf: FALLBACK_CRF,
            ..self.clone()
        }
    }

    /// Build the FFmpeg command for this request.
    pub fn to_command(&self) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(&self.input, &self.output)
            .input_arg("-fflags")
            .input_arg("+genpts")
            .map("0")
            .codec("copy");

        if self.reencode_video {
            cmd = cmd
                .video_codec(REENCODE_VIDEO_CODEC)
                .preset(REENCODE_PRESET)
                .crf(self.crf);
            if let Some(height) = self.target_height {
                cmd = cmd.video_filter(format!("scale=-2:{}", height));
            }
        }

        if self.reencode_audio {
            cmd = cmd
                .audio_codec(audio_codec_for(&self.output))
                .audio_bitrate(REENCODE_AUDIO_BITRATE);
        }

        let tags = &self.tags;
        cmd = cmd
            .metadata("title", &tags.title)
            .metadata("artist", &tags.artist)
            .metadata("author", &tags.author)
            .stream_metadata("s:v", "title", &tags.video_title)
            .stream_metadata("s:a", "title", &tags.audio_title)
            .stream_metadata("s:s", "title", &tags.subtitle_title)
            .output_args(["-avoid_negative_ts", "make_zero"]);

        if needs_faststart(&self.output) {
            cmd = cmd.output_args(["-movflags", "+faststart"]);
        }

        cmd
    }
}

fn output_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Audio encoder matching the output container.
fn audio_codec_for(output: &Path) -> &'static str {
    match output_extension(output).as_str() {
        "mp3" => MP3_AUDIO_CODEC,
        "flac" => "flac",
        "ogg" | "opus" => "libopus",
        "wav" => "pcm_s16le",
        _ => REENCODE_AUDIO_CODEC,
    }
}

fn needs_faststart(output: &Path) -> bool {
    matches!(output_extension(output).as_str(), "mp4" | "m4a" | "mov")
}

/// External media tool used by the pipeline.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Measure duration and resolution.
    async fn probe(&self, path: &Path) -> MediaResult<MediaProbe>;

    /// Run one remux invocation. A non-zero exit is an error.
    async fn remux(&self, request: &RemuxRequest, progress: Option<ProgressCallback>) -> MediaResult<()>;
}

/// `MediaTool` backed by the `ffmpeg` and `ffprobe` executables.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTool {
    runner: FfmpegRunner,
}

impl FfmpegTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill FFmpeg runs that exceed `secs`.
    pub fn with_timeout(secs: u64) -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(secs),
        }
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn probe(&self, path: &Path) -> MediaResult<MediaProbe> {
        probe_media(path).await
    }

    async fn remux(&self, request: &RemuxRequest, progress: Option<ProgressCallback>) -> MediaResult<()> {
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cmd = request.to_command();
        debug!(
            input = %request.input.display(),
            output = %request.output.display(),
            reencode_video = request.reencode_video,
            reencode_audio = request.reencode_audio,
            target_height = ?request.target_height,
            "Starting remux"
        );

        self.runner
            .run_with_progress(&cmd, move |p| {
                if let Some(callback) = &progress {
                    callback(p);
                }
            })
            .await?;

        info!(output = %request.output.display(), "Remux complete");
        Ok(())
    }
}
