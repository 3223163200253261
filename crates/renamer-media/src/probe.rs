//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// The two properties the pipeline validates against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaProbe {
    /// Duration in seconds, when the container reports one
    pub duration_secs: Option<f64>,
    /// Width and height of the main video stream
    pub resolution: Option<(u32, u32)>,
}

impl MediaProbe {
    /// Height of the main video stream.
    pub fn height(&self) -> Option<u32> {
        self.resolution.map(|(_, h)| h)
    }

    /// Whether the file carries a real (non cover-art) video stream.
    pub fn has_video(&self) -> bool {
        self.resolution.is_some()
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    disposition: Option<FfprobeDisposition>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

/// Probe a media file for duration and resolution.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaProbe> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let ffprobe = check_ffprobe()?;

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

/// Parse FFprobe's JSON report.
pub fn parse_probe_output(json: &[u8]) -> MediaResult<MediaProbe> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let video_stream = probe.streams.iter().find(|s| {
        s.codec_type.as_deref() == Some("video")
            && s.disposition.as_ref().map_or(true, |d| d.attached_pic == 0)
    });

    // Container duration first, then any stream that reports one
    let duration_secs = probe
        .format
        .as_ref()
        .and_then(|f| parse_duration(f.duration.as_deref()))
        .or_else(|| {
            probe
                .streams
                .iter()
                .find_map(|s| parse_duration(s.duration.as_deref()))
        });

    let resolution = video_stream.and_then(|s| match (s.width, s.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
        _ => None,
    });

    Ok(MediaProbe {
        duration_secs,
        resolution,
    })
}

fn parse_duration(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_video_probe() {
        let json = br#"{
            "streams": [
                {"codec_type": "video", "width": 1280, "height": 720, "disposition": {"attached_pic": 0}},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "1442.112000"}
        }"#;

        let probe = parse_probe_output(json).unwrap();
        assert_eq!(probe.resolution, Some((1280, 720)));
        assert!((probe.duration_secs.unwrap() - 1442.112).abs() < 0.001);
        assert!(probe.has_video());
    }

    #[test]
    fn test_cover_art_is_not_video() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "duration": "201.5"},
                {"codec_type": "video", "width": 600, "height": 600, "disposition": {"attached_pic": 1}}
            ],
            "format": {"duration": "N/A"}
        }"#;

        let probe = parse_probe_output(json).unwrap();
        assert_eq!(probe.resolution, None);
        assert_eq!(probe.duration_secs, Some(201.5));
    }

    #[test]
    fn test_missing_duration_is_unknown() {
        let probe = parse_probe_output(br#"{"streams": [], "format": {}}"#).unwrap();
        assert_eq!(probe, MediaProbe::default());
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(matches!(
            parse_probe_output(b"not json"),
            Err(MediaError::JsonParse(_))
        ));
    }
}
