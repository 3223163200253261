//! Choice of the first remux attempt.

use std::path::Path;

use renamer_media::{MediaProbe, RemuxRequest};
use renamer_models::encoding::{enhancement_target_height, ENHANCE_CRF};
use renamer_models::{MediaKind, MetadataTags};

/// Build the first remux attempt, or `None` when the file is not media.
///
/// `probe` is `None` when ffprobe failed. Documents that probe successfully
/// to neither a duration nor a video stream are copied byte for byte
/// instead; a document ffprobe could not read is still remuxed. Video is
/// re-encoded only when upscaling; audio is re-encoded when upscaling or when
/// the source duration is unknown, since broken timestamps usually come from
/// the audio track.
pub fn plan_remux(
    kind: MediaKind,
    probe: Option<&MediaProbe>,
    enhance_quality: bool,
    input: &Path,
    output: &Path,
    tags: MetadataTags,
) -> Option<RemuxRequest> {
    if let Some(p) = probe {
        if kind == MediaKind::Document && p.duration_secs.is_none() && !p.has_video() {
            return None;
        }
    }
    let probe = probe.copied().unwrap_or_default();

    let target_height = if kind == MediaKind::Video && enhance_quality {
        probe.height().and_then(enhancement_target_height)
    } else {
        None
    };
    let enhancing = target_height.is_some();

    let mut request = RemuxRequest::copy(input, output, tags);
    request.reencode_video = enhancing;
    request.reencode_audio = enhancing || probe.duration_secs.is_none();
    request.target_height = target_height;
    if enhancing {
        request.crf = ENHANCE_CRF;
    }
    Some(request)
}
