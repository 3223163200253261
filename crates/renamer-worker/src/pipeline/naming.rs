//! Output file naming from the user's format template.

use renamer_media::FilenameInfo;
use renamer_models::encoding::MISSING_NUMBER_PLACEHOLDER;
use renamer_models::MediaKind;

/// Name chosen for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub season: Option<String>,
    pub episode: Option<String>,
    pub quality: String,
    /// Final file name, extension included
    pub file_name: String,
}

/// Fill `template` from `info` and append the extension for `kind`.
///
/// Braced placeholders are substituted before the bare `Season`, `Episode`
/// and `QUALITY` words. Path separators in the result become `_` so the name
/// never escapes the working directory.
pub fn resolve_name(
    template: &str,
    info: &FilenameInfo,
    kind: MediaKind,
    source_name: &str,
) -> ResolvedName {
    let season = info.season.as_deref().unwrap_or(MISSING_NUMBER_PLACEHOLDER);
    let episode = info.episode.as_deref().unwrap_or(MISSING_NUMBER_PLACEHOLDER);
    let quality = info.quality.as_str();

    let substitutions = [
        ("{season}", season),
        ("{episode}", episode),
        ("{quality}", quality),
        ("Season", season),
        ("Episode", episode),
        ("QUALITY", quality),
    ];

    let mut stem = template.trim().to_string();
    for (placeholder, value) in substitutions {
        stem = stem.replace(placeholder, value);
    }

    let mut stem: String = stem
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        stem = kind.default_file_name().to_string();
    }

    ResolvedName {
        season: info.season.clone(),
        episode: info.episode.clone(),
        quality: info.quality.clone(),
        file_name: format!("{}{}", stem, kind.output_extension(source_name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renamer_media::extract;

    fn name(template: &str, source: &str, kind: MediaKind) -> String {
        resolve_name(template, &extract(source), kind, source).file_name
    }

    #[test]
    fn test_braced_placeholders() {
        assert_eq!(
            name("Show S{season}E{episode} [{quality}]", "Show.S01E05.1080p.mp4", MediaKind::Video),
            "Show S01E05 [1080p].mkv"
        );
    }

    #[test]
    fn test_bare_placeholders() {
        assert_eq!(
            name("Anime - Episode (QUALITY)", "[Sub] Anime - 07 [720p].mkv", MediaKind::Video),
            "Anime - 07 (720p).mkv"
        );
    }

    #[test]
    fn test_missing_numbers_use_placeholder() {
        let resolved = resolve_name(
            "Song S{season} E{episode}",
            &extract("track.flac"),
            MediaKind::Audio,
            "track.flac",
        );
        assert_eq!(resolved.file_name, "Song SXX EXX.mp3");
        assert!(resolved.season.is_none());
        assert_eq!(resolved.quality, "Unknown");
    }

    #[test]
    fn test_document_keeps_source_extension() {
        assert_eq!(name("Book {episode}", "vol 3.pdf", MediaKind::Document), "Book 3.pdf");
        assert_eq!(name("Blob", "README", MediaKind::Document), "Blob.bin");
    }

    #[test]
    fn test_separators_are_replaced() {
        assert_eq!(
            name("../etc/{episode}", "E02.mkv", MediaKind::Video),
            ".._etc_02.mkv"
        );
        assert_eq!(name("a\\b", "x.mp4", MediaKind::Video), "a_b.mkv");
    }

    #[test]
    fn test_empty_template_falls_back_to_kind() {
        assert_eq!(name("   ", "x.mp4", MediaKind::Video), "video.mkv");
    }
}
