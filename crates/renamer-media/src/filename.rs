//! Season, episode and quality extraction from raw filenames.
//!
//! Two independent ordered passes over the same string. In each pass the
//! first pattern that matches wins, so more specific patterns sit earlier in
//! the tables and the bare-number episode rule comes last.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use renamer_models::encoding::UNKNOWN_QUALITY;

/// Fields recovered from a filename.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilenameInfo {
    pub season: Option<String>,
    pub episode: Option<String>,
    pub quality: String,
}

/// Which groups a season/episode pattern captures.
#[derive(Debug, Clone, Copy)]
enum Captures {
    SeasonEpisode,
    EpisodeOnly,
    SeasonOnly,
}

struct EpisodePattern {
    regex: Regex,
    captures: Captures,
}

impl EpisodePattern {
    fn new(pattern: &str, captures: Captures) -> Self {
        Self {
            regex: Regex::new(pattern).unwrap(),
            captures,
        }
    }
}

static EPISODE_PATTERNS: LazyLock<Vec<EpisodePattern>> = LazyLock::new(|| {
    use Captures::*;
    vec![
        EpisodePattern::new(r"S(\d+)(?:E|EP)(\d+)", SeasonEpisode),
        EpisodePattern::new(r"S(\d+)[\s-]*(?:E|EP)(\d+)", SeasonEpisode),
        EpisodePattern::new(r"(?i)Season\s*(\d+)\s*Episode\s*(\d+)", SeasonEpisode),
        EpisodePattern::new(r"\[S-(\d+)\]\s*\[E-(\d+)\]", SeasonEpisode),
        EpisodePattern::new(r"\[S(\d+)\]\s*\[E(\d+)\]", SeasonEpisode),
        EpisodePattern::new(r"(?i)\[Season\s*(\d+)\]\s*\[Episode\s*(\d+)\]", SeasonEpisode),
        EpisodePattern::new(r"\bS-(\d+)\b\s*\bE-(\d+)\b", SeasonEpisode),
        EpisodePattern::new(r"S(\d+)[^\d]*(\d+)", SeasonEpisode),
        EpisodePattern::new(r"(?i)(?:E|EP|Episode)\s*(\d+)", EpisodeOnly),
        EpisodePattern::new(r"(?i)\b(?:Ep|E-)(\d+)\b", EpisodeOnly),
        EpisodePattern::new(r"(?i)\bEp-(\d+)\b", EpisodeOnly),
        EpisodePattern::new(r"(?i)\bEpisode-(\d+)\b", EpisodeOnly),
        EpisodePattern::new(r"\[S-(\d+)\]", SeasonOnly),
        EpisodePattern::new(r"(?i)\[Season\s*(\d+)\]", SeasonOnly),
        EpisodePattern::new(r"\bS-(\d+)\b", SeasonOnly),
        EpisodePattern::new(r"\b(\d+)\b", EpisodeOnly),
    ]
});

/// How a quality match is turned into the reported value.
enum QualityValue {
    Fixed(&'static str),
    Lowercase,
}

static QUALITY_PATTERNS: LazyLock<Vec<(Regex, QualityValue)>> = LazyLock::new(|| {
    use QualityValue::*;
    [
        (r"(?i)\b(?:4k|2160p)\b", Fixed("4k")),
        (r"(?i)\b(?:2k|1440p)\b", Fixed("2k")),
        (r"(?i)\b(\d{3,4}[pi])\b", Lowercase),
        (r"(?i)\bSD\b", Fixed("480p")),
        (r"(?i)\bHD\b", Fixed("720p")),
        (r"(?i)\b(?:UHD|4kX264|4kX265)\b", Fixed("4k")),
        (r"(?i)\b(?:HDRip|HDTV)\b", Fixed("720p")),
        (r"(?i)\b(?:X264|X265|HEVC)\b", Fixed("1080p")),
        (r"(?i)(\d{3,4}[pi])", Lowercase),
    ]
    .into_iter()
    .map(|(pattern, value)| (Regex::new(pattern).unwrap(), value))
    .collect()
});

/// Extract season, episode and quality from a filename.
pub fn extract(filename: &str) -> FilenameInfo {
    let (season, episode) = extract_season_episode(filename);
    FilenameInfo {
        season,
        episode,
        quality: extract_quality(filename),
    }
}

fn extract_season_episode(filename: &str) -> (Option<String>, Option<String>) {
    for pattern in EPISODE_PATTERNS.iter() {
        let Some(caps) = pattern.regex.captures(filename) else {
            continue;
        };
        let group = |i: usize| caps.get(i).map(|m| m.as_str().to_string());
        return match pattern.captures {
            Captures::SeasonEpisode => (group(1), group(2)),
            Captures::EpisodeOnly => (None, group(1)),
            Captures::SeasonOnly => (group(1), None),
        };
    }
    (None, None)
}

fn extract_quality(filename: &str) -> String {
    for (regex, value) in QUALITY_PATTERNS.iter() {
        let Some(caps) = regex.captures(filename) else {
            continue;
        };
        return match value {
            QualityValue::Fixed(v) => (*v).to_string(),
            QualityValue::Lowercase => caps
                .get(1)
                .map_or_else(|| UNKNOWN_QUALITY.to_string(), |m| m.as_str().to_lowercase()),
        };
    }
    UNKNOWN_QUALITY.to_string()
}
