//! Subtitle extraction with strategy fallback.

mod engine;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

pub use engine::SubtitleExtractor;

/// What to extract and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Subtitle ordinal to extract, skipping track selection. Used as
    /// given even when out of range.
    pub track_index: Option<usize>,
    /// Overrides the configured language preference.
    pub preferred_languages: Option<Vec<String>>,
}

impl ExtractionRequest {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            track_index: None,
            preferred_languages: None,
        }
    }

    pub fn with_track(mut self, track_index: usize) -> Self {
        self.track_index = Some(track_index);
        self
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.preferred_languages = Some(languages);
        self
    }
}

/// Extraction strategies, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The requested or best-matching subtitle track.
    ResolvedTrack,
    /// The first subtitle track.
    FirstTrack,
    /// Every stream of the container, until one converts to SRT.
    StreamScan,
}

impl Strategy {
    pub const ORDER: [Strategy; 3] = [
        Strategy::ResolvedTrack,
        Strategy::FirstTrack,
        Strategy::StreamScan,
    ];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::ResolvedTrack => "resolved track",
            Strategy::FirstTrack => "first track",
            Strategy::StreamScan => "stream scan",
        };
        f.write_str(name)
    }
}

/// Result of an extraction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// A non-empty subtitle file was written.
    Extracted { path: PathBuf, strategy: Strategy },
    /// Every strategy failed; `reason` lists each failure.
    Failed { reason: String },
}

/// Builds the file name used by `extract_all` for one track:
/// `<stem>_<language>[_<title>].srt`, with characters that are illegal in
/// file names dropped from the title.
pub fn track_file_name(stem: &str, language: &str, title: &str) -> String {
    let title: String = title
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .collect();
    let title = title.trim();

    if title.is_empty() {
        format!("{}_{}.srt", stem, language)
    } else {
        format!("{}_{}_{}.srt", stem, language, title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_names_drop_illegal_characters() {
        assert_eq!(track_file_name("movie", "eng", ""), "movie_eng.srt");
        assert_eq!(
            track_file_name("movie", "jpn", "Signs: Songs?"),
            "movie_jpn_Signs Songs.srt"
        );
        assert_eq!(track_file_name("movie", "und", "<|>"), "movie_und.srt");
    }
}
