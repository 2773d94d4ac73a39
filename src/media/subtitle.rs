//! Subtitle track model and selection.

use serde::Serialize;

/// One subtitle stream of a container, as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtitleTrack {
    /// Position among the subtitle streams of this listing (0-based, dense).
    pub index: usize,
    /// Absolute stream index in the container.
    pub stream_index: usize,
    /// Language tag, `und` when untagged.
    pub language: String,
    /// Codec name, `unknown` when not reported.
    pub codec: String,
    /// Title tag, empty when untagged.
    pub title: String,
}

impl SubtitleTrack {
    pub fn new(index: usize, stream_index: usize) -> Self {
        Self {
            index,
            stream_index,
            language: "und".to_string(),
            codec: "unknown".to_string(),
            title: String::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Returns true if the title names English.
    pub fn has_english_title(&self) -> bool {
        let title = self.title.to_lowercase();
        title.contains("english")
            || title.starts_with("eng")
            || title.ends_with("eng")
            || title
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word == "eng")
    }
}

/// Picks the track to extract.
///
/// Preferred languages are tried in order, each against every track in
/// listing order. Failing that, the first track with an English title wins,
/// then the first track. Returns `None` only for an empty listing.
pub fn select_best<'a, S: AsRef<str>>(
    tracks: &'a [SubtitleTrack],
    preferred_languages: &[S],
) -> Option<&'a SubtitleTrack> {
    for lang in preferred_languages {
        let lang = lang.as_ref();
        if let Some(track) = tracks
            .iter()
            .find(|t| t.language.eq_ignore_ascii_case(lang))
        {
            return Some(track);
        }
    }

    tracks
        .iter()
        .find(|t| t.has_english_title())
        .or_else(|| tracks.first())
}
