//! Shallow structural checks for SRT files.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// How many leading bytes the content sniff looks at.
pub const SNIFF_BYTES: usize = 200;

/// Result of [`verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SrtCheck {
    pub is_valid: bool,
    pub line_count: usize,
}

impl SrtCheck {
    fn invalid(line_count: usize) -> Self {
        Self {
            is_valid: false,
            line_count,
        }
    }
}

fn timestamp_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{2}:\d{2}:\d{2},\d{3} --> \d{2}:\d{2}:\d{2},\d{3}")
            .expect("timestamp pattern is valid")
    })
}

fn first_cue() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d+\s+\d{2}:\d{2}:\d{2},\d{3}\s+-->\s+\d{2}:\d{2}:\d{2},\d{3}")
            .expect("cue pattern is valid")
    })
}

/// Checks that a file starts like an SRT: a cue number, then a timestamp
/// range, with at least four lines in total.
///
/// Unreadable or non-UTF-8 files are invalid with a line count of zero.
pub fn verify(path: &Path) -> SrtCheck {
    match std::fs::read_to_string(path) {
        Ok(content) => verify_str(&content),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Cannot read subtitle file");
            SrtCheck::invalid(0)
        }
    }
}

/// Same as [`verify`], on already loaded content.
pub fn verify_str(content: &str) -> SrtCheck {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let lines: Vec<&str> = content.lines().collect();
    let line_count = lines.len();

    if line_count < 4 {
        return SrtCheck::invalid(line_count);
    }

    let index = lines[0].trim();
    let index_ok = !index.is_empty()
        && index.bytes().all(|b| b.is_ascii_digit())
        && index.parse::<u64>().map_or(false, |n| n > 0);
    if !index_ok || !timestamp_line().is_match(lines[1].trim()) {
        return SrtCheck::invalid(line_count);
    }

    SrtCheck {
        is_valid: true,
        line_count,
    }
}

/// Returns true if the first [`SNIFF_BYTES`] of a file contain an SRT cue
/// header.
pub fn looks_like_srt(path: &Path) -> bool {
    let mut head = Vec::with_capacity(SNIFF_BYTES);
    let read = File::open(path).and_then(|f| f.take(SNIFF_BYTES as u64).read_to_end(&mut head));
    match read {
        Ok(_) => head_looks_like_srt(&head),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Cannot sniff output file");
            false
        }
    }
}

/// Content check behind [`looks_like_srt`].
pub fn head_looks_like_srt(head: &[u8]) -> bool {
    let len = head.len().min(SNIFF_BYTES);
    first_cue().is_match(&String::from_utf8_lossy(&head[..len]))
}
