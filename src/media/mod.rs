//! Subtitle stream discovery, selection and SRT checks.

pub mod ffmpeg;
pub mod probe;
pub mod srt;
pub mod subtitle;

pub use probe::TrackLister;
pub use srt::SrtCheck;
pub use subtitle::{select_best, SubtitleTrack};
