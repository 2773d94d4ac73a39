//! Argument lists for the ffmpeg/ffprobe invocations the pipeline makes.

use std::ffi::OsString;
use std::fmt;
use std::path::Path;

/// Which input stream an extraction maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelector {
    /// N-th subtitle stream (`0:s:N`).
    Subtitle(usize),
    /// Absolute stream index of any type (`0:N`).
    Absolute(usize),
}

impl fmt::Display for StreamSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSelector::Subtitle(n) => write!(f, "0:s:{}", n),
            StreamSelector::Absolute(n) => write!(f, "0:{}", n),
        }
    }
}

/// `ffprobe -v quiet -print_format json -show_streams -select_streams s <video>`
pub fn structured_probe_args(video: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_streams",
        "-select_streams",
        "s",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(video.as_os_str().to_os_string());
    args
}

/// `ffmpeg -i <video>`; exits non-zero but prints the stream table.
pub fn stream_dump_args(video: &Path) -> Vec<OsString> {
    vec![OsString::from("-i"), video.as_os_str().to_os_string()]
}

/// `ffmpeg -y -i <video> -map <selector> -c:s srt <destination>`
pub fn extract_args(video: &Path, selector: StreamSelector, destination: &Path) -> Vec<OsString> {
    vec![
        OsString::from("-y"),
        OsString::from("-i"),
        video.as_os_str().to_os_string(),
        OsString::from("-map"),
        OsString::from(selector.to_string()),
        OsString::from("-c:s"),
        OsString::from("srt"),
        destination.as_os_str().to_os_string(),
    ]
}
