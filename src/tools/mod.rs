//! Locating, downloading, verifying and running ffmpeg/ffprobe.

pub mod cache;
pub mod download;
pub mod integrity;
pub mod provisioner;
pub mod runner;

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use cache::ToolCache;
pub use provisioner::{ToolProvisioner, Verification};
pub use runner::{CommandOutput, CommandRunner, ToolRunner};

/// External tools the pipeline shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// The general-purpose tool: stream dumps and extraction.
    Ffmpeg,
    /// The prober: structured stream metadata.
    Ffprobe,
}

impl ToolKind {
    /// All tool kinds, in resolution order.
    pub const ALL: [ToolKind; 2] = [ToolKind::Ffmpeg, ToolKind::Ffprobe];

    /// Returns the bare command name.
    pub fn command_name(self) -> &'static str {
        match self {
            ToolKind::Ffmpeg => "ffmpeg",
            ToolKind::Ffprobe => "ffprobe",
        }
    }

    /// Returns the executable file name on this platform.
    pub fn file_name(self) -> String {
        if cfg!(windows) {
            format!("{}.exe", self.command_name())
        } else {
            self.command_name().to_string()
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_name())
    }
}

/// Where a verified binary was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    /// Found on the system PATH.
    SystemPath,
    /// Shipped next to the application.
    Bundled,
    /// Downloaded earlier into the cache directory.
    Cache,
    /// Downloaded during this resolution.
    Downloaded,
}

impl fmt::Display for ToolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ToolSource::SystemPath => "system PATH",
            ToolSource::Bundled => "bundled",
            ToolSource::Cache => "cache",
            ToolSource::Downloaded => "download",
        };
        f.write_str(label)
    }
}

/// A binary that passed the version probe.
#[derive(Debug, Clone, Serialize)]
pub struct ToolHandle {
    /// Which tool this is.
    pub kind: ToolKind,
    /// Absolute path to the executable.
    pub path: PathBuf,
    /// Where it was found.
    pub source: ToolSource,
    /// First line of `-version` output.
    pub version: String,
    /// When the version probe succeeded.
    pub verified_at: DateTime<Utc>,
}
