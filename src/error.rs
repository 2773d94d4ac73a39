//! Error types for the subtitle pipeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::tools::ToolKind;

/// Configuration loading and parsing errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {message}")]
    ParseFailed { path: PathBuf, message: String },

    #[error("Config validation failed with {error_count} error(s)")]
    ValidationFailed { error_count: usize },
}

/// External tool resolution errors.
///
/// Only `Unavailable` and `CacheDir` leave the provisioner; the remaining
/// variants describe why a single source was rejected and end up folded
/// into the `Unavailable` reason.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{tool} is unavailable: {reason}")]
    Unavailable { tool: ToolKind, reason: String },

    #[error("Tool cache directory '{path}' is not usable: {source}")]
    CacheDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Download of '{url}' failed: {message}")]
    Download { url: String, message: String },

    #[error("Failed to unpack '{archive}': {message}")]
    Unpack { archive: PathBuf, message: String },

    #[error("No static build is published for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },
}

impl ToolError {
    /// Returns true if this error means the tool cannot be used at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::CacheDir { .. })
    }
}

/// A track listing strategy could not produce usable output.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Probe command failed: {0}")]
    CommandFailed(String),

    #[error("Probe timed out: {0}")]
    TimedOut(String),

    #[error("Failed to parse probe output: {0}")]
    ParseFailed(String),

    #[error("Probe output contained no subtitle streams")]
    NoMatches,

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Why a single extraction attempt did not yield a usable file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("No subtitle track could be selected")]
    NoTrackSelected,

    #[error("ffmpeg failed: {0}")]
    CommandFailed(String),

    #[error("ffmpeg timed out: {0}")]
    TimedOut(String),

    #[error("Output file '{0}' was not created")]
    Missing(PathBuf),

    #[error("Output file '{0}' is empty")]
    Empty(PathBuf),

    #[error("Output file '{0}' does not look like SRT")]
    NotSrt(PathBuf),

    #[error("No stream indices could be scanned from the container")]
    NoStreams,
}

/// Translation collaborator errors.
#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("No translation command configured")]
    NotConfigured,

    #[error("Translation command failed to start: {0}")]
    SpawnFailed(String),

    #[error("Translation command exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("Translation produced no output at '{0}'")]
    NoOutput(PathBuf),
}

/// Batch-level errors.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Input path '{0}' does not exist")]
    InputMissing(PathBuf),

    #[error("Invalid file pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("No matching input files found under '{0}'")]
    NoInputs(PathBuf),

    #[error("Failed to write report '{path}': {message}")]
    ReportFailed { path: PathBuf, message: String },
}
