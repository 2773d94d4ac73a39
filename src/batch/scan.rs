//! Input discovery for batch runs.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::info;

use crate::config::BatchConfig;
use crate::error::BatchError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Finds the video files a batch run should process.
pub struct InputScanner {
    file_patterns: Vec<Pattern>,
    recursive: bool,
}

impl InputScanner {
    pub fn new(config: &BatchConfig) -> Result<Self, BatchError> {
        let file_patterns = config
            .file_patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| BatchError::InvalidPattern {
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            file_patterns,
            recursive: config.recursive,
        })
    }

    /// Overrides the configured recursion.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Lists matching files under `input`, sorted by path.
    ///
    /// A file is accepted on its own if it matches; a directory is walked.
    pub fn scan(&self, input: &Path) -> Result<Vec<PathBuf>, BatchError> {
        if !input.exists() {
            return Err(BatchError::InputMissing(input.to_path_buf()));
        }

        if input.is_file() {
            if self.matches_patterns(input) {
                return Ok(vec![input.to_path_buf()]);
            }
            return Err(BatchError::NoInputs(input.to_path_buf()));
        }

        let walker = if self.recursive {
            walkdir::WalkDir::new(input)
        } else {
            walkdir::WalkDir::new(input).max_depth(1)
        };

        let mut files: Vec<PathBuf> = walker
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.matches_patterns(e.path()))
            .map(|e| e.into_path())
            .collect();
        files.sort();

        info!(count = files.len(), path = %input.display(), "Scanned input directory");

        if files.is_empty() {
            return Err(BatchError::NoInputs(input.to_path_buf()));
        }
        Ok(files)
    }

    fn matches_patterns(&self, path: &Path) -> bool {
        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };

        self.file_patterns
            .iter()
            .any(|p| p.matches_with(filename, MATCH_OPTIONS))
    }
}
