//! Hand-off of extracted subtitles to an external translator.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::config::TranslationConfig;
use crate::error::TranslateError;

/// Translates a subtitle file into a new file.
#[cfg_attr(test, mockall::automock)]
pub trait SubtitleTranslator: Send + Sync {
    fn translate(&self, input: &Path, output: &Path) -> Result<(), TranslateError>;
}

/// Runs a configured program for each subtitle.
///
/// The argv template may contain `{input}` and `{output}`, which are
/// replaced with the subtitle paths.
#[derive(Debug, Clone)]
pub struct CommandTranslator {
    argv: Vec<String>,
}

impl CommandTranslator {
    pub fn new(argv: Vec<String>) -> Result<Self, TranslateError> {
        match argv.first() {
            Some(program) if !program.trim().is_empty() => Ok(Self { argv }),
            _ => Err(TranslateError::NotConfigured),
        }
    }

    /// Builds a translator from config, if one is configured.
    pub fn from_config(config: &TranslationConfig) -> Result<Option<Self>, TranslateError> {
        config.command.clone().map(Self::new).transpose()
    }

    fn expand(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.argv
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

impl SubtitleTranslator for CommandTranslator {
    fn translate(&self, input: &Path, output: &Path) -> Result<(), TranslateError> {
        let argv = self.expand(input, output);
        let (program, args) = argv.split_first().ok_or(TranslateError::NotConfigured)?;

        debug!(program = %program, args = ?args, "Running translator");
        let result = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| TranslateError::SpawnFailed(format!("{}: {}", program, e)))?;

        if !result.status.success() {
            return Err(TranslateError::Failed {
                code: result.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        if !output.is_file() {
            return Err(TranslateError::NoOutput(output.to_path_buf()));
        }

        info!(input = %input.display(), output = %output.display(), "Subtitle translated");
        Ok(())
    }
}

/// Returns where the translation of `subtitle` is written:
/// `<stem><suffix>.srt` in the same directory.
pub fn translated_path(subtitle: &Path, suffix: &str) -> PathBuf {
    let stem = subtitle
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    subtitle.with_file_name(format!("{}{}.srt", stem, suffix))
}
