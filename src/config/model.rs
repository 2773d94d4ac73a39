//! Configuration data structures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure containing all settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// External tool provisioning settings.
    #[serde(default)]
    pub tools: ToolConfig,

    /// Subtitle extraction settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Batch input discovery settings.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Translation hand-off settings.
    #[serde(default)]
    pub translation: TranslationConfig,
}

/// Where ffmpeg/ffprobe may come from and how they are verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Directory holding binaries shipped alongside the application.
    /// Defaults to `<executable dir>/bin`.
    #[serde(default)]
    pub bundled_dir: Option<PathBuf>,

    /// Directory for downloaded static builds.
    /// Defaults to the per-user cache directory.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Whether to download a static build when nothing usable is installed.
    #[serde(default = "default_true")]
    pub allow_download: bool,

    /// Whether to consider binaries found on PATH.
    #[serde(default = "default_true")]
    pub use_system_path: bool,

    /// Timeout in seconds for the `-version` integrity probe.
    #[serde(default = "default_verify_timeout")]
    pub verify_timeout_secs: u64,

    /// Timeout in seconds for downloading a static build.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

/// Subtitle extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Language tags tried in order when choosing a track.
    #[serde(default = "default_preferred_languages")]
    pub preferred_languages: Vec<String>,

    /// Suffix appended to the video stem for the extracted subtitle.
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,

    /// Timeout in seconds for track listing probes.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Timeout in seconds for a track extraction.
    #[serde(default = "default_extract_timeout")]
    pub extract_timeout_secs: u64,

    /// Timeout in seconds for each brute-force stream attempt.
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,
}

/// Batch input discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// File patterns to match (e.g., ["*.mkv"]).
    #[serde(default = "default_file_patterns")]
    pub file_patterns: Vec<String>,

    /// Whether to descend into subdirectories.
    #[serde(default)]
    pub recursive: bool,
}

/// Translation hand-off settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// Command line of the external translator. `{input}` and `{output}`
    /// are replaced with the subtitle paths. Unset disables translation.
    #[serde(default)]
    pub command: Option<Vec<String>>,

    /// Suffix appended to the subtitle stem for the translated file.
    #[serde(default = "default_translated_suffix")]
    pub output_suffix: String,
}

impl ToolConfig {
    /// Returns the version probe timeout.
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    /// Returns the download timeout.
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Resolves the bundled binary directory.
    pub fn resolved_bundled_dir(&self) -> Option<PathBuf> {
        self.bundled_dir.clone().or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|dir| dir.join("bin")))
        })
    }

    /// Resolves the download cache directory.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("", "", "subtitle-pipeline")
                .map(|dirs| dirs.cache_dir().join("bin"))
                .unwrap_or_else(|| std::env::temp_dir().join("subtitle-pipeline").join("bin"))
        })
    }
}

impl ExtractionConfig {
    /// Returns the track listing timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Returns the extraction timeout.
    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    /// Returns the per-stream brute-force timeout.
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_verify_timeout() -> u64 {
    5
}

fn default_download_timeout() -> u64 {
    600
}

pub(crate) fn default_preferred_languages() -> Vec<String> {
    vec!["eng".to_string(), "en".to_string()]
}

fn default_output_suffix() -> String {
    "_eng".to_string()
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_extract_timeout() -> u64 {
    120
}

fn default_scan_timeout() -> u64 {
    60
}

fn default_file_patterns() -> Vec<String> {
    vec!["*.mkv".to_string()]
}

fn default_translated_suffix() -> String {
    "_translated".to_string()
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            bundled_dir: None,
            cache_dir: None,
            allow_download: true,
            use_system_path: true,
            verify_timeout_secs: default_verify_timeout(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            preferred_languages: default_preferred_languages(),
            output_suffix: default_output_suffix(),
            probe_timeout_secs: default_probe_timeout(),
            extract_timeout_secs: default_extract_timeout(),
            scan_timeout_secs: default_scan_timeout(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            file_patterns: default_file_patterns(),
            recursive: false,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            command: None,
            output_suffix: default_translated_suffix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.extraction.preferred_languages, vec!["eng", "en"]);
        assert_eq!(config.extraction.extract_timeout_secs, 120);
        assert_eq!(config.tools.verify_timeout_secs, 5);
        assert!(config.tools.allow_download);
        assert_eq!(config.batch.file_patterns, vec!["*.mkv"]);
        assert!(config.translation.command.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = "extraction:\n  preferred_languages: [jpn]\ntools:\n  allow_download: false\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.extraction.preferred_languages, vec!["jpn"]);
        assert_eq!(config.extraction.output_suffix, "_eng");
        assert!(!config.tools.allow_download);
        assert!(config.tools.use_system_path);
    }

    #[test]
    fn explicit_cache_dir_wins() {
        let config = ToolConfig {
            cache_dir: Some(PathBuf::from("/opt/cache")),
            ..ToolConfig::default()
        };
        assert_eq!(config.resolved_cache_dir(), PathBuf::from("/opt/cache"));
    }
}
