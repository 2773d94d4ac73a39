//! Path validation for tool directories.

use std::path::Path;

use crate::config::model::AppConfig;

use super::{ValidationIssue, ValidationResult};

/// Validates that configured tool directories are usable.
pub fn validate(config: &AppConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    if let Some(dir) = &config.tools.bundled_dir {
        validate_directory_readable(dir, "tools.bundled_dir", &mut result);
    }

    if let Some(dir) = &config.tools.cache_dir {
        if config.tools.allow_download {
            validate_directory_writable(dir, "tools.cache_dir", &mut result);
        } else if !dir.exists() {
            result.add(ValidationIssue::warning(
                "tools.cache_dir",
                format!("Cache directory does not exist: '{}'", dir.display()),
            ));
        }
    }

    if let (Some(bundled), Some(cache)) = (&config.tools.bundled_dir, &config.tools.cache_dir) {
        if bundled == cache {
            result.add(
                ValidationIssue::warning(
                    "tools.cache_dir",
                    "Cache directory is the same as the bundled directory",
                )
                .with_suggestion("Downloads may overwrite bundled binaries"),
            );
        }
    }

    result
}

/// Validates that a directory exists and is readable.
fn validate_directory_readable(path: &Path, config_path: &str, result: &mut ValidationResult) {
    if !path.exists() {
        result.add(
            ValidationIssue::warning(
                config_path,
                format!("Directory does not exist: '{}'", path.display()),
            )
            .with_suggestion("Bundled binaries will be skipped"),
        );
        return;
    }

    if !path.is_dir() {
        result.add(ValidationIssue::error(
            config_path,
            format!("Path is not a directory: '{}'", path.display()),
        ));
        return;
    }

    if std::fs::read_dir(path).is_err() {
        result.add(
            ValidationIssue::error(
                config_path,
                format!("Directory is not readable: '{}'", path.display()),
            )
            .with_suggestion("Check directory permissions"),
        );
    }
}

/// Validates that a directory exists and is writable.
fn validate_directory_writable(path: &Path, config_path: &str, result: &mut ValidationResult) {
    if !path.exists() {
        if let Err(e) = std::fs::create_dir_all(path) {
            result.add(
                ValidationIssue::error(
                    config_path,
                    format!("Cannot create directory '{}': {}", path.display(), e),
                )
                .with_suggestion("Check parent directory permissions"),
            );
        }
        return;
    }

    if !path.is_dir() {
        result.add(ValidationIssue::error(
            config_path,
            format!("Path is not a directory: '{}'", path.display()),
        ));
        return;
    }

    let test_file = path.join(".write_test");
    match std::fs::write(&test_file, "test") {
        Ok(()) => {
            let _ = std::fs::remove_file(&test_file);
        }
        Err(e) => {
            result.add(
                ValidationIssue::error(
                    config_path,
                    format!("Directory is not writable '{}': {}", path.display(), e),
                )
                .with_suggestion("Check directory permissions"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_dir_is_created() {
        let root = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.tools.cache_dir = Some(root.path().join("nested").join("bin"));

        let result = validate(&config);
        assert!(result.is_valid());
        assert!(root.path().join("nested").join("bin").is_dir());
    }

    #[test]
    fn bundled_dir_that_is_a_file_is_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = AppConfig::default();
        config.tools.bundled_dir = Some(file.path().to_path_buf());
        assert!(!validate(&config).is_valid());
    }

    #[test]
    fn missing_bundled_dir_only_warns() {
        let root = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.tools.bundled_dir = Some(root.path().join("absent"));
        let result = validate(&config);
        assert!(result.is_valid());
        assert_eq!(result.warnings().count(), 1);
    }
}
