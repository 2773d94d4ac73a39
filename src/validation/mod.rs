//! Configuration validation system.

pub mod paths;
pub mod report;
pub mod semantic;

use crate::config::model::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// The config is rejected.
    Error,
    /// Logged; the config still loads.
    Warning,
}

/// One problem found in a config file.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    /// Dotted field path, e.g. `extraction.preferred_languages[1]`.
    pub path: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Error, path, message)
    }

    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Warning, path, message)
    }

    fn new(severity: ValidationSeverity, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Top-level config section the field belongs to (`tools`, `batch`, ...).
    pub fn section(&self) -> &str {
        self.path
            .split(|c: char| c == '.' || c == '[')
            .next()
            .unwrap_or_default()
    }
}

/// Issues collected from every validator.
#[derive(Debug, Default)]
pub struct ValidationResult {
    issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn extend(&mut self, other: ValidationResult) {
        self.issues.extend(other.issues);
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Warnings never invalidate a config.
    pub fn is_valid(&self) -> bool {
        self.error_count() == 0
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.with_severity(ValidationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.with_severity(ValidationSeverity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    fn with_severity(&self, severity: ValidationSeverity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }
}

/// Validates the configuration.
pub fn validate_config(config: &AppConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    result.extend(semantic::validate(config));
    result.extend(paths::validate(config));

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let result = validate_config(&AppConfig::default());
        assert!(result.is_valid(), "{:?}", result);
    }

    #[test]
    fn warnings_do_not_invalidate() {
        let mut result = ValidationResult::new();
        result.add(ValidationIssue::warning("a", "b"));
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
        assert_eq!(result.error_count(), 0);

        result.add(ValidationIssue::error("c", "d").with_suggestion("e"));
        assert!(!result.is_valid());
        assert_eq!(result.errors().next().unwrap().suggestion.as_deref(), Some("e"));
    }

    #[test]
    fn section_is_the_top_level_key() {
        assert_eq!(ValidationIssue::error("tools.cache_dir", "x").section(), "tools");
        assert_eq!(
            ValidationIssue::error("extraction.preferred_languages[2]", "x").section(),
            "extraction"
        );
        assert_eq!(ValidationIssue::warning("batch[0]", "x").section(), "batch");
    }
}
