//! Semantic validation for configuration values.

use std::collections::HashSet;

use crate::config::model::AppConfig;

use super::{ValidationIssue, ValidationResult};

/// Language tags ffprobe commonly reports: ISO 639-2 plus the two-letter
/// forms some muxers write.
const KNOWN_LANGUAGE_CODES: &[&str] = &[
    "eng", "jpn", "deu", "ger", "fra", "fre", "spa", "ita", "por", "rus", "zho", "chi", "kor",
    "ara", "hin", "tha", "vie", "ind", "msa", "pol", "nld", "dut", "swe", "nor", "dan", "fin",
    "ces", "cze", "hun", "ron", "rum", "tur", "ell", "gre", "heb", "ukr", "bul", "hrv", "srp",
    "slv", "slk", "lit", "lav", "est", "und", "mul", "en", "ja", "de", "fr", "es", "it", "pt",
    "ru", "zh", "ko", "ar", "hi", "th", "vi", "id", "pl", "nl", "sv", "no", "da", "fi", "cs",
    "hu", "ro", "tr", "el", "he", "uk",
];

/// Validates semantic correctness of configuration values.
pub fn validate(config: &AppConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_timeouts(config, &mut result);
    validate_languages(&config.extraction.preferred_languages, &mut result);

    if config.extraction.output_suffix.contains(['/', '\\']) {
        result.add(ValidationIssue::error(
            "extraction.output_suffix",
            format!(
                "Suffix '{}' must not contain path separators",
                config.extraction.output_suffix
            ),
        ));
    }

    if config.batch.file_patterns.is_empty() {
        result.add(
            ValidationIssue::error("batch.file_patterns", "At least one file pattern is required")
                .with_suggestion("Use [\"*.mkv\"] to match Matroska files"),
        );
    }

    for (i, pattern) in config.batch.file_patterns.iter().enumerate() {
        if let Err(e) = glob::Pattern::new(pattern) {
            result.add(ValidationIssue::error(
                format!("batch.file_patterns[{}]", i),
                format!("Invalid pattern '{}': {}", pattern, e),
            ));
        }
    }

    validate_translation(config, &mut result);

    if !config.tools.allow_download && !config.tools.use_system_path {
        result.add(
            ValidationIssue::warning(
                "tools",
                "PATH lookup and downloads are both disabled; only bundled or cached binaries will be used",
            )
            .with_suggestion("Enable tools.use_system_path or tools.allow_download"),
        );
    }

    result
}

/// Validates that every timeout is non-zero.
fn validate_timeouts(config: &AppConfig, result: &mut ValidationResult) {
    let timeouts = [
        ("tools.verify_timeout_secs", config.tools.verify_timeout_secs),
        ("tools.download_timeout_secs", config.tools.download_timeout_secs),
        ("extraction.probe_timeout_secs", config.extraction.probe_timeout_secs),
        ("extraction.extract_timeout_secs", config.extraction.extract_timeout_secs),
        ("extraction.scan_timeout_secs", config.extraction.scan_timeout_secs),
    ];

    for (path, secs) in timeouts {
        if secs == 0 {
            result.add(ValidationIssue::error(path, "Timeout must be at least 1 second"));
        }
    }
}

/// Validates the preferred language list.
fn validate_languages(languages: &[String], result: &mut ValidationResult) {
    if languages.is_empty() {
        result.add(
            ValidationIssue::warning(
                "extraction.preferred_languages",
                "No preferred languages, the first track will always be chosen",
            )
            .with_suggestion("Add at least one language, e.g. [\"eng\", \"en\"]"),
        );
        return;
    }

    let mut seen = HashSet::new();
    for (i, lang) in languages.iter().enumerate() {
        let path = format!("extraction.preferred_languages[{}]", i);
        let lower = lang.to_lowercase();

        if lower.trim().is_empty() {
            result.add(ValidationIssue::error(path, "Language tag cannot be empty"));
            continue;
        }

        if !seen.insert(lower.clone()) {
            result.add(ValidationIssue::warning(
                path,
                format!("Duplicate language tag '{}'", lang),
            ));
            continue;
        }

        if !KNOWN_LANGUAGE_CODES.contains(&lower.as_str()) {
            result.add(
                ValidationIssue::warning(path, format!("Unrecognized language tag '{}'", lang))
                    .with_suggestion(format!("Did you mean '{}'?", closest_language(&lower))),
            );
        }
    }
}

/// Validates the translation command template.
fn validate_translation(config: &AppConfig, result: &mut ValidationResult) {
    let Some(command) = &config.translation.command else {
        return;
    };

    if command.is_empty() || command[0].trim().is_empty() {
        result.add(ValidationIssue::error(
            "translation.command",
            "Translation command must name a program",
        ));
        return;
    }

    if !command.iter().any(|arg| arg.contains("{input}")) {
        result.add(
            ValidationIssue::warning(
                "translation.command",
                "Translation command never references {input}",
            )
            .with_suggestion("Pass the subtitle path with an {input} placeholder"),
        );
    }

    if config.translation.output_suffix.is_empty() {
        result.add(ValidationIssue::error(
            "translation.output_suffix",
            "Translated output would overwrite the extracted subtitle",
        ));
    }
}

/// Finds the closest known language code.
fn closest_language(input: &str) -> &'static str {
    KNOWN_LANGUAGE_CODES
        .iter()
        .min_by_key(|code| strsim::levenshtein(input, code))
        .copied()
        .unwrap_or("eng")
}
