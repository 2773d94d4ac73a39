//! Human-readable config reports, grouped by top-level config section.

use super::{ValidationIssue, ValidationResult, ValidationSeverity};

/// Sections in the order they appear in a config file.
const SECTIONS: [&str; 4] = ["tools", "extraction", "batch", "translation"];

/// Formats a validation result for `config-validate` and load failures.
pub fn format_report(result: &ValidationResult) -> String {
    if result.issues().is_empty() {
        return "Configuration is valid.".to_string();
    }

    let mut report = String::new();
    for section in ordered_sections(result) {
        let mut issues: Vec<&ValidationIssue> = result
            .issues()
            .iter()
            .filter(|i| i.section() == section)
            .collect();
        issues.sort_by_key(|i| i.severity != ValidationSeverity::Error);

        report.push_str(&format!("[{}]\n", section));
        for issue in issues {
            report.push_str(&format_issue(issue));
        }
        report.push('\n');
    }

    let errors = result.error_count();
    report.push_str(&format!(
        "{} error(s), {} warning(s)",
        errors,
        result.warning_count()
    ));
    if errors > 0 {
        report.push_str(", config rejected");
    }
    report.push('\n');
    report
}

/// Known sections first, then anything else in first-seen order.
fn ordered_sections(result: &ValidationResult) -> Vec<&str> {
    let mut sections: Vec<&str> = SECTIONS
        .iter()
        .copied()
        .filter(|s| result.issues().iter().any(|i| i.section() == *s))
        .collect();
    for issue in result.issues() {
        let section = issue.section();
        if !sections.contains(&section) {
            sections.push(section);
        }
    }
    sections
}

fn format_issue(issue: &ValidationIssue) -> String {
    let label = match issue.severity {
        ValidationSeverity::Error => "error",
        ValidationSeverity::Warning => "warning",
    };

    let mut line = format!("  {:<7} {}: {}\n", label, issue.path, issue.message);
    if let Some(suggestion) = &issue.suggestion {
        line.push_str(&format!("          hint: {}\n", suggestion));
    }
    line
}
