//! Per-file records and the batch summary.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BatchError;
use crate::extractor::Strategy;

/// Result of processing one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Extracted, validated and translated.
    Translated,
    /// Extracted and validated; no translator ran.
    Extracted,
    /// Not attempted.
    Skipped { reason: String },
    /// Attempted and failed.
    Failed { reason: String },
}

impl ItemStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemStatus::Translated | ItemStatus::Extracted)
    }
}

/// One input file of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    /// The video file.
    pub source: PathBuf,

    /// The extracted subtitle, when extraction succeeded.
    pub subtitle: Option<PathBuf>,

    /// The translated subtitle, when translation succeeded.
    pub translated: Option<PathBuf>,

    /// Strategy that produced the subtitle.
    pub strategy: Option<Strategy>,

    /// Line count reported by the SRT check.
    pub line_count: Option<usize>,

    #[serde(flatten)]
    pub status: ItemStatus,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchItem {
    /// Starts a record for `source`; the status is filled in by the
    /// terminal methods.
    pub fn start(source: &Path) -> Self {
        let now = Utc::now();
        Self {
            source: source.to_path_buf(),
            subtitle: None,
            translated: None,
            strategy: None,
            line_count: None,
            status: ItemStatus::Skipped {
                reason: "not processed".to_string(),
            },
            started_at: now,
            finished_at: now,
        }
    }

    /// Creates a record for a file that was never attempted.
    pub fn skipped(source: &Path, reason: impl Into<String>) -> Self {
        Self::start(source).finish(ItemStatus::Skipped {
            reason: reason.into(),
        })
    }

    /// Marks the record as failed.
    pub fn fail(self, reason: impl Into<String>) -> Self {
        self.finish(ItemStatus::Failed {
            reason: reason.into(),
        })
    }

    /// Sets the final status.
    pub fn finish(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self.finished_at = Utc::now();
        self
    }
}

/// Totals and per-file records of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub translated: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set when the run stopped early because a tool was unavailable.
    pub aborted: Option<String>,
    /// Set when the run was cancelled.
    pub cancelled: bool,
    pub items: Vec<BatchItem>,
}

impl BatchSummary {
    pub fn new(
        started_at: DateTime<Utc>,
        items: Vec<BatchItem>,
        aborted: Option<String>,
        cancelled: bool,
    ) -> Self {
        let count = |f: fn(&ItemStatus) -> bool| items.iter().filter(|i| f(&i.status)).count();
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at,
            finished_at: Utc::now(),
            total: items.len(),
            translated: count(|s| matches!(s, ItemStatus::Translated)),
            extracted: count(|s| matches!(s, ItemStatus::Extracted)),
            skipped: count(|s| matches!(s, ItemStatus::Skipped { .. })),
            failed: count(|s| matches!(s, ItemStatus::Failed { .. })),
            aborted,
            cancelled,
            items,
        }
    }

    /// Returns true if every file succeeded.
    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && !self.cancelled && self.items.iter().all(|i| i.status.is_success())
    }

    /// Writes the summary as pretty JSON.
    pub fn write_report(&self, path: &Path) -> Result<(), BatchError> {
        let report_err = |message: String| BatchError::ReportFailed {
            path: path.to_path_buf(),
            message,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| report_err(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| report_err(e.to_string()))
    }
}
