//! Sequential batch processing: extract, verify, translate.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::ToolError;
use crate::extractor::{ExtractionOutcome, ExtractionRequest, SubtitleExtractor};
use crate::media::srt;
use crate::tools::CommandRunner;
use crate::translate::{translated_path, SubtitleTranslator};

use super::job::{BatchItem, BatchSummary, ItemStatus};

/// Shared stop request, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress update from the worker.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    /// 1-based position of the file in the batch.
    pub current: usize,
    pub total: usize,
    pub file: PathBuf,
    pub phase: BatchPhase,
}

/// Current phase of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Extracting,
    Verifying,
    Translating,
    Done,
}

/// Where batch outputs go.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Directory for subtitles; next to each video when unset.
    pub output_dir: Option<PathBuf>,
    /// Appended to the video stem, e.g. `_eng`.
    pub output_suffix: String,
    /// Appended to the subtitle stem for translations.
    pub translated_suffix: String,
    /// Overrides the configured language preference.
    pub preferred_languages: Option<Vec<String>>,
}

/// `<stem><suffix>.srt`, in `output_dir` or next to the video.
pub fn subtitle_path(source: &Path, output_dir: Option<&Path>, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!("{}{}.srt", stem, suffix);
    match output_dir {
        Some(dir) => dir.join(name),
        None => source.with_file_name(name),
    }
}

/// Processes a list of videos one after another.
pub struct BatchWorker<R> {
    extractor: SubtitleExtractor<R>,
    translator: Option<Arc<dyn SubtitleTranslator>>,
    options: BatchOptions,
    cancel: CancellationFlag,
    progress_tx: Option<mpsc::Sender<BatchProgress>>,
}

impl<R: CommandRunner> BatchWorker<R> {
    pub fn new(
        extractor: SubtitleExtractor<R>,
        translator: Option<Arc<dyn SubtitleTranslator>>,
        options: BatchOptions,
        cancel: CancellationFlag,
        progress_tx: Option<mpsc::Sender<BatchProgress>>,
    ) -> Self {
        Self {
            extractor,
            translator,
            options,
            cancel,
            progress_tx,
        }
    }

    /// Returns the subtitle path for a video.
    pub fn destination_for(&self, source: &Path) -> PathBuf {
        subtitle_path(
            source,
            self.options.output_dir.as_deref(),
            &self.options.output_suffix,
        )
    }

    /// Processes every input and returns the summary.
    ///
    /// A failing file is recorded and skipped. An unavailable tool stops
    /// the run; the remaining files are recorded as skipped.
    pub async fn run(&self, inputs: &[PathBuf]) -> BatchSummary {
        let started_at = Utc::now();
        let total = inputs.len();
        let mut items = Vec::with_capacity(total);
        let mut aborted: Option<String> = None;
        let mut cancelled = false;

        info!(total, "Starting batch");

        for (i, source) in inputs.iter().enumerate() {
            if let Some(reason) = &aborted {
                items.push(BatchItem::skipped(source, format!("batch aborted: {}", reason)));
                continue;
            }
            if self.cancel.is_cancelled() {
                if !cancelled {
                    warn!(remaining = total - i, "Batch cancelled");
                    cancelled = true;
                }
                items.push(BatchItem::skipped(source, "cancelled"));
                continue;
            }

            info!(current = i + 1, total, file = %source.display(), "Processing file");
            match self.process_item(i + 1, total, source).await {
                Ok(item) => {
                    match &item.status {
                        ItemStatus::Failed { reason } => {
                            error!(file = %source.display(), %reason, "File failed")
                        }
                        status => info!(file = %source.display(), ?status, "File done"),
                    }
                    items.push(item);
                }
                Err(e) => {
                    error!(error = %e, "Required tool unavailable, aborting batch");
                    items.push(BatchItem::start(source).fail(e.to_string()));
                    aborted = Some(e.to_string());
                }
            }
            self.send_progress(i + 1, total, source, BatchPhase::Done).await;
        }

        let summary = BatchSummary::new(started_at, items, aborted, cancelled);
        info!(
            total = summary.total,
            translated = summary.translated,
            extracted = summary.extracted,
            skipped = summary.skipped,
            failed = summary.failed,
            "Batch finished"
        );
        summary
    }

    /// Runs one file through extraction, verification and translation.
    async fn process_item(
        &self,
        current: usize,
        total: usize,
        source: &Path,
    ) -> Result<BatchItem, ToolError> {
        let mut item = BatchItem::start(source);
        let destination = self.destination_for(source);

        if let Some(parent) = destination.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return Ok(item.fail(format!(
                    "cannot create output directory '{}': {}",
                    parent.display(),
                    e
                )));
            }
        }

        self.send_progress(current, total, source, BatchPhase::Extracting).await;
        let mut request = ExtractionRequest::new(source, &destination);
        request.preferred_languages = self.options.preferred_languages.clone();

        let subtitle = match self.extractor.extract(&request).await? {
            ExtractionOutcome::Extracted { path, strategy } => {
                item.strategy = Some(strategy);
                path
            }
            ExtractionOutcome::Failed { reason } => return Ok(item.fail(reason)),
        };

        self.send_progress(current, total, source, BatchPhase::Verifying).await;
        let check = srt::verify(&subtitle);
        item.line_count = Some(check.line_count);
        if !check.is_valid {
            if let Err(e) = std::fs::remove_file(&subtitle) {
                warn!(path = %subtitle.display(), error = %e, "Failed to remove invalid subtitle");
            }
            return Ok(item.fail(format!(
                "extracted file is not valid SRT ({} lines)",
                check.line_count
            )));
        }
        item.subtitle = Some(subtitle.clone());

        let Some(translator) = &self.translator else {
            return Ok(item.finish(ItemStatus::Extracted));
        };

        self.send_progress(current, total, source, BatchPhase::Translating).await;
        let output = translated_path(&subtitle, &self.options.translated_suffix);
        let translator = Arc::clone(translator);
        let (input, target) = (subtitle, output.clone());
        let result = tokio::task::spawn_blocking(move || translator.translate(&input, &target)).await;

        match result {
            Ok(Ok(())) => {
                item.translated = Some(output);
                Ok(item.finish(ItemStatus::Translated))
            }
            Ok(Err(e)) => Ok(item.fail(format!("translation failed: {}", e))),
            Err(e) => Ok(item.fail(format!("translation task failed: {}", e))),
        }
    }

    /// Sends a progress update.
    async fn send_progress(&self, current: usize, total: usize, file: &Path, phase: BatchPhase) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx
                .send(BatchProgress {
                    current,
                    total,
                    file: file.to_path_buf(),
                    phase,
                })
                .await;
        }
    }
}
