//! Subtitle Pipeline - extracts the best subtitle track from video
//! containers and hands it to a translator.
//!
//! ffmpeg and ffprobe are located on the system, next to the executable or
//! in a download cache, and fetched on demand when none is usable.

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod media;
pub mod tools;
pub mod translate;
pub mod validation;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::batch::{BatchOptions, BatchProgress, BatchWorker, CancellationFlag, InputScanner};
use crate::cli::{Cli, Commands, ExtractArgs, LogFormat, RunArgs};
use crate::config::AppConfig;
use crate::extractor::{ExtractionOutcome, ExtractionRequest, SubtitleExtractor};
use crate::media::{select_best, srt, TrackLister};
use crate::tools::{ToolCache, ToolKind, ToolProvisioner, ToolRunner, Verification};
use crate::translate::{CommandTranslator, SubtitleTranslator};

/// Runs the pipeline with the provided CLI arguments.
pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.log_level(), cli.log_format, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Run(args) => run_batch(args, &cli.config).await,
        Commands::List { file, json } => list_tracks(&cli.config, &file, json).await,
        Commands::Extract(args) => extract(args, &cli.config).await,
        Commands::Verify { file } => verify(&file),
        Commands::Tools { force } => resolve_tools(&cli.config, force).await,
        Commands::ConfigValidate => validate_config(&cli.config),
        Commands::ConfigShow => show_config(&cli.config),
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// Logs go to stderr in the chosen format. With a log file, a plain-text
/// copy is appended there too; a file that cannot be opened is reported
/// and otherwise ignored.
fn setup_logging(level: &str, format: LogFormat, log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
    }];

    let mut file_error = None;
    if let Some(path) = log_file {
        match log_file_appender(path) {
            Ok(appender) => layers.push(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(appender)
                    .boxed(),
            ),
            Err(e) => file_error = Some((path, e)),
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if let Some((path, e)) = file_error {
        warn!(path = %path.display(), error = %e, "Failed to set up file logging");
    }
    Ok(())
}

/// Opens `path` for appending, creating its directory if needed.
fn log_file_appender(path: &Path) -> Result<RollingFileAppender> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .with_context(|| format!("'{}' does not name a file", path.display()))?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory '{}'", dir.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)?;
    Ok(appender)
}

/// Builds a runner with a fresh tool cache.
fn tool_runner(config: &AppConfig) -> Arc<ToolRunner> {
    let cache = Arc::new(ToolCache::new());
    let provisioner = Arc::new(ToolProvisioner::new(config.tools.clone(), cache));
    Arc::new(ToolRunner::new(provisioner))
}

/// Processes a file or directory of videos.
async fn run_batch(args: RunArgs, config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;

    let scanner =
        InputScanner::new(&config.batch)?.recursive(args.recursive || config.batch.recursive);
    let inputs = scanner.scan(&args.path)?;

    let translator: Option<Arc<dyn SubtitleTranslator>> = if args.no_translate {
        None
    } else {
        CommandTranslator::from_config(&config.translation)?
            .map(|t| Arc::new(t) as Arc<dyn SubtitleTranslator>)
    };
    if translator.is_none() {
        info!("Translation disabled, subtitles will only be extracted");
    }

    let options = BatchOptions {
        output_dir: args.output_dir,
        output_suffix: config.extraction.output_suffix.clone(),
        translated_suffix: config.translation.output_suffix.clone(),
        preferred_languages: (!args.languages.is_empty()).then_some(args.languages),
    };

    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current file");
                cancel.cancel();
            }
        });
    }

    let (progress_tx, mut progress_rx) = mpsc::channel::<BatchProgress>(100);
    tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            debug!(
                current = progress.current,
                total = progress.total,
                file = %progress.file.display(),
                phase = ?progress.phase,
                "Batch progress"
            );
        }
    });

    let extractor = SubtitleExtractor::new(tool_runner(&config), config.extraction.clone());
    let worker = BatchWorker::new(extractor, translator, options, cancel, Some(progress_tx));
    let summary = worker.run(&inputs).await;

    if let Some(path) = &args.report {
        summary.write_report(path)?;
        info!(path = %path.display(), "Report written");
    }

    println!(
        "{} file(s): {} translated, {} extracted, {} skipped, {} failed",
        summary.total, summary.translated, summary.extracted, summary.skipped, summary.failed
    );

    if summary.is_success() {
        return Ok(());
    }
    if let Some(reason) = &summary.aborted {
        anyhow::bail!("Batch aborted: {}", reason);
    }
    if summary.cancelled {
        anyhow::bail!("Batch cancelled, {} file(s) not processed", summary.skipped);
    }
    anyhow::bail!("{} file(s) failed", summary.failed)
}

/// Prints the subtitle tracks of a video.
async fn list_tracks(config_path: &Path, file: &Path, json: bool) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let lister = TrackLister::new(tool_runner(&config), config.extraction.probe_timeout());
    let tracks = lister.list_subtitle_tracks(file).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&tracks)?);
        return Ok(());
    }

    if tracks.is_empty() {
        println!("No subtitle tracks found.");
        return Ok(());
    }

    let best = select_best(&tracks, &config.extraction.preferred_languages).map(|t| t.index);
    println!("Subtitle tracks ({}):", tracks.len());
    for track in &tracks {
        let marker = if Some(track.index) == best { "*" } else { " " };
        println!(
            "{} {:>2}  stream {:<3} {:<4} {:<18} {}",
            marker, track.index, track.stream_index, track.language, track.codec, track.title
        );
    }
    Ok(())
}

/// Extracts one track, or every track with `--all`.
async fn extract(args: ExtractArgs, config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let extractor = SubtitleExtractor::new(tool_runner(&config), config.extraction.clone());

    if args.all {
        let output_dir = match args.output {
            Some(dir) => dir,
            None => args
                .file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        std::fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output directory '{}'", output_dir.display())
        })?;

        let written = extractor.extract_all(&args.file, &output_dir).await?;
        if written.is_empty() {
            anyhow::bail!("No subtitle tracks could be extracted");
        }
        for path in &written {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let destination = args.output.unwrap_or_else(|| {
        batch::subtitle_path(&args.file, None, &config.extraction.output_suffix)
    });
    ensure_parent_dir(&destination)?;
    let mut request = ExtractionRequest::new(&args.file, destination);
    if let Some(track) = args.track {
        request = request.with_track(track);
    }
    if !args.languages.is_empty() {
        request = request.with_languages(args.languages);
    }

    match extractor.extract(&request).await? {
        ExtractionOutcome::Extracted { path, strategy } => {
            let check = srt::verify(&path);
            println!(
                "{} ({}, {} lines, {})",
                path.display(),
                strategy,
                check.line_count,
                if check.is_valid { "valid SRT" } else { "not valid SRT" }
            );
            Ok(())
        }
        ExtractionOutcome::Failed { reason } => anyhow::bail!("Extraction failed: {}", reason),
    }
}

/// Creates the directory an output file will be written into.
fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory '{}'", parent.display())),
        _ => Ok(()),
    }
}

/// Checks a subtitle file.
fn verify(file: &Path) -> Result<()> {
    let check = srt::verify(file);
    println!(
        "{}: {} ({} lines)",
        file.display(),
        if check.is_valid { "valid" } else { "invalid" },
        check.line_count
    );
    if !check.is_valid {
        anyhow::bail!("'{}' is not a valid SRT file", file.display());
    }
    Ok(())
}

/// Resolves both tools and prints where they came from.
async fn resolve_tools(config_path: &Path, force: bool) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let provisioner = ToolProvisioner::new(config.tools.clone(), Arc::new(ToolCache::new()));
    let mode = if force {
        Verification::Force
    } else {
        Verification::Cached
    };

    for kind in ToolKind::ALL {
        let handle = provisioner.resolve_with(kind, mode).await?;
        println!(
            "{:<8} {} ({}) {}",
            kind,
            handle.path.display(),
            handle.source,
            handle.version
        );
    }
    Ok(())
}

/// Validates the configuration file and reports any issues.
fn validate_config(config_path: &Path) -> Result<()> {
    let config = config::loader::load_or_default(config_path)?;
    let result = validation::validate_config(&config);

    println!("{}", validation::report::format_report(&result));
    if !result.is_valid() {
        anyhow::bail!(error::ConfigError::ValidationFailed {
            error_count: result.error_count()
        });
    }
    Ok(())
}

/// Displays the effective configuration.
fn show_config(config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let yaml = serde_yaml::to_string(&config)?;
    println!("{}", yaml);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn log_file_is_created_with_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("pipeline.log");

        let mut appender = log_file_appender(&path).unwrap();
        appender.write_all(b"first line\n").unwrap();
        appender.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first line\n");
    }

    #[test]
    fn output_parent_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("subs").join("nested").join("movie_eng.srt");

        ensure_parent_dir(&output).unwrap();
        assert!(output.parent().unwrap().is_dir());
        ensure_parent_dir(Path::new("movie_eng.srt")).unwrap();
    }

    #[test]
    fn log_file_must_name_a_file() {
        assert!(log_file_appender(Path::new("/")).is_err());
    }
}
