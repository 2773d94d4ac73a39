//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Extracts English subtitles from video containers and hands them to a
/// translator.
#[derive(Parser, Debug)]
#[command(name = "subtitle-pipeline", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file. Defaults are used when it is missing.
    #[arg(
        short,
        long,
        default_value = "subtitle-pipeline.yaml",
        env = "SUBTITLE_PIPELINE_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Increase logging verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    pub log_format: LogFormat,

    /// Also append plain-text logs to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level based on verbosity flags.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract, verify and translate subtitles for a file or directory.
    Run(RunArgs),

    /// List the subtitle tracks of a video.
    List {
        /// The video file.
        file: PathBuf,

        /// Print the tracks as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Extract subtitles from a single video.
    Extract(ExtractArgs),

    /// Check that a file looks like SRT.
    Verify {
        /// The subtitle file.
        file: PathBuf,
    },

    /// Resolve ffmpeg and ffprobe, downloading them if needed.
    Tools {
        /// Ignore cached handles and re-verify.
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration file.
    #[command(name = "config-validate")]
    ConfigValidate,

    /// Display the effective configuration.
    #[command(name = "config-show")]
    ConfigShow,
}

/// Arguments for the run subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// A video file or a directory of videos.
    pub path: PathBuf,

    /// Write subtitles here instead of next to each video.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Descend into subdirectories.
    #[arg(short, long)]
    pub recursive: bool,

    /// Preferred subtitle language, in order (repeatable).
    #[arg(long = "lang")]
    pub languages: Vec<String>,

    /// Write a JSON summary of the run to this file.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Skip translation even when a translator is configured.
    #[arg(long)]
    pub no_translate: bool,
}

/// Arguments for the extract subcommand.
#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// The video file.
    pub file: PathBuf,

    /// Output file, or output directory with --all.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Subtitle track ordinal to extract, skipping selection.
    #[arg(long, conflicts_with = "all")]
    pub track: Option<usize>,

    /// Preferred subtitle language, in order (repeatable).
    #[arg(long = "lang")]
    pub languages: Vec<String>,

    /// Extract every subtitle track to its own file.
    #[arg(long)]
    pub all: bool,
}
