//! Batch runs over a directory of videos.

pub mod job;
pub mod scan;
pub mod worker;

pub use job::{BatchItem, BatchSummary, ItemStatus};
pub use scan::InputScanner;
pub use worker::{
    subtitle_path, BatchOptions, BatchPhase, BatchProgress, BatchWorker, CancellationFlag,
};
