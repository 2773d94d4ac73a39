//! Configuration loading and validation.

pub mod loader;
pub mod model;

pub use model::{AppConfig, BatchConfig, ExtractionConfig, ToolConfig, TranslationConfig};
