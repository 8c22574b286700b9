//! Output module for reports and exports
//!
//! This module handles:
//! - Rendering job status, replay listings and audit entries as text
//! - Loading and formatting database and archive statistics
//! - Exporting replay metadata and logs to plain files

mod export;
pub mod stats;
mod status;

pub use export::{export_replays, write_replays_json, ExportOptions, ExportReport};
pub use stats::{format_statistics, load_statistics, print_statistics, HarvestStatistics};
pub use status::{format_job, format_log_entry, format_relative_time, format_replay};

use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
