//! Replay-Harvester: an incremental battle-replay collector
//!
//! This crate pages through a remote replay search service, stores replay
//! metadata in SQLite, archives compressed battle logs on disk, and keeps
//! long-running collection jobs pausable and resumable across restarts.

pub mod api;
pub mod archive;
pub mod config;
pub mod output;
pub mod scraper;
pub mod storage;

use thiserror::Error;

/// Main error type for Replay-Harvester operations
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Remote service error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Job '{0}' not found")]
    JobNotFound(String),

    #[error("Job '{0}' already exists")]
    JobAlreadyExists(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors from the remote replay service
///
/// These are only surfaced once the client's own retry budget is spent.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid JSON response from {url}: {message}")]
    InvalidJson { url: String, message: String },

    #[error("Request to {url} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    #[error("Invalid request URL: {0}")]
    InvalidUrl(#[from] ::url::ParseError),
}

/// Result type alias for Replay-Harvester operations
pub type Result<T> = std::result::Result<T, ScraperError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for remote operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

// Re-export commonly used types
pub use api::{ReplaySource, ReplaySummary, ShowdownClient};
pub use archive::LogArchive;
pub use config::Config;
pub use scraper::{JobRunner, LogBackfill, ProgressSink, RunOptions, RunOutcome};
pub use storage::{Job, JobStatus, ReplayStore, SqliteStorage, StoredReplay};
