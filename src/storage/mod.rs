//! Storage module for persisting harvested data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and versioned migrations
//! - Replay metadata persistence with id-based deduplication
//! - Job rows carrying the pagination cursor and counters
//! - The append-only audit log

mod schema;
mod sqlite;
mod traits;

pub use schema::{apply_migrations, current_version, latest_version, Migration, MIGRATIONS};
pub use sqlite::SqliteStorage;
pub use traits::{lock_store, ReplayStore, SharedStore, StorageError, StorageResult};

use crate::api::ReplaySummary;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Current wall-clock time as Unix seconds
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// A replay as persisted: the search summary plus archival state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReplay {
    #[serde(flatten)]
    pub summary: ReplaySummary,
    pub log_fetched: bool,
    /// Compressed size of the archived log in bytes
    pub log_size: u64,
    pub scraped_at: i64,
}

impl StoredReplay {
    /// Wraps a freshly fetched summary; no log yet
    pub fn from_summary(summary: ReplaySummary, scraped_at: i64) -> Self {
        Self {
            summary,
            log_fetched: false,
            log_size: 0,
            scraped_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.summary.id
    }

    pub fn format_id(&self) -> &str {
        &self.summary.format_id
    }
}

/// Status of a scraping job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Idle,
    Running,
    Paused,
    Completed,
}

impl JobStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Parameters for creating a job
#[derive(Debug, Clone, Default)]
pub struct JobSpec {
    pub name: String,
    pub format_id: Option<String>,
    pub user_filter: Option<String>,
    pub min_elo: i64,
    pub max_elo: Option<i64>,
    pub config_hash: Option<String>,
}

/// A named scraping job with its scope and resumption state
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub format_id: Option<String>,
    pub user_filter: Option<String>,
    pub min_elo: i64,
    pub max_elo: Option<i64>,
    /// Upload time of the oldest replay in the last non-empty batch
    pub last_timestamp: Option<i64>,
    pub status: JobStatus,
    pub total_fetched: u64,
    pub total_stored: u64,
    pub started_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub config_hash: Option<String>,
}

impl Job {
    /// Whether a rating falls inside this job's ELO band
    pub fn is_elo_eligible(&self, rating: i64) -> bool {
        rating >= self.min_elo && self.max_elo.map_or(true, |max| rating <= max)
    }

    /// Human-readable description of the ELO band
    pub fn elo_band(&self) -> String {
        match self.max_elo {
            Some(max) => format!(">= {}, <= {}", self.min_elo, max),
            None => format!(">= {}", self.min_elo),
        }
    }
}

/// Severity of an audit log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Append-only audit record
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub job_name: String,
    pub timestamp: i64,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(job_name: &str, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            job_name: job_name.to_string(),
            timestamp: now_unix(),
            level,
            message: message.into(),
        }
    }

    pub fn info(job_name: &str, message: impl Into<String>) -> Self {
        Self::new(job_name, LogLevel::Info, message)
    }

    pub fn warning(job_name: &str, message: impl Into<String>) -> Self {
        Self::new(job_name, LogLevel::Warning, message)
    }

    pub fn error(job_name: &str, message: impl Into<String>) -> Self {
        Self::new(job_name, LogLevel::Error, message)
    }
}

/// Filter applied when selecting backfill candidates
#[derive(Debug, Clone, Default)]
pub struct MissingLogFilter {
    pub min_elo: Option<i64>,
    pub max_elo: Option<i64>,
    pub format_id: Option<String>,
}

/// Filter for browsing stored replays
#[derive(Debug, Clone)]
pub struct ReplayQuery {
    pub format_id: Option<String>,
    pub min_elo: Option<i64>,
    pub max_elo: Option<i64>,
    /// Player name; matched against either side's normalized key
    pub player: Option<String>,
    pub with_logs_only: bool,
    pub limit: u32,
    pub offset: u32,
}

impl Default for ReplayQuery {
    fn default() -> Self {
        Self {
            format_id: None,
            min_elo: None,
            max_elo: None,
            player: None,
            with_logs_only: false,
            limit: 100,
            offset: 0,
        }
    }
}

/// Aggregate counts over the replay table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayStats {
    pub total_replays: u64,
    pub with_logs: u64,
    pub without_logs: u64,
    pub formats: u64,
    pub total_log_size_bytes: u64,
}
