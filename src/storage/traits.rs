//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{
    Job, JobSpec, JobStatus, LogEntry, MissingLogFilter, ReplayQuery, ReplayStats, StoredReplay,
};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job '{0}' already exists")]
    JobAlreadyExists(String),

    #[error("Job '{0}' not found")]
    JobNotFound(String),

    #[error("Migration to schema version {version} failed: {message}")]
    Migration { version: u32, message: String },

    #[error("Store lock poisoned")]
    Lock,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A store shared between an engine and whoever drives it
pub type SharedStore = Arc<Mutex<dyn ReplayStore + Send>>;

/// Locks a shared store, mapping a poisoned mutex to [`StorageError::Lock`]
pub fn lock_store(store: &SharedStore) -> StorageResult<MutexGuard<'_, dyn ReplayStore + Send + 'static>> {
    store.lock().map_err(|_| StorageError::Lock)
}

/// Trait for storage backend implementations
///
/// The store is the single source of truth for job status, so engines
/// re-read job rows through it on every iteration instead of caching them.
pub trait ReplayStore {
    // ===== Replays =====

    /// Inserts a replay
    ///
    /// Returns `false` without error when a replay with the same id is
    /// already stored.
    fn insert_replay(&mut self, replay: &StoredReplay) -> StorageResult<bool>;

    /// Gets a replay by id
    fn get_replay(&self, id: &str) -> StorageResult<Option<StoredReplay>>;

    /// Gets up to `limit` replays whose log has not been fetched, newest first
    fn replays_without_logs(
        &self,
        limit: u32,
        filter: &MissingLogFilter,
    ) -> StorageResult<Vec<StoredReplay>>;

    /// Flags a replay's log as archived with the given compressed size
    fn mark_log_fetched(&mut self, id: &str, log_size: u64) -> StorageResult<bool>;

    /// Gets replays flagged as fetched but with no recorded size
    fn replays_missing_log_size(&self) -> StorageResult<Vec<StoredReplay>>;

    /// Records the compressed size of an archived log
    fn set_log_size(&mut self, id: &str, log_size: u64) -> StorageResult<()>;

    /// Clears the fetched flag so the replay becomes a backfill candidate again
    fn reset_log_fetched(&mut self, id: &str) -> StorageResult<()>;

    /// Queries stored replays, newest first
    fn query_replays(&self, query: &ReplayQuery) -> StorageResult<Vec<StoredReplay>>;

    /// Aggregate statistics over stored replays
    fn replay_stats(&self) -> StorageResult<ReplayStats>;

    // ===== Jobs =====

    /// Creates a job in the `idle` state
    ///
    /// Fails with [`StorageError::JobAlreadyExists`] if the name is taken.
    fn create_job(&mut self, spec: &JobSpec) -> StorageResult<Job>;

    /// Gets a job by name
    fn get_job(&self, name: &str) -> StorageResult<Option<Job>>;

    /// Lists all jobs, most recently updated first
    fn list_jobs(&self) -> StorageResult<Vec<Job>>;

    /// Writes a job's scope, cursor, counters and status in one row update
    ///
    /// Returns `false` if the row no longer exists.
    fn update_job(&mut self, job: &Job) -> StorageResult<bool>;

    /// Deletes a job row; harvested replays and logs are untouched
    fn delete_job(&mut self, name: &str) -> StorageResult<bool>;

    /// Sets only the status of a job
    fn set_job_status(&mut self, name: &str, status: JobStatus) -> StorageResult<bool>;

    // ===== Audit log =====

    /// Appends an audit entry
    fn append_log(&mut self, entry: &LogEntry) -> StorageResult<()>;

    /// Gets the most recent audit entries, newest first
    fn recent_logs(&self, job_name: Option<&str>, limit: u32) -> StorageResult<Vec<LogEntry>>;
}
