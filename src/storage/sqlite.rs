//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ReplayStore trait.

use crate::api::{player_key, ReplaySummary};
use crate::storage::schema::apply_migrations;
use crate::storage::traits::{ReplayStore, StorageError, StorageResult};
use crate::storage::{
    now_unix, Job, JobSpec, JobStatus, LogEntry, LogLevel, MissingLogFilter, ReplayQuery,
    ReplayStats, StoredReplay,
};
use rusqlite::types::Value;
use rusqlite::{ffi, params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

const REPLAY_COLUMNS: &str = "id, format_id, p1_name, p2_name, p1_id, p2_id, rating, \
     upload_time, views, log_fetched, log_size, scraped_at";

const JOB_COLUMNS: &str = "id, job_name, format_id, user_filter, min_elo, max_elo, \
     last_timestamp, status, total_fetched, total_stored, started_at, updated_at, config_hash";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path` and migrates it
    ///
    /// Missing parent directories are created.
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        let version = apply_migrations(&mut conn)?;
        tracing::debug!("Database {} at schema version {}", path.display(), version);

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let mut conn = Connection::open_in_memory()?;
        apply_migrations(&mut conn)?;
        Ok(Self { conn })
    }
}

/// Maps a row selected with [`REPLAY_COLUMNS`]
fn replay_from_row(row: &Row<'_>) -> rusqlite::Result<StoredReplay> {
    Ok(StoredReplay {
        summary: ReplaySummary {
            id: row.get(0)?,
            format_id: row.get(1)?,
            p1_name: row.get(2)?,
            p2_name: row.get(3)?,
            p1_id: row.get(4)?,
            p2_id: row.get(5)?,
            rating: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
            upload_time: row.get(7)?,
            views: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
        },
        log_fetched: row.get::<_, Option<bool>>(9)?.unwrap_or(false),
        log_size: row.get::<_, Option<i64>>(10)?.unwrap_or(0).max(0) as u64,
        scraped_at: row.get(11)?,
    })
}

/// Maps a row selected with [`JOB_COLUMNS`]
fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        format_id: row.get(2)?,
        user_filter: row.get(3)?,
        min_elo: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        max_elo: row.get(5)?,
        last_timestamp: row.get(6)?,
        status: row
            .get::<_, Option<String>>(7)?
            .and_then(|s| JobStatus::from_db_string(&s))
            .unwrap_or(JobStatus::Idle),
        total_fetched: row.get::<_, Option<i64>>(8)?.unwrap_or(0).max(0) as u64,
        total_stored: row.get::<_, Option<i64>>(9)?.unwrap_or(0).max(0) as u64,
        started_at: row.get(10)?,
        updated_at: row.get(11)?,
        config_hash: row.get(12)?,
    })
}

fn log_entry_from_row(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        job_name: row.get(0)?,
        timestamp: row.get(1)?,
        level: LogLevel::from_db_string(&row.get::<_, String>(2)?).unwrap_or(LogLevel::Info),
        message: row.get(3)?,
    })
}

/// Whether an error is a uniqueness/primary key violation
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl ReplayStore for SqliteStorage {
    // ===== Replays =====

    fn insert_replay(&mut self, replay: &StoredReplay) -> StorageResult<bool> {
        let s = &replay.summary;
        let result = self.conn.execute(
            &format!(
                "INSERT INTO replays ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                REPLAY_COLUMNS
            ),
            params![
                s.id,
                s.format_id,
                s.p1_name,
                s.p2_name,
                s.p1_id,
                s.p2_id,
                s.rating,
                s.upload_time,
                s.views,
                replay.log_fetched,
                replay.log_size as i64,
                replay.scraped_at,
            ],
        );

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => {
                tracing::trace!("Replay {} already stored", s.id);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get_replay(&self, id: &str) -> StorageResult<Option<StoredReplay>> {
        let replay = self
            .conn
            .query_row(
                &format!("SELECT {} FROM replays WHERE id = ?1", REPLAY_COLUMNS),
                params![id],
                replay_from_row,
            )
            .optional()?;
        Ok(replay)
    }

    fn replays_without_logs(
        &self,
        limit: u32,
        filter: &MissingLogFilter,
    ) -> StorageResult<Vec<StoredReplay>> {
        let mut conditions = vec!["log_fetched = 0".to_string()];
        let mut values: Vec<Value> = Vec::new();

        if let Some(format_id) = &filter.format_id {
            conditions.push(format!("format_id = ?{}", values.len() + 1));
            values.push(Value::Text(format_id.clone()));
        }
        if let Some(min_elo) = filter.min_elo {
            conditions.push(format!("rating >= ?{}", values.len() + 1));
            values.push(Value::Integer(min_elo));
        }
        if let Some(max_elo) = filter.max_elo {
            conditions.push(format!("rating <= ?{}", values.len() + 1));
            values.push(Value::Integer(max_elo));
        }
        values.push(Value::Integer(i64::from(limit)));

        let sql = format!(
            "SELECT {} FROM replays WHERE {} ORDER BY upload_time DESC LIMIT ?{}",
            REPLAY_COLUMNS,
            conditions.join(" AND "),
            values.len()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let replays = stmt
            .query_map(params_from_iter(values.iter()), replay_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(replays)
    }

    fn mark_log_fetched(&mut self, id: &str, log_size: u64) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "UPDATE replays SET log_fetched = 1, log_size = ?1 WHERE id = ?2",
            params![log_size as i64, id],
        )?;
        Ok(changed > 0)
    }

    fn replays_missing_log_size(&self) -> StorageResult<Vec<StoredReplay>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM replays WHERE log_fetched = 1 AND (log_size = 0 OR log_size IS NULL)",
            REPLAY_COLUMNS
        ))?;
        let replays = stmt
            .query_map([], replay_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(replays)
    }

    fn set_log_size(&mut self, id: &str, log_size: u64) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE replays SET log_size = ?1 WHERE id = ?2",
            params![log_size as i64, id],
        )?;
        Ok(())
    }

    fn reset_log_fetched(&mut self, id: &str) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE replays SET log_fetched = 0, log_size = 0 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    fn query_replays(&self, query: &ReplayQuery) -> StorageResult<Vec<StoredReplay>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(format_id) = &query.format_id {
            values.push(Value::Text(format_id.clone()));
            conditions.push(format!("format_id = ?{}", values.len()));
        }
        if let Some(min_elo) = query.min_elo {
            values.push(Value::Integer(min_elo));
            conditions.push(format!("rating >= ?{}", values.len()));
        }
        if let Some(max_elo) = query.max_elo {
            values.push(Value::Integer(max_elo));
            conditions.push(format!("rating <= ?{}", values.len()));
        }
        if let Some(player) = &query.player {
            values.push(Value::Text(player_key(player)));
            let n = values.len();
            conditions.push(format!("(p1_id = ?{} OR p2_id = ?{})", n, n));
        }
        if query.with_logs_only {
            conditions.push("log_fetched = 1".to_string());
        }

        let where_clause = if conditions.is_empty() {
            "1=1".to_string()
        } else {
            conditions.join(" AND ")
        };

        values.push(Value::Integer(i64::from(query.limit)));
        values.push(Value::Integer(i64::from(query.offset)));
        let sql = format!(
            "SELECT {} FROM replays WHERE {} ORDER BY upload_time DESC, id DESC LIMIT ?{} OFFSET ?{}",
            REPLAY_COLUMNS,
            where_clause,
            values.len() - 1,
            values.len()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let replays = stmt
            .query_map(params_from_iter(values.iter()), replay_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(replays)
    }

    fn replay_stats(&self) -> StorageResult<ReplayStats> {
        let (total, with_logs, formats, total_log_size): (i64, i64, i64, i64) =
            self.conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN log_fetched = 1 THEN 1 ELSE 0 END), 0),
                        COUNT(DISTINCT format_id),
                        COALESCE(SUM(log_size), 0)
                 FROM replays",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        Ok(ReplayStats {
            total_replays: total as u64,
            with_logs: with_logs as u64,
            without_logs: (total - with_logs) as u64,
            formats: formats as u64,
            total_log_size_bytes: total_log_size as u64,
        })
    }

    // ===== Jobs =====

    fn create_job(&mut self, spec: &JobSpec) -> StorageResult<Job> {
        let now = now_unix();
        let result = self.conn.execute(
            "INSERT INTO scraper_state (job_name, format_id, user_filter, min_elo, max_elo,
             status, total_fetched, total_stored, started_at, updated_at, config_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7, ?7, ?8)",
            params![
                spec.name,
                spec.format_id,
                spec.user_filter,
                spec.min_elo,
                spec.max_elo,
                JobStatus::Idle.to_db_string(),
                now,
                spec.config_hash,
            ],
        );

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StorageError::JobAlreadyExists(spec.name.clone()))
            }
            Err(e) => return Err(e.into()),
        }

        self.get_job(&spec.name)?
            .ok_or_else(|| StorageError::JobNotFound(spec.name.clone()))
    }

    fn get_job(&self, name: &str) -> StorageResult<Option<Job>> {
        let job = self
            .conn
            .query_row(
                &format!("SELECT {} FROM scraper_state WHERE job_name = ?1", JOB_COLUMNS),
                params![name],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn list_jobs(&self) -> StorageResult<Vec<Job>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM scraper_state ORDER BY updated_at DESC, id DESC",
            JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map([], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn update_job(&mut self, job: &Job) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "UPDATE scraper_state SET
                format_id = ?1,
                user_filter = ?2,
                min_elo = ?3,
                max_elo = ?4,
                last_timestamp = ?5,
                status = ?6,
                total_fetched = ?7,
                total_stored = ?8,
                updated_at = ?9
             WHERE job_name = ?10",
            params![
                job.format_id,
                job.user_filter,
                job.min_elo,
                job.max_elo,
                job.last_timestamp,
                job.status.to_db_string(),
                job.total_fetched as i64,
                job.total_stored as i64,
                now_unix(),
                job.name,
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_job(&mut self, name: &str) -> StorageResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM scraper_state WHERE job_name = ?1", params![name])?;
        Ok(changed > 0)
    }

    fn set_job_status(&mut self, name: &str, status: JobStatus) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "UPDATE scraper_state SET status = ?1, updated_at = ?2 WHERE job_name = ?3",
            params![status.to_db_string(), now_unix(), name],
        )?;
        Ok(changed > 0)
    }

    // ===== Audit log =====

    fn append_log(&mut self, entry: &LogEntry) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO scrape_log (job_name, timestamp, level, message) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.job_name,
                entry.timestamp,
                entry.level.to_db_string(),
                entry.message
            ],
        )?;
        Ok(())
    }

    fn recent_logs(&self, job_name: Option<&str>, limit: u32) -> StorageResult<Vec<LogEntry>> {
        let entries = match job_name {
            Some(name) => {
                let mut stmt = self.conn.prepare(
                    "SELECT job_name, timestamp, level, message FROM scrape_log
                     WHERE job_name = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![name, limit], log_entry_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT job_name, timestamp, level, message FROM scrape_log
                     ORDER BY timestamp DESC, id DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit], log_entry_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(entries)
    }
}
