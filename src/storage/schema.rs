//! Database schema definitions and migrations
//!
//! The schema is an ordered list of upgrade steps. Each step runs in its own
//! transaction together with the bump of the recorded schema version, and only
//! steps newer than the recorded version are applied. A failing step is fatal.

use crate::storage::traits::{StorageError, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};

/// A single schema upgrade step
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in application order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "replays, jobs and audit log",
        sql: r#"
-- Replay metadata; the primary key is the dedup mechanism
CREATE TABLE replays (
    id TEXT PRIMARY KEY,
    format_id TEXT NOT NULL,
    p1_name TEXT NOT NULL,
    p2_name TEXT NOT NULL,
    p1_id TEXT NOT NULL,
    p2_id TEXT NOT NULL,
    rating INTEGER NOT NULL DEFAULT 0,
    upload_time INTEGER NOT NULL,
    views INTEGER NOT NULL DEFAULT 0,
    log_fetched INTEGER NOT NULL DEFAULT 0,
    scraped_at INTEGER NOT NULL
);

CREATE INDEX idx_replays_format ON replays(format_id);
CREATE INDEX idx_replays_rating ON replays(rating);
CREATE INDEX idx_replays_upload_time ON replays(upload_time);
CREATE INDEX idx_replays_players ON replays(p1_id, p2_id);

-- Scraping jobs with their pagination cursor
CREATE TABLE scraper_state (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_name TEXT NOT NULL UNIQUE,
    format_id TEXT,
    user_filter TEXT,
    min_elo INTEGER NOT NULL DEFAULT 0,
    max_elo INTEGER,
    last_timestamp INTEGER,
    status TEXT NOT NULL DEFAULT 'idle',
    total_fetched INTEGER NOT NULL DEFAULT 0,
    total_stored INTEGER NOT NULL DEFAULT 0,
    started_at INTEGER,
    updated_at INTEGER
);

-- Append-only audit log
CREATE TABLE scrape_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_name TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    level TEXT NOT NULL,
    message TEXT NOT NULL
);

CREATE INDEX idx_scrape_log_job ON scrape_log(job_name);
CREATE INDEX idx_scrape_log_timestamp ON scrape_log(timestamp);
"#,
    },
    Migration {
        version: 2,
        description: "compressed log size",
        sql: "ALTER TABLE replays ADD COLUMN log_size INTEGER NOT NULL DEFAULT 0;",
    },
    Migration {
        version: 3,
        description: "job config hash and backfill index",
        sql: r#"
ALTER TABLE scraper_state ADD COLUMN config_hash TEXT;
CREATE INDEX idx_replays_log_fetched ON replays(log_fetched);
"#,
    },
];

/// The schema version a fully migrated database reports
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Reads the recorded schema version (0 for a fresh database)
pub fn current_version(conn: &Connection) -> StorageResult<u32> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

/// Applies every migration newer than the recorded version
///
/// # Returns
///
/// The schema version after migrating
pub fn apply_migrations(conn: &mut Connection) -> StorageResult<u32> {
    let start = current_version(conn)?;
    let mut version = start;

    for migration in MIGRATIONS.iter().filter(|m| m.version > start) {
        tracing::debug!(
            "Applying schema migration {} ({})",
            migration.version,
            migration.description
        );

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| StorageError::Migration {
                version: migration.version,
                message: e.to_string(),
            })?;
        tx.execute("DELETE FROM schema_version", [])?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![migration.version],
        )?;
        tx.commit()?;

        version = migration.version;
    }

    Ok(version)
}
