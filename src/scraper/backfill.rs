//! Log backfill engine
//!
//! Fills in battle logs for replays whose metadata is stored but whose log
//! was never archived. There is no persisted cursor: every batch simply asks
//! the store for the newest rows still flagged as missing a log.
//!
//! A replay whose fetch fails is not retried within the same sweep. In
//! unbounded mode a sweep ends when no untried candidates remain; the engine
//! then sleeps for the idle backoff and starts a new sweep, so replays that
//! failed earlier get another chance.

use crate::api::ReplaySource;
use crate::archive::LogArchive;
use crate::scraper::progress::{format_percentage, ProgressSink};
use crate::storage::{lock_store, LogEntry, MissingLogFilter, SharedStore, StoredReplay};
use crate::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Audit log name used for backfill entries
pub const BACKFILL_JOB_NAME: &str = "fetch-logs";

/// Fetches missing logs for already-stored replays
pub struct LogBackfill {
    source: Arc<dyn ReplaySource>,
    store: SharedStore,
    archive: LogArchive,
    progress: ProgressSink,
    batch_size: u32,
    idle_backoff: Duration,
}

impl LogBackfill {
    pub fn new(source: Arc<dyn ReplaySource>, store: SharedStore, archive: LogArchive) -> Self {
        Self {
            source,
            store,
            archive,
            progress: ProgressSink::console(),
            batch_size: 10,
            idle_backoff: Duration::from_secs(10),
        }
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sleep between polls when nothing is left to fetch (unbounded mode only)
    pub fn with_idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    /// Runs the backfill
    ///
    /// # Arguments
    ///
    /// * `limit` - Stop after this many successful fetches. `None` (or
    ///   `Some(0)`) runs until cancelled, polling while no candidates exist.
    /// * `filter` - Restricts candidates by rating band and format
    /// * `cancel` - Checked before each batch and after each fetch
    ///
    /// # Returns
    ///
    /// The number of logs fetched and archived.
    pub async fn run(
        &self,
        limit: Option<u64>,
        filter: &MissingLogFilter,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let limit = limit.filter(|l| *l > 0);

        let pending = lock_store(&self.store)?.replay_stats()?.without_logs;
        if pending == 0 && limit.is_some() {
            self.progress.emit("No replays need logs");
            return Ok(0);
        }

        let target = limit.map_or(pending, |l| l.min(pending));
        match limit {
            Some(l) => self.progress.emit(format!(
                "Fetching logs: {} replays need logs, limit {}",
                pending, l
            )),
            None => self
                .progress
                .emit(format!("Fetching logs: {} replays need logs", pending)),
        }

        let mut fetched = 0u64;
        let mut failed: HashSet<String> = HashSet::new();

        loop {
            if cancel.is_cancelled() {
                self.progress.emit("Interrupted");
                break;
            }

            let wanted = match limit {
                Some(l) if fetched >= l => break,
                Some(l) => (l - fetched).min(u64::from(self.batch_size)) as u32,
                None => self.batch_size,
            };

            let candidates = self.next_candidates(wanted, filter, &failed)?;

            if candidates.is_empty() {
                if limit.is_some() {
                    break;
                }

                self.progress.emit("No replays need logs, waiting...");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.progress.emit("Interrupted");
                        break;
                    }
                    _ = tokio::time::sleep(self.idle_backoff) => {}
                }
                failed.clear();
                continue;
            }

            for replay in candidates {
                if cancel.is_cancelled() {
                    break;
                }

                if self.fetch_one(&replay).await? {
                    fetched += 1;
                } else {
                    failed.insert(replay.summary.id);
                }

                if limit.map_or(false, |l| fetched >= l) {
                    break;
                }
            }

            match limit {
                Some(_) => self.progress.emit(format!(
                    "Progress: {}/{} ({})",
                    fetched,
                    target,
                    format_percentage(fetched, target)
                )),
                None => self.progress.emit(format!("Progress: {} fetched", fetched)),
            }
        }

        tracing::info!("Backfill fetched {} logs", fetched);
        self.progress.emit(format!("Fetched {} logs", fetched));
        Ok(fetched)
    }

    /// Up to `wanted` candidates, skipping ids that already failed this sweep
    fn next_candidates(
        &self,
        wanted: u32,
        filter: &MissingLogFilter,
        failed: &HashSet<String>,
    ) -> Result<Vec<StoredReplay>> {
        let query_size = wanted.saturating_add(failed.len() as u32);
        let rows = lock_store(&self.store)?.replays_without_logs(query_size, filter)?;

        Ok(rows
            .into_iter()
            .filter(|r| !failed.contains(r.id()))
            .take(wanted as usize)
            .collect())
    }

    /// Fetches one log; returns whether it was archived
    ///
    /// Remote failures and missing logs are recorded as warnings and reported
    /// as `false`. Archive and store failures are returned as errors.
    async fn fetch_one(&self, replay: &StoredReplay) -> Result<bool> {
        let id = replay.id();

        let message = match self.source.fetch_log(id).await {
            Ok(Some(log)) => {
                let (_, size) = self.archive.save(id, replay.format_id(), &log)?;
                lock_store(&self.store)?.mark_log_fetched(id, size)?;
                tracing::debug!("Archived log for {} ({} bytes)", id, size);
                return Ok(true);
            }
            Ok(None) => format!("No log available for {}", id),
            Err(e) => format!("Failed to fetch log for {}: {}", id, e),
        };

        tracing::warn!("{}", message);
        lock_store(&self.store)?.append_log(&LogEntry::warning(BACKFILL_JOB_NAME, message))?;
        Ok(false)
    }
}
