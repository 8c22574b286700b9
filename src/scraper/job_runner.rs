//! Job cursor engine
//!
//! A job pages backwards through the service's search results using the
//! upload time of the oldest replay it has seen as a `before` cursor. Each
//! loop iteration is one batch:
//!
//! 1. Re-read the job row so pause/delete requests from other processes are seen
//! 2. Search with `before = last_timestamp`; on failure wait and retry the batch
//! 3. Stop as completed on an empty page
//! 4. Fetch logs for replays inside the ELO band (optional), store every replay
//! 5. Move the cursor to the oldest processed replay and persist the job row
//!
//! Cancellation is cooperative: the token is checked at the top of each
//! iteration and after each log fetch. Requests in flight are not aborted.

use crate::api::{ReplaySource, ReplaySummary};
use crate::archive::LogArchive;
use crate::scraper::progress::{format_number, BatchProgress, ProgressSink};
use crate::storage::{
    lock_store, now_unix, Job, JobSpec, JobStatus, LogEntry, SharedStore, StorageError,
    StoredReplay,
};
use crate::{Result, ScraperError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-invocation options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Stop after this many newly stored replays; `None` or `Some(0)` means no limit
    pub limit: Option<u64>,
    /// Fetch and archive logs for replays inside the job's ELO band
    pub fetch_logs: bool,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Search exhausted or the new-record limit was reached
    Completed,
    /// Paused by request or by shutdown
    Paused,
    /// The job row disappeared while running
    Deleted,
    /// A batch failed; the job was parked as paused
    Failed,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Counters local to one invocation
#[derive(Debug, Default)]
struct RunState {
    batches: u64,
    new_records: u64,
}

/// Result of processing one page
#[derive(Debug)]
struct BatchResult {
    fetched: usize,
    matched: usize,
}

/// Drives scraping jobs against a replay source
pub struct JobRunner {
    source: Arc<dyn ReplaySource>,
    store: SharedStore,
    archive: LogArchive,
    progress: ProgressSink,
    retry_delay: Duration,
}

impl JobRunner {
    pub fn new(source: Arc<dyn ReplaySource>, store: SharedStore, archive: LogArchive) -> Self {
        Self {
            source,
            store,
            archive,
            progress: ProgressSink::console(),
            retry_delay: Duration::from_secs(5),
        }
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Delay before retrying a batch whose search failed
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Creates a job in the `idle` state
    ///
    /// # Returns
    ///
    /// * `Ok(Job)` - The new job row
    /// * `Err(ScraperError::JobAlreadyExists)` - A job with this name exists
    pub fn create_job(&self, spec: &JobSpec) -> Result<Job> {
        let mut store = lock_store(&self.store)?;
        match store.create_job(spec) {
            Ok(job) => Ok(job),
            Err(StorageError::JobAlreadyExists(name)) => Err(ScraperError::JobAlreadyExists(name)),
            Err(e) => Err(e.into()),
        }
    }

    /// Runs a job until it completes, is paused or deleted, or fails
    ///
    /// Batch failures other than search errors do not surface as `Err`: they
    /// are written to the audit log and the job is left `paused` so it can be
    /// resumed. `Err` is reserved for an unknown job name and for failures to
    /// record that state.
    pub async fn run_job(
        &self,
        name: &str,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let job = lock_store(&self.store)?.get_job(name)?;
        let mut job = job.ok_or_else(|| ScraperError::JobNotFound(name.to_string()))?;

        job.status = JobStatus::Running;
        {
            let mut store = lock_store(&self.store)?;
            store.update_job(&job)?;
            store.append_log(&LogEntry::info(name, format!("Started job: {}", name)))?;
        }

        tracing::info!("Running job {} from cursor {:?}", name, job.last_timestamp);
        self.progress.emit(format!("Starting job: {}", name));
        self.progress.emit(format!(
            "  Format: {}",
            job.format_id.as_deref().unwrap_or("all")
        ));
        self.progress
            .emit(format!("  ELO filter: {}", job.elo_band()));

        let mut run = RunState::default();
        let outcome = match self.drive(&mut job, options, cancel, &mut run).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Job {} failed: {}", name, e);
                self.progress.emit(format!("Error: {}", e));

                job.status = JobStatus::Paused;
                let mut store = lock_store(&self.store)?;
                store.append_log(&LogEntry::error(name, format!("Unexpected error: {}", e)))?;
                store.update_job(&job)?;
                return Ok(RunOutcome::Failed);
            }
        };

        if outcome == RunOutcome::Deleted {
            return Ok(outcome);
        }

        {
            let mut store = lock_store(&self.store)?;
            store.update_job(&job)?;
            store.append_log(&LogEntry::info(
                name,
                format!(
                    "Job {}: {} fetched, {} stored",
                    job.status, job.total_fetched, job.total_stored
                ),
            ))?;
        }

        tracing::info!(
            "Job {} {} after {} batches ({} new)",
            name,
            job.status,
            run.batches,
            run.new_records
        );
        self.progress.emit(format!("Job {}", job.status));
        self.progress.emit(format!(
            "  Total fetched: {}",
            format_number(job.total_fetched)
        ));
        self.progress
            .emit(format!("  Total stored: {}", format_number(job.total_stored)));

        Ok(outcome)
    }

    /// The batch loop; sets `job.status` for every non-deleted outcome
    async fn drive(
        &self,
        job: &mut Job,
        options: RunOptions,
        cancel: &CancellationToken,
        run: &mut RunState,
    ) -> Result<RunOutcome> {
        let limit = options.limit.filter(|l| *l > 0);

        loop {
            if let Some(limit) = limit {
                if run.new_records >= limit {
                    self.progress
                        .emit(format!("Reached limit of {} new replays", limit));
                    job.status = JobStatus::Completed;
                    return Ok(RunOutcome::Completed);
                }
            }

            if cancel.is_cancelled() {
                self.progress.emit("Shutdown requested, pausing job");
                job.status = JobStatus::Paused;
                return Ok(RunOutcome::Paused);
            }

            let current = lock_store(&self.store)?.get_job(&job.name)?;
            match current {
                None => {
                    self.progress.emit("Job was deleted, stopping");
                    return Ok(RunOutcome::Deleted);
                }
                Some(current) if current.status == JobStatus::Paused => {
                    self.progress.emit("Job paused by user");
                    job.status = JobStatus::Paused;
                    return Ok(RunOutcome::Paused);
                }
                Some(_) => {}
            }

            let search = self
                .source
                .search(
                    job.format_id.as_deref(),
                    job.user_filter.as_deref(),
                    job.last_timestamp,
                )
                .await;

            let page = match search {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!("Search for job {} failed: {}", job.name, e);
                    lock_store(&self.store)?
                        .append_log(&LogEntry::error(&job.name, format!("API error: {}", e)))?;
                    self.progress.emit(format!("API error: {}", e));

                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                    continue;
                }
            };

            if page.is_empty() {
                self.progress.emit("No more replays found");
                job.status = JobStatus::Completed;
                return Ok(RunOutcome::Completed);
            }

            run.batches += 1;
            let batch = self.process_batch(job, &page, options, limit, cancel, run).await?;

            let updated = lock_store(&self.store)?.update_job(job)?;
            if !updated {
                self.progress.emit("Job was deleted, stopping");
                return Ok(RunOutcome::Deleted);
            }

            self.progress.emit(
                BatchProgress {
                    batch: run.batches,
                    fetched: batch.fetched,
                    matched: batch.matched,
                    new_this_run: run.new_records,
                    total_stored: job.total_stored,
                    cursor: job.last_timestamp,
                }
                .to_string(),
            );
        }
    }

    /// Fetches logs for eligible replays, stores the page and moves the cursor
    ///
    /// Replays are handled in page order. Once `limit` new replays have been
    /// stored the rest of the page is left for the next run, except replays
    /// sharing the upload second of the last one handled: `before` is
    /// exclusive, so those could not be reached again from the cursor.
    async fn process_batch(
        &self,
        job: &mut Job,
        page: &[ReplaySummary],
        options: RunOptions,
        limit: Option<u64>,
        cancel: &CancellationToken,
        run: &mut RunState,
    ) -> Result<BatchResult> {
        let mut processed = 0;
        let mut matched = 0;
        let mut fetch_logs = options.fetch_logs;
        let mut cursor = None;

        for summary in page {
            let limit_reached = limit.map_or(false, |limit| run.new_records >= limit);
            if limit_reached && cursor != Some(summary.upload_time) {
                tracing::debug!("Limit reached inside batch at {}", summary.id);
                break;
            }

            processed += 1;
            if job.is_elo_eligible(summary.rating) {
                matched += 1;
            }

            let mut replay = StoredReplay::from_summary(summary.clone(), now_unix());

            if fetch_logs && job.is_elo_eligible(summary.rating) {
                let known = lock_store(&self.store)?.get_replay(&summary.id)?.is_some();
                if !known {
                    self.fetch_log_into(&mut replay).await?;
                }
                if cancel.is_cancelled() {
                    fetch_logs = false;
                }
            }

            let inserted = lock_store(&self.store)?.insert_replay(&replay)?;
            if inserted {
                run.new_records += 1;
                job.total_stored += 1;
            }

            cursor = Some(summary.upload_time);
        }

        if let Some(cursor) = cursor {
            job.last_timestamp = Some(match job.last_timestamp {
                Some(previous) => previous.min(cursor),
                None => cursor,
            });
        }

        job.total_fetched += processed as u64;

        Ok(BatchResult {
            fetched: processed,
            matched,
        })
    }

    /// Fetches and archives one log; remote failures leave the replay for backfill
    async fn fetch_log_into(&self, replay: &mut StoredReplay) -> Result<()> {
        match self.source.fetch_log(replay.id()).await {
            Ok(Some(log)) => {
                let (_, size) = self.archive.save(replay.id(), replay.format_id(), &log)?;
                replay.log_fetched = true;
                replay.log_size = size;
            }
            Ok(None) => tracing::debug!("No log available for {}", replay.id()),
            Err(e) => tracing::debug!("Skipping log for {}: {}", replay.id(), e),
        }
        Ok(())
    }
}
