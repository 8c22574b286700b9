//! Harvesting engines
//!
//! This module contains:
//! - `JobRunner`, which pages a job backwards through search results
//! - `LogBackfill`, which fills in missing logs for stored replays
//! - Progress reporting shared by both
//! - Log-size repair and default job naming

mod backfill;
mod job_runner;
mod naming;
mod progress;
mod repair;

#[cfg(test)]
pub(crate) mod testing;

pub use backfill::{LogBackfill, BACKFILL_JOB_NAME};
pub use job_runner::{JobRunner, RunOptions, RunOutcome};
pub use naming::{generate_job_name, sanitize_job_name};
pub use progress::{
    format_number, format_percentage, format_timestamp, BatchProgress, ProgressSink,
};
pub use repair::{repair_log_sizes, RepairReport};
