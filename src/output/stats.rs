//! Statistics from the replay database and log archive
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer and the archive directory.

use crate::archive::{ArchiveStats, LogArchive};
use crate::output::OutputResult;
use crate::scraper::{format_number, format_percentage};
use crate::storage::{ReplayStats, ReplayStore};
use std::fmt::Write;

/// Harvest statistics summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestStatistics {
    /// Counts over stored replay metadata
    pub replays: ReplayStats,

    /// Files and bytes actually present in the archive
    pub archive: ArchiveStats,
}

/// Loads statistics from storage and the archive
///
/// # Arguments
///
/// * `store` - The storage backend to query
/// * `archive` - The log archive to walk
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(OutputError)` - Failed to query the store or read the archive
pub fn load_statistics(
    store: &dyn ReplayStore,
    archive: &LogArchive,
) -> OutputResult<HarvestStatistics> {
    let replays = store.replay_stats()?;
    let archive = archive.stats()?;
    Ok(HarvestStatistics { replays, archive })
}

/// Formats statistics as the plain-text block shown by `status`
pub fn format_statistics(stats: &HarvestStatistics) -> String {
    let r = &stats.replays;
    let mut out = String::new();

    let _ = writeln!(out, "Database:");
    let _ = writeln!(out, "  Total replays: {}", format_number(r.total_replays));
    let _ = writeln!(
        out,
        "  With logs: {} ({})",
        format_number(r.with_logs),
        format_percentage(r.with_logs, r.total_replays)
    );
    let _ = writeln!(out, "  Without logs: {}", format_number(r.without_logs));
    let _ = writeln!(out, "  Formats: {}", r.formats);

    if stats.archive.total_files > 0 {
        let _ = writeln!(out);
        let _ = writeln!(out, "Log Storage:");
        let _ = writeln!(
            out,
            "  Total log files: {}",
            format_number(stats.archive.total_files)
        );
        let _ = writeln!(
            out,
            "  Total size: {:.1} MB (compressed)",
            stats.archive.total_bytes as f64 / (1024.0 * 1024.0)
        );
        for (format_id, format_stats) in &stats.archive.formats {
            let _ = writeln!(
                out,
                "    {}: {} files",
                format_id,
                format_number(format_stats.files)
            );
        }
    }

    out
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &HarvestStatistics) {
    print!("{}", format_statistics(stats));
}
