//! Log-size repair
//!
//! Rows written before log sizes were tracked claim a fetched log but record
//! a size of zero. Repair stats the archive for each of them: a present file
//! gets its size recorded, a missing file puts the row back in the backfill
//! queue.

use crate::archive::LogArchive;
use crate::storage::{lock_store, SharedStore};
use crate::Result;

/// Outcome of a repair pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub checked: u64,
    /// Rows whose size was filled in from the archive
    pub updated: u64,
    /// Rows reset to "log missing" because the file is gone
    pub missing: u64,
}

pub fn repair_log_sizes(store: &SharedStore, archive: &LogArchive) -> Result<RepairReport> {
    let mut store = lock_store(store)?;
    let rows = store.replays_missing_log_size()?;

    let mut report = RepairReport {
        checked: rows.len() as u64,
        ..Default::default()
    };

    for replay in &rows {
        match archive.size(replay.id(), replay.format_id())? {
            Some(size) => {
                store.set_log_size(replay.id(), size)?;
                report.updated += 1;
            }
            None => {
                tracing::debug!("Archived log for {} is missing", replay.id());
                store.reset_log_fetched(replay.id())?;
                report.missing += 1;
            }
        }
    }

    tracing::info!(
        "Log size repair: {} checked, {} updated, {} missing",
        report.checked,
        report.updated,
        report.missing
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::{memory_store, summary};
    use crate::storage::{MissingLogFilter, StoredReplay};
    use tempfile::TempDir;

    fn fetched_without_size(n: u32) -> StoredReplay {
        let mut replay = StoredReplay::from_summary(summary(n, 1500, 1_700_000_000), 0);
        replay.log_fetched = true;
        replay
    }

    #[test]
    fn test_repair_fills_sizes_and_resets_missing() {
        let store = memory_store();
        let logs = TempDir::new().unwrap();
        let archive = LogArchive::new(logs.path());

        {
            let mut s = lock_store(&store).unwrap();
            s.insert_replay(&fetched_without_size(1)).unwrap();
            s.insert_replay(&fetched_without_size(2)).unwrap();
        }
        let (_, size) = archive.save("gen9ou-1", "gen9ou", "|win|Ash").unwrap();

        let report = repair_log_sizes(&store, &archive).unwrap();
        assert_eq!(
            report,
            RepairReport {
                checked: 2,
                updated: 1,
                missing: 1
            }
        );

        let s = lock_store(&store).unwrap();
        assert_eq!(s.get_replay("gen9ou-1").unwrap().unwrap().log_size, size);
        let pending = s
            .replays_without_logs(10, &MissingLogFilter::default())
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id(), "gen9ou-2");
    }

    #[test]
    fn test_repair_nothing_to_do() {
        let store = memory_store();
        let logs = TempDir::new().unwrap();
        let report = repair_log_sizes(&store, &LogArchive::new(logs.path())).unwrap();
        assert_eq!(report, RepairReport::default());
    }
}
