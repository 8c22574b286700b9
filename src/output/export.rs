//! Export of stored replays to plain files
//!
//! An export directory holds `metadata.json` (a pretty-printed array of
//! replay records) and `logs/{id}.log` with the decompressed log of every
//! exported replay that has one.

use crate::archive::LogArchive;
use crate::output::OutputResult;
use crate::storage::{ReplayQuery, ReplayStore, StoredReplay};
use std::fs;
use std::path::{Path, PathBuf};

const EXPORT_PAGE_SIZE: u32 = 1000;

/// Which replays to export
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub format_id: Option<String>,
    pub with_logs_only: bool,
}

/// What an export wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub replays: usize,
    pub logs: usize,
    pub metadata_path: PathBuf,
    pub logs_dir: PathBuf,
}

/// Writes replays as a pretty-printed JSON array
pub fn write_replays_json(path: &Path, replays: &[StoredReplay]) -> OutputResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(replays)?;
    fs::write(path, json)?;
    Ok(())
}

/// Exports matching replays and their logs into `output_dir`
///
/// # Returns
///
/// * `Ok(Some(ExportReport))` - Files were written
/// * `Ok(None)` - Nothing matched; no files were written
/// * `Err(OutputError)` - Failed to query or write
pub fn export_replays(
    store: &dyn ReplayStore,
    archive: &LogArchive,
    output_dir: &Path,
    options: &ExportOptions,
) -> OutputResult<Option<ExportReport>> {
    let mut replays = Vec::new();
    let mut query = ReplayQuery {
        format_id: options.format_id.clone(),
        with_logs_only: options.with_logs_only,
        limit: EXPORT_PAGE_SIZE,
        ..Default::default()
    };

    loop {
        let page = store.query_replays(&query)?;
        let done = page.len() < EXPORT_PAGE_SIZE as usize;
        replays.extend(page);
        if done {
            break;
        }
        query.offset += EXPORT_PAGE_SIZE;
    }

    if replays.is_empty() {
        return Ok(None);
    }

    let metadata_path = output_dir.join("metadata.json");
    write_replays_json(&metadata_path, &replays)?;

    let logs_dir = output_dir.join("logs");
    fs::create_dir_all(&logs_dir)?;

    let mut logs = 0;
    for replay in replays.iter().filter(|r| r.log_fetched) {
        match archive.load(replay.id(), replay.format_id())? {
            Some(content) => {
                fs::write(logs_dir.join(format!("{}.log", replay.id())), content)?;
                logs += 1;
            }
            None => tracing::warn!("Log for {} is flagged but not archived", replay.id()),
        }
    }

    tracing::info!(
        "Exported {} replays and {} logs to {}",
        replays.len(),
        logs,
        output_dir.display()
    );

    Ok(Some(ExportReport {
        replays: replays.len(),
        logs,
        metadata_path,
        logs_dir,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ReplaySummary;
    use crate::storage::SqliteStorage;
    use tempfile::TempDir;

    fn replay(n: u32, format_id: &str, log_fetched: bool) -> StoredReplay {
        let summary = ReplaySummary {
            id: format!("{}-{}", format_id, n),
            format_id: format_id.to_string(),
            p1_name: "Ash".to_string(),
            p2_name: "Gary".to_string(),
            p1_id: "ash".to_string(),
            p2_id: "gary".to_string(),
            rating: 1500,
            upload_time: 1_700_000_000 + i64::from(n),
            views: 0,
        };
        let mut replay = StoredReplay::from_summary(summary, 0);
        replay.log_fetched = log_fetched;
        replay
    }

    fn setup() -> (SqliteStorage, LogArchive, TempDir) {
        let dir = TempDir::new().unwrap();
        let archive = LogArchive::new(dir.path().join("archive"));
        let mut store = SqliteStorage::new_in_memory().unwrap();

        store.insert_replay(&replay(1, "gen9ou", true)).unwrap();
        store.insert_replay(&replay(2, "gen9ou", false)).unwrap();
        store.insert_replay(&replay(3, "gen8ou", true)).unwrap();
        archive.save("gen9ou-1", "gen9ou", "|win|Ash").unwrap();
        archive.save("gen8ou-3", "gen8ou", "|win|Gary").unwrap();

        (store, archive, dir)
    }

    #[test]
    fn test_export_metadata_and_logs() {
        let (store, archive, dir) = setup();
        let out = dir.path().join("export");

        let report = export_replays(&store, &archive, &out, &ExportOptions::default())
            .unwrap()
            .unwrap();

        assert_eq!(report.replays, 3);
        assert_eq!(report.logs, 2);
        assert_eq!(
            fs::read_to_string(out.join("logs").join("gen9ou-1.log")).unwrap(),
            "|win|Ash"
        );

        let metadata: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report.metadata_path).unwrap()).unwrap();
        let entries = metadata.as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].get("id").is_some());
        assert!(entries[0].get("log_fetched").is_some());
    }

    #[test]
    fn test_export_filters() {
        let (store, archive, dir) = setup();
        let out = dir.path().join("export");

        let options = ExportOptions {
            format_id: Some("gen9ou".to_string()),
            with_logs_only: true,
        };
        let report = export_replays(&store, &archive, &out, &options)
            .unwrap()
            .unwrap();

        assert_eq!(report.replays, 1);
        assert_eq!(report.logs, 1);
        assert!(!out.join("logs").join("gen8ou-3.log").exists());
    }

    #[test]
    fn test_export_nothing_matches() {
        let (store, archive, dir) = setup();
        let out = dir.path().join("export");

        let options = ExportOptions {
            format_id: Some("gen1ou".to_string()),
            with_logs_only: false,
        };
        assert!(export_replays(&store, &archive, &out, &options)
            .unwrap()
            .is_none());
        assert!(!out.exists());
    }
}
