//! Plain-text rendering of jobs, replays and audit entries

use crate::scraper::{format_number, format_percentage, format_timestamp};
use crate::storage::{Job, LogEntry, StoredReplay};
use std::fmt::Write;

/// Formats how long ago `timestamp` was, relative to `now`
pub fn format_relative_time(timestamp: i64, now: i64) -> String {
    let diff = (now - timestamp).max(0);
    let plural = |n: i64| if n == 1 { "" } else { "s" };

    if diff < 60 {
        format!("{} seconds ago", diff)
    } else if diff < 3600 {
        let minutes = diff / 60;
        format!("{} minute{} ago", minutes, plural(minutes))
    } else if diff < 86_400 {
        let hours = diff / 3600;
        format!("{} hour{} ago", hours, plural(hours))
    } else {
        let days = diff / 86_400;
        format!("{} day{} ago", days, plural(days))
    }
}

/// Formats one job's status block
pub fn format_job(job: &Job, now: i64) -> String {
    let match_rate = if job.total_fetched > 0 {
        format_percentage(job.total_stored, job.total_fetched)
    } else {
        "N/A".to_string()
    };
    let last_update = job
        .updated_at
        .map(|t| format_relative_time(t, now))
        .unwrap_or_else(|| "Never".to_string());

    let mut out = String::new();
    let _ = writeln!(out, "  Job: {}", job.name);
    let _ = writeln!(out, "    Status: {}", job.status);
    let _ = writeln!(out, "    Format: {}", job.format_id.as_deref().unwrap_or("all"));
    if let Some(user) = &job.user_filter {
        let _ = writeln!(out, "    User: {}", user);
    }
    let _ = writeln!(out, "    ELO Filter: {}", job.elo_band());
    let _ = writeln!(
        out,
        "    Progress: {} fetched / {} stored ({} match rate)",
        format_number(job.total_fetched),
        format_number(job.total_stored),
        match_rate
    );
    if let Some(cursor) = job.last_timestamp {
        let _ = writeln!(out, "    Cursor: {}", format_timestamp(cursor));
    }
    let _ = writeln!(out, "    Last Update: {}", last_update);
    out
}

/// Formats a replay as the short listing shown by `query`
pub fn format_replay(replay: &StoredReplay) -> String {
    let s = &replay.summary;
    format!(
        "  {}\n    {} vs {}\n    Rating: {}, Views: {}, Log: {}\n",
        s.id,
        s.p1_name,
        s.p2_name,
        s.rating,
        s.views,
        if replay.log_fetched { "yes" } else { "no" }
    )
}

/// Formats an audit entry as one line
pub fn format_log_entry(entry: &LogEntry) -> String {
    format!(
        "{} [{}] {}: {}",
        format_timestamp(entry.timestamp),
        entry.level.to_db_string(),
        entry.job_name,
        entry.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ReplaySummary;
    use crate::storage::{JobStatus, LogLevel};

    fn sample_job() -> Job {
        Job {
            id: 1,
            name: "gen9ou-elo1500".to_string(),
            format_id: Some("gen9ou".to_string()),
            user_filter: None,
            min_elo: 1500,
            max_elo: None,
            last_timestamp: Some(1_700_000_000),
            status: JobStatus::Paused,
            total_fetched: 2000,
            total_stored: 500,
            started_at: Some(1_699_990_000),
            updated_at: Some(1_700_000_000),
            config_hash: None,
        }
    }

    #[test]
    fn test_format_relative_time() {
        assert_eq!(format_relative_time(100, 130), "30 seconds ago");
        assert_eq!(format_relative_time(0, 60), "1 minute ago");
        assert_eq!(format_relative_time(0, 7200), "2 hours ago");
        assert_eq!(format_relative_time(0, 86_400 * 3), "3 days ago");
        assert_eq!(format_relative_time(500, 100), "0 seconds ago");
    }

    #[test]
    fn test_format_job() {
        let text = format_job(&sample_job(), 1_700_000_120);
        assert!(text.contains("Job: gen9ou-elo1500"));
        assert!(text.contains("Status: paused"));
        assert!(text.contains("ELO Filter: >= 1500"));
        assert!(text.contains("Progress: 2,000 fetched / 500 stored (25.0% match rate)"));
        assert!(text.contains("Cursor: 2023-11-14 22:13:20"));
        assert!(text.contains("Last Update: 2 minutes ago"));
        assert!(!text.contains("User:"));
    }

    #[test]
    fn test_format_job_never_fetched() {
        let mut job = sample_job();
        job.total_fetched = 0;
        job.updated_at = None;
        job.user_filter = Some("ash".to_string());

        let text = format_job(&job, 0);
        assert!(text.contains("(N/A match rate)"));
        assert!(text.contains("Last Update: Never"));
        assert!(text.contains("User: ash"));
    }

    #[test]
    fn test_format_replay_and_log_entry() {
        let replay = StoredReplay {
            summary: ReplaySummary {
                id: "gen9ou-1".to_string(),
                format_id: "gen9ou".to_string(),
                p1_name: "Ash".to_string(),
                p2_name: "Gary".to_string(),
                p1_id: "ash".to_string(),
                p2_id: "gary".to_string(),
                rating: 1623,
                upload_time: 0,
                views: 4,
            },
            log_fetched: true,
            log_size: 10,
            scraped_at: 0,
        };
        assert_eq!(
            format_replay(&replay),
            "  gen9ou-1\n    Ash vs Gary\n    Rating: 1623, Views: 4, Log: yes\n"
        );

        let entry = LogEntry {
            job_name: "ladder".to_string(),
            timestamp: 1_700_000_000,
            level: LogLevel::Warning,
            message: "Failed".to_string(),
        };
        assert_eq!(
            format_log_entry(&entry),
            "2023-11-14 22:13:20 [warning] ladder: Failed"
        );
    }
}
