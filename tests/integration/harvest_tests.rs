//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the replay service and run the
//! engines end-to-end against a file-backed database.

use replay_harvester::api::{ReplaySource, ShowdownClient};
use replay_harvester::archive::LogArchive;
use replay_harvester::config::{ScrapingConfig, UserAgentConfig};
use replay_harvester::scraper::{JobRunner, LogBackfill, ProgressSink, RunOptions, RunOutcome};
use replay_harvester::storage::{
    lock_store, JobSpec, JobStatus, MissingLogFilter, ReplayQuery, SharedStore, SqliteStorage,
};
use replay_harvester::ReplayStore;
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NEWEST: i64 = 1_700_000_000;

/// Creates a client configuration pointing at the mock server
fn test_scraping_config(base_url: &str) -> ScrapingConfig {
    ScrapingConfig {
        base_url: base_url.to_string(),
        rate_limit_ms: 1, // Very short for testing
        retry_attempts: 2,
        retry_delay_ms: 1,
        request_timeout_secs: 5,
        fetch_full_log: true,
    }
}

fn client(server: &MockServer) -> Arc<dyn ReplaySource> {
    let client = ShowdownClient::new(
        &test_scraping_config(&server.uri()),
        &UserAgentConfig::default(),
    )
    .expect("Failed to build client");
    Arc::new(client)
}

fn open_store(db_path: &Path) -> SharedStore {
    let storage = SqliteStorage::new(db_path).expect("Failed to open database");
    Arc::new(Mutex::new(storage))
}

fn search_entry(n: u32, rating: i64) -> serde_json::Value {
    json!({
        "uploadtime": NEWEST - i64::from(100 - n),
        "id": format!("gen9ou-{}", n),
        "format": "[Gen 9] OU",
        "players": [format!("Player {}", n), "Rival"],
        "rating": rating,
        "private": 0
    })
}

fn upload_time(n: u32) -> i64 {
    NEWEST - i64::from(100 - n)
}

/// Mounts a three-page search timeline: ids 10..=6, then 5..=1, then nothing
async fn mount_timeline(server: &MockServer) {
    // Specific cursors first; wiremock prefers earlier mounts
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("before", upload_time(6).to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            search_entry(5, 1100),
            search_entry(4, 1600),
            search_entry(3, 1700),
            search_entry(2, 1200),
            search_entry(1, 1900),
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("before", upload_time(1).to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            search_entry(10, 1500),
            search_entry(9, 1000),
            search_entry(8, 1550),
            search_entry(7, 1400),
            search_entry(6, 2000),
        ])))
        .mount(server)
        .await;
}

async fn mount_logs(server: &MockServer, ids: &[u32]) {
    for n in ids {
        Mock::given(method("GET"))
            .and(path(format!("/gen9ou-{}.json", n)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": format!("gen9ou-{}", n),
                "log": format!("|player|p1|Player {}\n|win|Player {}", n, n),
            })))
            .mount(server)
            .await;
    }
}

fn quiet() -> ProgressSink {
    ProgressSink::new(|_| {})
}

#[tokio::test]
async fn test_full_job_with_logs() {
    let server = MockServer::start().await;
    mount_timeline(&server).await;
    mount_logs(&server, &[10, 8, 6, 4, 3, 1]).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("replays.db");
    let archive = LogArchive::new(dir.path().join("logs"));
    let store = open_store(&db_path);

    let runner = JobRunner::new(client(&server), Arc::clone(&store), archive.clone())
        .with_progress(quiet())
        .with_retry_delay(Duration::from_millis(1));
    runner
        .create_job(&JobSpec {
            name: "gen9ou-elo1500".to_string(),
            format_id: Some("gen9ou".to_string()),
            min_elo: 1500,
            ..Default::default()
        })
        .unwrap();

    let options = RunOptions {
        limit: None,
        fetch_logs: true,
    };
    let outcome = runner
        .run_job("gen9ou-elo1500", options, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    // Reopen from disk to make sure everything was persisted
    drop(runner);
    drop(store);
    let store = SqliteStorage::new(&db_path).unwrap();

    let job = store.get_job("gen9ou-elo1500").unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_fetched, 10);
    assert_eq!(job.total_stored, 10);
    assert_eq!(job.last_timestamp, Some(upload_time(1)));

    let stats = store.replay_stats().unwrap();
    assert_eq!(stats.total_replays, 10);
    assert_eq!(stats.with_logs, 6);

    // Below the band: metadata only
    let low = store.get_replay("gen9ou-9").unwrap().unwrap();
    assert!(!low.log_fetched);

    let high = store.get_replay("gen9ou-6").unwrap().unwrap();
    assert!(high.log_fetched);
    assert_eq!(high.summary.p1_id, "player6");
    assert_eq!(
        archive.load("gen9ou-6", "gen9ou").unwrap().as_deref(),
        Some("|player|p1|Player 6\n|win|Player 6")
    );
    assert_eq!(archive.stats().unwrap().total_files, 6);
}

#[tokio::test]
async fn test_limited_run_then_resume_from_disk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("before", upload_time(8).to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([search_entry(7, 1400), search_entry(6, 2000)])),
        )
        .mount(&server)
        .await;
    mount_timeline(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("replays.db");
    let archive = LogArchive::new(dir.path().join("logs"));

    {
        let store = open_store(&db_path);
        let runner = JobRunner::new(client(&server), Arc::clone(&store), archive.clone())
            .with_progress(quiet());
        runner
            .create_job(&JobSpec {
                name: "ladder".to_string(),
                format_id: Some("gen9ou".to_string()),
                ..Default::default()
            })
            .unwrap();

        let options = RunOptions {
            limit: Some(3),
            fetch_logs: false,
        };
        let outcome = runner
            .run_job("ladder", options, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.is_completed());

        let job = lock_store(&store).unwrap().get_job("ladder").unwrap().unwrap();
        assert_eq!(job.total_stored, 3);
        assert_eq!(job.last_timestamp, Some(upload_time(8)));
    }

    // A fresh process picks up from the stored cursor
    let store = open_store(&db_path);
    let runner = JobRunner::new(client(&server), Arc::clone(&store), archive)
        .with_progress(quiet());
    runner
        .run_job("ladder", RunOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    let befores: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/search.json")
        .map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "before")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default()
        })
        .collect();
    assert_eq!(befores[0], "");
    assert_eq!(befores[1], upload_time(8).to_string());

    let s = lock_store(&store).unwrap();
    let all = s
        .query_replays(&ReplayQuery {
            limit: 100,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(all.len(), 10);
    assert_eq!(s.get_job("ladder").unwrap().unwrap().total_stored, 10);
}

#[tokio::test]
async fn test_backfill_against_service() {
    let server = MockServer::start().await;
    mount_timeline(&server).await;
    mount_logs(&server, &[10, 9, 8, 7]).await;
    Mock::given(method("GET"))
        .and(path("/gen9ou-6.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let archive = LogArchive::new(dir.path().join("logs"));
    let store = open_store(&dir.path().join("replays.db"));

    // Metadata only
    let runner = JobRunner::new(client(&server), Arc::clone(&store), archive.clone())
        .with_progress(quiet());
    runner
        .create_job(&JobSpec {
            name: "metadata".to_string(),
            ..Default::default()
        })
        .unwrap();
    runner
        .run_job("metadata", RunOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    let backfill = LogBackfill::new(client(&server), Arc::clone(&store), archive.clone())
        .with_progress(quiet())
        .with_batch_size(2);
    let filter = MissingLogFilter {
        min_elo: Some(1400),
        ..Default::default()
    };
    let fetched = backfill
        .run(Some(10), &filter, &CancellationToken::new())
        .await
        .unwrap();

    // In band: 10, 8, 7, 6, 4, 3, 1; only 10, 8 and 7 have logs
    assert_eq!(fetched, 3);
    let s = lock_store(&store).unwrap();
    assert!(s.get_replay("gen9ou-8").unwrap().unwrap().log_fetched);
    assert!(!s.get_replay("gen9ou-9").unwrap().unwrap().log_fetched);
    assert!(!s.get_replay("gen9ou-6").unwrap().unwrap().log_fetched);
    assert!(archive.exists("gen9ou-7", "gen9ou"));

    let warnings = s.recent_logs(Some("fetch-logs"), 20).unwrap();
    assert_eq!(warnings.len(), 4);
}
