//! In-process replay source for engine tests

use crate::api::{ReplaySource, ReplaySummary};
use crate::storage::{SharedStore, SqliteStorage};
use crate::{RemoteError, RemoteResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub(crate) fn summary(n: u32, rating: i64, upload_time: i64) -> ReplaySummary {
    ReplaySummary {
        id: format!("gen9ou-{}", n),
        format_id: "gen9ou".to_string(),
        p1_name: format!("Player {}", n),
        p2_name: "Rival".to_string(),
        p1_id: format!("player{}", n),
        p2_id: "rival".to_string(),
        rating,
        upload_time,
        views: 0,
    }
}

/// `count` replays rated 1500, newest first, one second apart ending at `newest`
pub(crate) fn timeline(count: u32, newest: i64) -> Vec<ReplaySummary> {
    (0..count)
        .map(|i| summary(count - i, 1500, newest - i64::from(i)))
        .collect()
}

pub(crate) fn memory_store() -> SharedStore {
    Arc::new(Mutex::new(
        SqliteStorage::new_in_memory().expect("in-memory store"),
    ))
}

#[derive(Default)]
struct Calls {
    searches: Vec<Option<i64>>,
    log_requests: Vec<String>,
}

/// Pages through a fixed newest-first timeline like the real service
pub(crate) struct FakeSource {
    replays: Vec<ReplaySummary>,
    page_size: usize,
    logs: HashMap<String, String>,
    search_failures: Mutex<u32>,
    cancel_on_log: Mutex<Option<CancellationToken>>,
    calls: Mutex<Calls>,
}

impl FakeSource {
    pub(crate) fn new(replays: Vec<ReplaySummary>, page_size: usize) -> Self {
        Self {
            replays,
            page_size,
            logs: HashMap::new(),
            search_failures: Mutex::new(0),
            cancel_on_log: Mutex::new(None),
            calls: Mutex::new(Calls::default()),
        }
    }

    /// Serves a log body for every replay id
    pub(crate) fn with_logs_for_all(mut self) -> Self {
        for replay in &self.replays {
            self.logs
                .insert(replay.id.clone(), format!("|player|p1|{}\n|win|", replay.p1_name));
        }
        self
    }

    pub(crate) fn with_log(mut self, id: &str, log: &str) -> Self {
        self.logs.insert(id.to_string(), log.to_string());
        self
    }

    /// Makes the next `n` searches fail
    pub(crate) fn fail_searches(self, n: u32) -> Self {
        *self.search_failures.lock().unwrap() = n;
        self
    }

    /// Cancels `token` when the first log is requested
    pub(crate) fn cancel_on_first_log(self, token: CancellationToken) -> Self {
        *self.cancel_on_log.lock().unwrap() = Some(token);
        self
    }

    pub(crate) fn searches(&self) -> Vec<Option<i64>> {
        self.calls.lock().unwrap().searches.clone()
    }

    pub(crate) fn log_requests(&self) -> Vec<String> {
        self.calls.lock().unwrap().log_requests.clone()
    }
}

#[async_trait]
impl ReplaySource for FakeSource {
    async fn search(
        &self,
        _format_id: Option<&str>,
        _user: Option<&str>,
        before: Option<i64>,
    ) -> RemoteResult<Vec<ReplaySummary>> {
        self.calls.lock().unwrap().searches.push(before);

        {
            let mut failures = self.search_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(RemoteError::Status {
                    url: "fake://search.json".to_string(),
                    status: 503,
                });
            }
        }

        Ok(self
            .replays
            .iter()
            .filter(|r| before.map_or(true, |b| r.upload_time < b))
            .take(self.page_size)
            .cloned()
            .collect())
    }

    async fn fetch_log(&self, replay_id: &str) -> RemoteResult<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .log_requests
            .push(replay_id.to_string());

        if let Some(token) = self.cancel_on_log.lock().unwrap().take() {
            token.cancel();
        }

        match self.logs.get(replay_id) {
            Some(log) => Ok(Some(log.clone())),
            None => Err(RemoteError::Status {
                url: format!("fake://{}.json", replay_id),
                status: 500,
            }),
        }
    }
}
