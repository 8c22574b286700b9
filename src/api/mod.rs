//! Remote replay service access
//!
//! This module contains:
//! - The `ReplaySummary` model and its mapping from the service's JSON
//! - A shared `RateLimiter` spacing out every outbound request
//! - The `ReplaySource` trait the engines depend on
//! - `ShowdownClient`, the reqwest implementation with its retry loop

mod client;
mod rate_limiter;
mod types;

pub use client::{build_http_client, ShowdownClient};
pub use rate_limiter::RateLimiter;
pub use types::{format_from_replay_id, parse_format_id, player_key, ApiReplay, ReplaySummary};

use crate::RemoteResult;
use async_trait::async_trait;

/// The two remote operations the harvesting engines rely on
///
/// Implementations are expected to retry transient failures themselves and
/// only report an error once their retry budget is exhausted.
#[async_trait]
pub trait ReplaySource: Send + Sync {
    /// Searches replays, newest first
    ///
    /// `before` is the pagination cursor: only replays uploaded before this
    /// Unix timestamp are returned.
    async fn search(
        &self,
        format_id: Option<&str>,
        user: Option<&str>,
        before: Option<i64>,
    ) -> RemoteResult<Vec<ReplaySummary>>;

    /// Fetches the battle log of one replay
    ///
    /// `Ok(None)` means the service has no log for this id.
    async fn fetch_log(&self, replay_id: &str) -> RemoteResult<Option<String>>;
}
