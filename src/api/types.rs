//! Replay summary model
//!
//! Replay ids look like `{format}-{number}` (for example `gen9ou-2048771234`),
//! optionally followed by a password segment for private replays.

use serde::{Deserialize, Serialize};

/// One entry of a search result page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub id: String,
    pub format_id: String,
    pub p1_name: String,
    pub p2_name: String,
    /// Normalized player keys (lowercase, no spaces)
    pub p1_id: String,
    pub p2_id: String,
    /// 0 when unranked
    pub rating: i64,
    pub upload_time: i64,
    pub views: i64,
}

/// Raw replay object as returned by the service
///
/// The search endpoint lists players in a `players` array while the replay
/// endpoint uses `p1`/`p2`; both shapes are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiReplay {
    pub id: String,
    #[serde(default)]
    pub uploadtime: Option<i64>,
    #[serde(default)]
    pub players: Vec<String>,
    #[serde(default)]
    pub p1: Option<String>,
    #[serde(default)]
    pub p2: Option<String>,
    #[serde(default)]
    pub p1id: Option<String>,
    #[serde(default)]
    pub p2id: Option<String>,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub views: Option<i64>,
}

impl From<ApiReplay> for ReplaySummary {
    fn from(raw: ApiReplay) -> Self {
        let mut players = raw.players.into_iter();
        let (p1_name, p2_name) = match (players.next(), players.next()) {
            (Some(p1), p2) => (p1, p2.unwrap_or_default()),
            (None, _) => (raw.p1.unwrap_or_default(), raw.p2.unwrap_or_default()),
        };

        let p1_id = raw.p1id.unwrap_or_else(|| player_key(&p1_name));
        let p2_id = raw.p2id.unwrap_or_else(|| player_key(&p2_name));

        Self {
            format_id: format_from_replay_id(&raw.id),
            id: raw.id,
            p1_name,
            p2_name,
            p1_id,
            p2_id,
            rating: raw.rating.unwrap_or(0),
            upload_time: raw.uploadtime.unwrap_or(0),
            views: raw.views.unwrap_or(0),
        }
    }
}

/// Derives the format from a replay id by dropping the numeric suffix
///
/// Everything from the first all-digit segment onwards is removed, so a
/// trailing password segment on private replays is dropped too.
pub fn format_from_replay_id(replay_id: &str) -> String {
    let segments: Vec<&str> = replay_id.split('-').collect();
    let numeric = segments
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, s)| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .map(|(i, _)| i);

    match numeric {
        Some(i) => segments[..i].join("-"),
        None => match replay_id.rsplit_once('-') {
            Some((format, _)) => format.to_string(),
            None => replay_id.to_string(),
        },
    }
}

/// Normalizes a player name into a lookup key
pub fn player_key(name: &str) -> String {
    name.to_lowercase().replace(' ', "")
}

/// Normalizes a user-entered format (`"Gen 9 OU"`, `"gen9-ou"`) to a format id
pub fn parse_format_id(format: &str) -> String {
    format.to_lowercase().replace([' ', '-'], "")
}
