use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for Replay-Harvester
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub scraping: ScrapingConfig,
    pub defaults: DefaultsConfig,
    pub backfill: BackfillConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
}

/// Where harvested data lives
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Root directory for compressed battle logs
    #[serde(rename = "logs-path")]
    pub logs_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./data/replays.db".to_string(),
            logs_path: "./data/logs".to_string(),
        }
    }
}

/// Remote service access configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Base URL of the replay service
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Minimum time between outbound requests (milliseconds)
    #[serde(rename = "rate-limit-ms")]
    pub rate_limit_ms: u64,

    /// Attempts per request before giving up
    #[serde(rename = "retry-attempts")]
    pub retry_attempts: u32,

    /// Delay between attempts, and between failed search batches (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Whether new jobs fetch battle logs unless told otherwise
    #[serde(rename = "fetch-full-log")]
    pub fetch_full_log: bool,
}

impl ScrapingConfig {
    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://replay.pokemonshowdown.com".to_string(),
            rate_limit_ms: 1000,
            retry_attempts: 3,
            retry_delay_ms: 5000,
            request_timeout_secs: 30,
            fetch_full_log: true,
        }
    }
}

/// Default job scope used when the CLI leaves a value out
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DefaultsConfig {
    #[serde(rename = "min-elo")]
    pub min_elo: i64,

    #[serde(rename = "max-elo", skip_serializing_if = "Option::is_none")]
    pub max_elo: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Log backfill sweep configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackfillConfig {
    /// Rows pulled from the store per sweep step
    #[serde(rename = "batch-size")]
    pub batch_size: u32,

    /// Sleep between polls when nothing is missing a log (seconds)
    #[serde(rename = "idle-backoff-secs")]
    pub idle_backoff_secs: u64,
}

impl BackfillConfig {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_secs(self.idle_backoff_secs)
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            idle_backoff_secs: 10,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the harvester
    #[serde(rename = "client-name")]
    pub client_name: String,

    /// Version of the harvester
    #[serde(rename = "client-version")]
    pub client_version: String,

    /// URL with information about the harvester
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header value
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.client_name, self.client_version, self.contact_url
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            client_name: "replay-harvester".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://github.com/replay-harvester/replay-harvester".to_string(),
        }
    }
}
