//! HTTP client for the replay service
//!
//! This module handles all HTTP requests to the service, including:
//! - Building HTTP clients with a proper user agent string
//! - Rate limiting every attempt through the shared `RateLimiter`
//! - Retrying transport failures and non-success statuses
//! - Mapping JSON bodies to replay summaries and battle logs

use crate::api::rate_limiter::RateLimiter;
use crate::api::types::{ApiReplay, ReplaySummary};
use crate::api::ReplaySource;
use crate::config::{ScrapingConfig, UserAgentConfig};
use crate::{RemoteError, RemoteResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use replay_harvester::config::UserAgentConfig;
/// use replay_harvester::api::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Client for the replay service's JSON endpoints
#[derive(Debug, Clone)]
pub struct ShowdownClient {
    client: Client,
    base_url: Url,
    rate_limiter: Arc<RateLimiter>,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl ShowdownClient {
    /// Creates a client with its own rate limiter
    pub fn new(
        scraping: &ScrapingConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self, crate::ScraperError> {
        let rate_limiter = Arc::new(RateLimiter::new(scraping.rate_limit()));
        Self::with_rate_limiter(scraping, user_agent, rate_limiter)
    }

    /// Creates a client that shares an existing rate limiter
    pub fn with_rate_limiter(
        scraping: &ScrapingConfig,
        user_agent: &UserAgentConfig,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, crate::ScraperError> {
        let client = build_http_client(user_agent, scraping.request_timeout())?;
        let base_url = Url::parse(&scraping.base_url).map_err(RemoteError::from)?;

        Ok(Self {
            client,
            base_url,
            rate_limiter,
            retry_attempts: scraping.retry_attempts.max(1),
            retry_delay: scraping.retry_delay(),
        })
    }

    /// URL of the search endpoint with only the set parameters attached
    fn search_url(
        &self,
        format_id: Option<&str>,
        user: Option<&str>,
        before: Option<i64>,
    ) -> RemoteResult<Url> {
        let mut url = self.base_url.join("search.json")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(format_id) = format_id.filter(|f| !f.is_empty()) {
                pairs.append_pair("format", format_id);
            }
            if let Some(user) = user.filter(|u| !u.is_empty()) {
                pairs.append_pair("user", user);
            }
            if let Some(before) = before {
                pairs.append_pair("before", &before.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    fn replay_url(&self, replay_id: &str) -> RemoteResult<Url> {
        Ok(self.base_url.join(&format!("{}.json", replay_id))?)
    }

    /// Performs a rate-limited GET with retries and parses the body as JSON
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Transport error / timeout | Retry after `retry_delay` |
    /// | Non-success status | Retry after `retry_delay` |
    /// | HTTP 404 with `missing_ok` | `Ok(None)` immediately |
    /// | Body is not JSON | `InvalidJson` immediately |
    async fn get_json(&self, url: &Url, missing_ok: bool) -> RemoteResult<Option<Value>> {
        let mut last_error: Option<RemoteError> = None;

        for attempt in 1..=self.retry_attempts {
            self.rate_limiter.wait().await;
            tracing::trace!("GET {} (attempt {})", url, attempt);

            match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();

                    if missing_ok && status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }

                    if !status.is_success() {
                        last_error = Some(RemoteError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    } else {
                        match response.text().await {
                            Ok(body) => {
                                let value = serde_json::from_str(&body).map_err(|e| {
                                    RemoteError::InvalidJson {
                                        url: url.to_string(),
                                        message: e.to_string(),
                                    }
                                })?;
                                return Ok(Some(value));
                            }
                            Err(e) => {
                                last_error = Some(RemoteError::Http {
                                    url: url.to_string(),
                                    source: e,
                                });
                            }
                        }
                    }
                }
                Err(e) => {
                    last_error = Some(RemoteError::Http {
                        url: url.to_string(),
                        source: e,
                    });
                }
            }

            if let Some(err) = &last_error {
                tracing::debug!("Request attempt {} failed: {}", attempt, err);
            }

            if attempt < self.retry_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(RemoteError::RetriesExhausted {
            url: url.to_string(),
            attempts: self.retry_attempts,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }
}

#[async_trait]
impl ReplaySource for ShowdownClient {
    async fn search(
        &self,
        format_id: Option<&str>,
        user: Option<&str>,
        before: Option<i64>,
    ) -> RemoteResult<Vec<ReplaySummary>> {
        let url = self.search_url(format_id, user, before)?;

        let value = match self.get_json(&url, false).await? {
            Some(value) => value,
            None => return Ok(Vec::new()),
        };

        // Anything but an array is treated as an empty page
        if !value.is_array() {
            return Ok(Vec::new());
        }

        let raw: Vec<ApiReplay> =
            serde_json::from_value(value).map_err(|e| RemoteError::InvalidJson {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(raw.into_iter().map(ReplaySummary::from).collect())
    }

    async fn fetch_log(&self, replay_id: &str) -> RemoteResult<Option<String>> {
        let url = self.replay_url(replay_id)?;

        let log = self
            .get_json(&url, true)
            .await?
            .and_then(|value| value.get("log").and_then(Value::as_str).map(String::from));

        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> ScrapingConfig {
        ScrapingConfig {
            base_url: base_url.to_string(),
            rate_limit_ms: 1,
            retry_attempts: 3,
            retry_delay_ms: 1,
            request_timeout_secs: 5,
            fetch_full_log: true,
        }
    }

    fn client_for(server: &MockServer) -> ShowdownClient {
        ShowdownClient::new(&test_config(&server.uri()), &UserAgentConfig::default()).unwrap()
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30));
        assert!(client.is_ok());
    }

    #[test]
    fn test_search_url_only_includes_set_params() {
        let client = ShowdownClient::new(
            &test_config("https://replays.example.com"),
            &UserAgentConfig::default(),
        )
        .unwrap();

        let bare = client.search_url(None, None, None).unwrap();
        assert_eq!(bare.as_str(), "https://replays.example.com/search.json");

        let full = client
            .search_url(Some("gen9ou"), Some("ash"), Some(1_700_000_000))
            .unwrap();
        assert_eq!(
            full.as_str(),
            "https://replays.example.com/search.json?format=gen9ou&user=ash&before=1700000000"
        );
    }

    #[tokio::test]
    async fn test_search_parses_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param("format", "gen9ou"))
            .and(query_param("before", "1700000100"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"uploadtime":1700000050,"id":"gen9ou-2","players":["A","B"],"rating":1500},
                    {"uploadtime":1700000010,"id":"gen9ou-1","players":["C","D"]}]"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let page = client
            .search(Some("gen9ou"), None, Some(1_700_000_100))
            .await
            .unwrap();

        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "gen9ou-2");
        assert_eq!(page[1].upload_time, 1_700_000_010);
        assert_eq!(page[1].rating, 0);
    }

    #[tokio::test]
    async fn test_search_non_array_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"error":"none"}"#))
            .mount(&server)
            .await;

        let page = client_for(&server).search(None, None, None).await.unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_search_invalid_json_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server).search(None, None, None).await;
        assert!(matches!(result, Err(RemoteError::InvalidJson { .. })));
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let result = client_for(&server).search(None, None, None).await;
        match result {
            Err(RemoteError::RetriesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 3);
                assert!(last.contains("503"));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_log() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gen9ou-42.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"id":"gen9ou-42","log":"|player|p1|Ash\n|win|Ash"}"#),
            )
            .mount(&server)
            .await;

        let log = client_for(&server).fetch_log("gen9ou-42").await.unwrap();
        assert_eq!(log.as_deref(), Some("|player|p1|Ash\n|win|Ash"));
    }

    #[tokio::test]
    async fn test_fetch_log_missing_replay() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gen9ou-404.json"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let log = client_for(&server).fetch_log("gen9ou-404").await.unwrap();
        assert!(log.is_none());
    }

    #[tokio::test]
    async fn test_fetch_log_without_log_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gen9ou-7.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":"gen9ou-7"}"#))
            .mount(&server)
            .await;

        let log = client_for(&server).fetch_log("gen9ou-7").await.unwrap();
        assert!(log.is_none());
    }
}
