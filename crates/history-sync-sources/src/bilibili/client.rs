use async_trait::async_trait;
use history_sync_config::RemoteConfig;
use history_sync_models::SyncCursor;
use reqwest::header::{COOKIE, REFERER};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::bilibili::api;
use crate::error::FetchError;
use crate::rate_limit::RateLimiter;
use crate::traits::{FeedPage, HistoryFeed};

const HISTORY_PATH: &str = "/x/web-interface/history/cursor";
const REFERER_URL: &str = "https://www.bilibili.com";

/// Client for the Bilibili watch-history cursor endpoint.
///
/// The session token is supplied once and never refreshed.
pub struct BilibiliClient {
    client: Client,
    base_url: String,
    sessdata: String,
    page_size: u32,
    type_filter: Option<String>,
    limiter: Arc<RateLimiter>,
}

impl BilibiliClient {
    pub fn new(config: &RemoteConfig, sessdata: String) -> Self {
        let limiter = Arc::new(RateLimiter::with_system_clock(Duration::from_millis(
            config.min_request_interval_ms,
        )));
        Self::with_rate_limiter(config, sessdata, limiter)
    }

    pub fn with_rate_limiter(config: &RemoteConfig, sessdata: String, limiter: Arc<RateLimiter>) -> Self {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build configured HTTP client ({}), using defaults", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            sessdata,
            page_size: config.effective_page_size(),
            type_filter: config.business.clone().filter(|b| !b.trim().is_empty()),
            limiter,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    fn query_for(&self, cursor: &SyncCursor) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("ps", self.page_size.to_string()),
            ("max", cursor.max.to_string()),
            ("view_at", cursor.view_at.to_string()),
            ("business", cursor.business.clone().unwrap_or_default()),
        ];
        if let Some(filter) = &self.type_filter {
            query.push(("type", filter.clone()));
        }
        query
    }
}

#[async_trait]
impl HistoryFeed for BilibiliClient {
    fn source_name(&self) -> &str {
        "bilibili"
    }

    async fn fetch_page(&self, cursor: &SyncCursor) -> Result<FeedPage, FetchError> {
        self.limiter.acquire().await;

        let url = format!("{}{}", self.base_url, HISTORY_PATH);
        debug!("Fetching history page max={} view_at={}", cursor.max, cursor.view_at);

        let response = self
            .client
            .get(&url)
            .query(&self.query_for(cursor))
            .header(COOKIE, format!("SESSDATA={}", self.sessdata))
            .header(REFERER, REFERER_URL)
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Auth(format!("remote rejected session with HTTP {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Transient(format!(
                "Failed to fetch history page: {} - {}",
                status, body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transient(format!("failed to read response body: {}", e)))?;

        api::parse_history_page(&body)
    }
}
