//! HTTP status source for the WaveNode bridge.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};
use reqwest::Client;
use serde_json::Value;

use super::StatusSource;
use crate::error::PollError;
use crate::prefs::DEFAULT_BASE_URL;

/// Path of the status endpoint below the bridge's base address.
pub const STATUS_PATH: &str = "/api/wavenode/status";

/// Build the status URL for a base address.
///
/// Trailing slashes are dropped; an empty base uses [`DEFAULT_BASE_URL`].
pub fn status_url(base: &str) -> String {
    let trimmed = base.trim().trim_end_matches('/');
    let base = if trimmed.is_empty() {
        DEFAULT_BASE_URL
    } else {
        trimmed
    };
    format!("{}{}", base, STATUS_PATH)
}

/// Fetches status documents over HTTP with caching disabled.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    description: String,
}

impl HttpSource {
    /// Create a new builder for configuring the source.
    pub fn builder() -> HttpSourceBuilder {
        HttpSourceBuilder::default()
    }
}

#[async_trait]
impl StatusSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<Value, PollError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(PollError::Http(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| PollError::Decode(e.to_string()))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Builder for [`HttpSource`].
#[derive(Debug, Default)]
pub struct HttpSourceBuilder {
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl HttpSourceBuilder {
    /// Hard cap on a whole request (default: 10 seconds).
    ///
    /// The poller additionally bounds each request by one poll interval.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Cap on establishing the TCP connection (default: 2 seconds).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Build the source.
    pub fn build(self) -> Result<HttpSource, PollError> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(self.timeout.unwrap_or(Duration::from_secs(10)))
            .connect_timeout(self.connect_timeout.unwrap_or(Duration::from_secs(2)))
            .build()
            .map_err(|e| PollError::Connection(e.to_string()))?;

        Ok(HttpSource {
            client,
            description: "http".to_string(),
        })
    }
}
