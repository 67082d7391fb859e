use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use tracing::info;

use super::{page_from_html, require_http_url, FetchedPage, PageFetcher};

/// Plain HTTP GET + HTML parse. No script execution.
pub struct DirectFetcher {
    client: reqwest::Client,
}

impl DirectFetcher {
    pub fn new(timeout: Duration, user_agent: &str, referer: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent).context("Invalid user agent")?);
        headers.insert(REFERER, HeaderValue::from_str(referer).context("Invalid referer")?);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        info!(timeout_secs = timeout.as_secs(), "DirectFetcher initialized");
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for DirectFetcher {
    fn name(&self) -> &str {
        "direct"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let parsed = require_http_url(url)?;

        info!(url, fetcher = "direct", "Fetching page");

        let resp = self
            .client
            .get(parsed)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {status}");
        }

        let body = resp.text().await.context("Failed to read response body")?;
        let page = page_from_html(url, body, "direct").await?;

        info!(url, fetcher = "direct", bytes = page.raw_html.len(), "Fetched successfully");
        Ok(page)
    }
}
