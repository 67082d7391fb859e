use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use browserless_client::{BrowserlessClient, WaitUntil};
use tracing::info;

use super::{page_from_html, require_http_url, FetchedPage, PageFetcher};

/// Headless Chrome driven remotely through Browserless: navigate, wait for
/// `load`, read the rendered DOM. Browserless owns the browser session and
/// closes it when the request finishes.
pub struct BrowserlessFetcher {
    client: BrowserlessClient,
}

impl BrowserlessFetcher {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = BrowserlessClient::with_timeout(base_url, token, timeout)
            .context("Failed to build Browserless client")?
            .wait_until(WaitUntil::Load);

        info!(base_url = client.base_url(), "BrowserlessFetcher initialized");
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for BrowserlessFetcher {
    fn name(&self) -> &str {
        "browserless"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        require_http_url(url)?;

        info!(url, fetcher = "browserless", "Fetching page");

        let html = self
            .client
            .content(url)
            .await
            .context("Browserless content request failed")?;

        let page = page_from_html(url, html, "browserless").await?;

        info!(url, fetcher = "browserless", bytes = page.raw_html.len(), "Fetched successfully");
        Ok(page)
    }
}
