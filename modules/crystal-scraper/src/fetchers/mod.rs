// Page fetchers, cheapest first: plain HTTP, Browserless, local Chromium.

mod browserless;
mod chrome;
mod direct;

pub use browserless::BrowserlessFetcher;
pub use chrome::ChromeFetcher;
pub use direct::DirectFetcher;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::html::{self, ParsedPage};

/// Raw result of one fetch: rendered markup plus the text pulled out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub title: String,
    /// Extracted text before any LLM cleanup.
    pub text: String,
    pub raw_html: String,
}

/// One mechanism for turning a URL into a [`FetchedPage`].
///
/// Implementations report failure through `Err`; the [`crate::Strategy`]
/// wrapper turns that into a failed `ScrapedContent` value.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// Reject anything that is not an absolute http(s) URL before spending a request on it.
pub(crate) fn require_http_url(url: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(url).context("Invalid URL")?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("Only http/https URLs allowed, got: {}", parsed.scheme());
    }
    Ok(parsed)
}

/// Parse markup on the blocking pool; large documents take real CPU time.
pub(crate) async fn parse_off_thread(raw_html: String) -> Result<(ParsedPage, String)> {
    tokio::task::spawn_blocking(move || {
        let parsed = html::parse_page(&raw_html);
        (parsed, raw_html)
    })
    .await
    .context("HTML parse task failed")
}

/// Build a [`FetchedPage`] from rendered markup, failing when nothing readable came back.
pub(crate) async fn page_from_html(url: &str, raw_html: String, fetcher: &str) -> Result<FetchedPage> {
    if raw_html.trim().is_empty() {
        anyhow::bail!("{fetcher} returned an empty document");
    }

    let (parsed, raw_html) = parse_off_thread(raw_html).await?;
    page_from_parsed(url, parsed, raw_html, fetcher)
}

pub(crate) fn page_from_parsed(
    url: &str,
    parsed: ParsedPage,
    raw_html: String,
    fetcher: &str,
) -> Result<FetchedPage> {
    if parsed.text.is_empty() {
        anyhow::bail!("{fetcher} found no extractable text");
    }

    Ok(FetchedPage {
        url: url.to_string(),
        title: parsed.title_or(url),
        text: parsed.text,
        raw_html,
    })
}
