use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `content_type` marker for aggregated multi-page results.
pub const RECURSIVE_CONTENT_TYPE: &str = "text/recursive";

/// Well-known `metadata` keys.
pub mod meta {
    pub const TOTAL_PAGES: &str = "total_pages";
    pub const MAX_DEPTH: &str = "max_depth";
    pub const SCRAPED_URLS: &str = "scraped_urls";
    pub const ATTEMPTED_DEPTH: &str = "attempted_depth";
    pub const FALLBACK_REASON: &str = "fallback_reason";
    pub const STRATEGY: &str = "strategy";
}

/// Outcome of scraping one URL, or of aggregating a crawl rooted at one URL.
///
/// `success == true` implies `error.is_none()`; a failed result always carries
/// an error description and may have empty `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedContent {
    pub url: String,
    pub title: String,
    pub text: String,
    pub raw_html: Option<String>,
    pub content_type: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub success: bool,
    pub error: Option<String>,
    /// Elapsed wall time in seconds.
    pub scrape_time: f64,
}

impl ScrapedContent {
    /// A successfully scraped single page.
    pub fn page(
        url: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
        raw_html: Option<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            text: text.into(),
            raw_html,
            content_type: None,
            metadata: Map::new(),
            success: true,
            error: None,
            scrape_time: elapsed.as_secs_f64(),
        }
    }

    pub fn failure(url: impl Into<String>, error: impl Into<String>, elapsed: Duration) -> Self {
        let error = error.into();
        Self {
            url: url.into(),
            title: String::new(),
            text: String::new(),
            raw_html: None,
            content_type: None,
            metadata: Map::new(),
            success: false,
            error: Some(if error.is_empty() {
                "Unknown error".to_string()
            } else {
                error
            }),
            scrape_time: elapsed.as_secs_f64(),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.success
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn scrape_duration(&self) -> Duration {
        Duration::from_secs_f64(self.scrape_time.max(0.0))
    }

    /// Number of pages folded into a recursive result.
    pub fn total_pages(&self) -> Option<u64> {
        self.metadata.get(meta::TOTAL_PAGES).and_then(Value::as_u64)
    }

    /// URLs folded into a recursive result, in crawl order.
    pub fn scraped_urls(&self) -> Vec<&str> {
        self.metadata
            .get(meta::SCRAPED_URLS)
            .and_then(Value::as_array)
            .map(|urls| urls.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_recursive(&self) -> bool {
        self.content_type.as_deref() == Some(RECURSIVE_CONTENT_TYPE)
    }
}
