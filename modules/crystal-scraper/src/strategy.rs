use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::content::{meta, ScrapedContent};
use crate::error::ScrapeError;
use crate::fetchers::PageFetcher;
use crate::formatter::ContentFormatter;

/// A [`PageFetcher`] bound to a deadline and a formatter.
///
/// `fetch` never fails: timeouts and fetcher errors become a failed
/// [`ScrapedContent`] with `scrape_time` filled in, and successful text is run
/// through the formatter before it is returned.
#[derive(Clone)]
pub struct Strategy {
    fetcher: Arc<dyn PageFetcher>,
    formatter: ContentFormatter,
    timeout: Duration,
}

impl Strategy {
    pub fn new(fetcher: Arc<dyn PageFetcher>, formatter: ContentFormatter, timeout: Duration) -> Self {
        Self {
            fetcher,
            formatter,
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        self.fetcher.name()
    }

    pub async fn fetch(&self, url: &str) -> ScrapedContent {
        let start = Instant::now();

        let fetched = match tokio::time::timeout(self.timeout, self.fetcher.fetch(url)).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                let err = ScrapeError::Fetch {
                    strategy: self.name().to_string(),
                    message: format!("{e:#}"),
                };
                return ScrapedContent::failure(url, err.to_string(), start.elapsed());
            }
            Err(_) => {
                let err = ScrapeError::Timeout {
                    strategy: self.name().to_string(),
                    secs: self.timeout.as_secs(),
                };
                warn!(url, strategy = self.name(), "Fetch attempt timed out");
                return ScrapedContent::failure(url, err.to_string(), start.elapsed());
            }
        };
        debug!(url, strategy = self.name(), elapsed_ms = start.elapsed().as_millis() as u64, "Fetched");

        let text = self.formatter.clean(&fetched.text, &fetched.title).await;

        ScrapedContent::page(
            fetched.url,
            fetched.title,
            text,
            Some(fetched.raw_html),
            start.elapsed(),
        )
        .with_metadata(meta::STRATEGY, self.name())
    }
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("name", &self.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockCompletion, MockFetcher};

    const PAGE: &str = "<html><title>T</title><body>Hello</body></html>";

    #[tokio::test]
    async fn success_carries_title_text_and_markup() {
        let fetcher = Arc::new(MockFetcher::new("direct").on_html("https://a.com", PAGE));
        let strategy = Strategy::new(fetcher, ContentFormatter::disabled(), Duration::from_secs(5));

        let result = strategy.fetch("https://a.com").await;
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.title, "T");
        assert_eq!(result.text, "Hello");
        assert_eq!(result.raw_html.as_deref(), Some(PAGE));
        assert_eq!(result.metadata[meta::STRATEGY], "direct");
    }

    #[tokio::test]
    async fn fetcher_error_becomes_failure_value() {
        let fetcher = Arc::new(MockFetcher::new("direct").on_error("https://a.com", "HTTP 403 Forbidden"));
        let strategy = Strategy::new(fetcher, ContentFormatter::disabled(), Duration::from_secs(5));

        let result = strategy.fetch("https://a.com").await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("direct"));
        assert!(error.contains("403"));
        assert!(result.scrape_time > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetcher_times_out() {
        let fetcher = Arc::new(
            MockFetcher::new("chrome")
                .on_html("https://a.com", PAGE)
                .with_delay(Duration::from_secs(120)),
        );
        let strategy = Strategy::new(fetcher, ContentFormatter::disabled(), Duration::from_secs(45));

        let result = strategy.fetch("https://a.com").await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out after 45s"));
    }

    #[tokio::test]
    async fn success_text_goes_through_formatter() {
        let cleaned = "Hello, and welcome to the page. This sentence is long enough to keep.";
        let completion = Arc::new(MockCompletion::replying(cleaned));
        let formatter = ContentFormatter::new(completion.clone(), Duration::from_secs(5));
        let fetcher = Arc::new(MockFetcher::new("direct").on_html("https://a.com", PAGE));
        let strategy = Strategy::new(fetcher, formatter, Duration::from_secs(5));

        let result = strategy.fetch("https://a.com").await;
        assert_eq!(result.text, cleaned);
        assert_eq!(completion.calls(), 1);
    }

    #[tokio::test]
    async fn failures_skip_the_formatter() {
        let completion = Arc::new(MockCompletion::replying("unused"));
        let formatter = ContentFormatter::new(completion.clone(), Duration::from_secs(5));
        let fetcher = Arc::new(MockFetcher::new("direct"));
        let strategy = Strategy::new(fetcher, formatter, Duration::from_secs(5));

        assert!(!strategy.fetch("https://a.com").await.success);
        assert_eq!(completion.calls(), 0);
    }
}
