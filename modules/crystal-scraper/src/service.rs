use std::sync::Arc;
use std::time::Instant;

use ai_client::TextCompletion;
use tracing::{info, warn};

use crate::cache::ResultCache;
use crate::chain::StrategyChain;
use crate::config::ScraperConfig;
use crate::content::ScrapedContent;
use crate::crawler::{CrawlRequest, LinkCrawler, SiteCrawler};
use crate::error::Result;
use crate::fetchers::{BrowserlessFetcher, ChromeFetcher, DirectFetcher, PageFetcher};
use crate::formatter::ContentFormatter;
use crate::recursive::{self, MAX_RECURSION_DEPTH};
use crate::strategy::Strategy;

/// Caller-facing scraping facade.
///
/// Cheap to clone; clones share the cache, the fetchers and the crawler.
#[derive(Clone)]
pub struct Scraper {
    config: Arc<ScraperConfig>,
    /// Caller opt-in to LLM formatting, as passed to [`Scraper::new`].
    formatting_requested: bool,
    formatter: ContentFormatter,
    fetchers: Vec<Arc<dyn PageFetcher>>,
    cache: Option<Arc<ResultCache>>,
    chain: Arc<StrategyChain>,
    crawler: Arc<dyn SiteCrawler>,
}

impl Scraper {
    /// Build the default stack: direct HTTP, then Browserless when an endpoint
    /// is configured, then local Chromium.
    pub fn new(config: ScraperConfig, formatting_enabled: bool) -> Result<Self> {
        let mut fetchers: Vec<Arc<dyn PageFetcher>> = vec![Arc::new(DirectFetcher::new(
            config.fetch_timeout,
            &config.user_agent,
            &config.referer,
        )?)];

        match config.browserless_url.as_deref() {
            Some(base_url) => fetchers.push(Arc::new(BrowserlessFetcher::new(
                base_url,
                config.browserless_token.as_deref(),
                config.fetch_timeout,
            )?)),
            None => info!("BROWSERLESS_URL not set, skipping the Browserless strategy"),
        }

        fetchers.push(Arc::new(ChromeFetcher::new(
            config.chrome_bin.clone(),
            config.chrome_settle,
            config.fetch_timeout,
        )));

        let crawler = Arc::new(LinkCrawler::new(&config.user_agent, &config.referer)?);
        let formatter = ContentFormatter::from_config(&config.llm, formatting_enabled);
        let cache = config
            .cache_enabled
            .then(|| Arc::new(ResultCache::new(config.cache_ttl)));

        let scraper = Self::assemble(config, formatting_enabled, formatter, fetchers, cache, crawler);
        info!(
            strategies = ?scraper.strategy_names(),
            cache = scraper.cache.is_some(),
            formatting = scraper.formatter.is_enabled(),
            "Scraper initialized"
        );
        Ok(scraper)
    }

    /// Build from environment variables.
    pub fn from_env(formatting_enabled: bool) -> Result<Self> {
        let config = ScraperConfig::from_env();
        config.log_redacted();
        Self::new(config, formatting_enabled)
    }

    fn assemble(
        config: ScraperConfig,
        formatting_requested: bool,
        formatter: ContentFormatter,
        fetchers: Vec<Arc<dyn PageFetcher>>,
        cache: Option<Arc<ResultCache>>,
        crawler: Arc<dyn SiteCrawler>,
    ) -> Self {
        let chain = Self::build_chain(&config, &formatter, &fetchers, cache.clone());
        Self {
            config: Arc::new(config),
            formatting_requested,
            formatter,
            fetchers,
            cache,
            chain,
            crawler,
        }
    }

    fn build_chain(
        config: &ScraperConfig,
        formatter: &ContentFormatter,
        fetchers: &[Arc<dyn PageFetcher>],
        cache: Option<Arc<ResultCache>>,
    ) -> Arc<StrategyChain> {
        let strategies = fetchers
            .iter()
            .map(|f| Strategy::new(f.clone(), formatter.clone(), config.attempt_timeout))
            .collect();
        Arc::new(StrategyChain::new(strategies, cache))
    }

    fn rebuild_chain(mut self) -> Self {
        self.chain = Self::build_chain(&self.config, &self.formatter, &self.fetchers, self.cache.clone());
        self
    }

    /// Replace the fetch strategies, cheapest first.
    pub fn with_strategies(mut self, fetchers: Vec<Arc<dyn PageFetcher>>) -> Self {
        self.fetchers = fetchers;
        self.rebuild_chain()
    }

    pub fn with_crawler(mut self, crawler: Arc<dyn SiteCrawler>) -> Self {
        self.crawler = crawler;
        self
    }

    /// Format with `completion` instead of the configured provider. Ignored
    /// when formatting was turned off by the caller or by config.
    pub fn with_completion(mut self, completion: Arc<dyn TextCompletion>) -> Self {
        if !self.formatting_requested || !self.config.llm.enabled {
            info!(model = completion.model(), "LLM formatting is off, ignoring completion service");
            return self;
        }
        self.formatter = ContentFormatter::new(completion, self.config.llm.timeout);
        self.rebuild_chain()
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<ResultCache>> {
        self.cache.as_ref()
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.chain.strategy_names()
    }

    pub fn formatting_enabled(&self) -> bool {
        self.formatter.is_enabled()
    }

    /// Scrape one page through the strategy chain.
    pub async fn scrape_url(&self, url: &str) -> ScrapedContent {
        self.chain.resolve(url).await
    }

    /// Scrape `url` and the same-origin pages up to `max_depth` link hops away,
    /// folded into one result. Depth 0 is a plain [`Scraper::scrape_url`];
    /// depths above 2 are clamped.
    pub async fn scrape_recursive(&self, url: &str, max_depth: u8) -> ScrapedContent {
        let depth = if max_depth > MAX_RECURSION_DEPTH {
            warn!(url, requested = max_depth, max = MAX_RECURSION_DEPTH, "Clamping recursion depth");
            MAX_RECURSION_DEPTH
        } else {
            max_depth
        };

        if depth == 0 {
            return self.scrape_url(url).await;
        }

        let start = Instant::now();
        info!(url, depth, "Starting recursive scrape");

        let request = CrawlRequest::new(url, depth)
            .page_timeout(self.config.fetch_timeout)
            .max_pages(self.config.max_crawl_pages);

        match self.crawler.crawl(&request).await {
            Ok(pages) if pages.is_empty() => {
                warn!(url, "Crawl found no pages, falling back to single page");
                self.scrape_url(url).await
            }
            Ok(pages) => {
                let first_title = pages[0].title.clone();
                let sections = recursive::prepare_sections(pages, &self.formatter).await;
                let result = recursive::aggregate(url, first_title.as_deref(), &sections, depth, start.elapsed());
                info!(url, pages = sections.len(), secs = result.scrape_time, "Recursive scrape finished");
                result
            }
            Err(e) => {
                warn!(url, error = %e, "Recursive scrape failed, falling back to single page");
                let reason = e.to_string();
                recursive::annotate_fallback(self.scrape_url(url).await, depth, &reason)
            }
        }
    }

    /// Release shared state. Clones keep working but start from a cold cache.
    pub fn shutdown(&self) {
        if let Some(cache) = &self.cache {
            info!(entries = cache.len(), "Clearing scrape cache");
            cache.clear();
        }
        info!("Scraper shut down");
    }
}

impl std::fmt::Debug for Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scraper")
            .field("strategies", &self.strategy_names())
            .field("cache", &self.cache.is_some())
            .field("formatter", &self.formatter)
            .finish()
    }
}
