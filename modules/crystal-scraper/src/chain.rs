use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::content::ScrapedContent;
use crate::strategy::Strategy;

/// Ordered fallback over fetch strategies, fronted by the result cache.
///
/// Strategies run cheapest first; the first success is cached and returned.
/// Calls for the same URL are serialized on a per-URL lock so the
/// check-fetch-store sequence is atomic per key; a second caller waits and
/// then finds the first caller's result in the cache.
pub struct StrategyChain {
    strategies: Vec<Strategy>,
    cache: Option<Arc<ResultCache>>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

/// One caller's handle on a per-URL lock. Dropping it, on return or when the
/// caller's future is cancelled, removes the map entry once no other caller
/// holds or waits on it.
struct InflightSlot<'a> {
    inflight: &'a DashMap<String, Arc<Mutex<()>>>,
    url: &'a str,
    lock: Arc<Mutex<()>>,
}

impl<'a> InflightSlot<'a> {
    fn claim(inflight: &'a DashMap<String, Arc<Mutex<()>>>, url: &'a str) -> Self {
        let lock = inflight
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self { inflight, url, lock }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        // Two handles left: the map's and ours.
        self.inflight.remove_if(self.url, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

impl StrategyChain {
    pub fn new(strategies: Vec<Strategy>, cache: Option<Arc<ResultCache>>) -> Self {
        Self {
            strategies,
            cache,
            inflight: DashMap::new(),
        }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(Strategy::name).collect()
    }

    pub fn cache(&self) -> Option<&Arc<ResultCache>> {
        self.cache.as_ref()
    }

    pub async fn resolve(&self, url: &str) -> ScrapedContent {
        info!(url, "Scraping");

        let Some(cache) = self.cache.as_ref() else {
            return self.run_strategies(url).await;
        };

        if let Some(hit) = cache.get(url) {
            debug!(url, "Cache hit");
            return hit;
        }

        let slot = InflightSlot::claim(&self.inflight, url);
        let _guard = slot.lock.lock().await;

        // Someone holding the lock before us may have filled the cache.
        if let Some(hit) = cache.get(url) {
            debug!(url, "Cache hit after waiting on in-flight scrape");
            return hit;
        }

        let result = self.run_strategies(url).await;
        if result.success {
            cache.set(url, result.clone());
        }
        result
    }

    async fn run_strategies(&self, url: &str) -> ScrapedContent {
        let start = Instant::now();
        let mut last_failure: Option<(String, String)> = None;

        for strategy in &self.strategies {
            let result = strategy.fetch(url).await;
            debug!(url, strategy = strategy.name(), secs = result.scrape_time, "Strategy finished");

            if result.success {
                return result;
            }

            let error = result.error.unwrap_or_default();
            warn!(url, strategy = strategy.name(), error = %error, "Strategy failed");
            last_failure = Some((strategy.name().to_string(), error));
        }

        let error = match last_failure {
            Some((name, error)) => {
                format!("All strategies failed (last error from {name}: {error})")
            }
            None => "All strategies failed".to_string(),
        };
        warn!(url, "All strategies failed");
        ScrapedContent::failure(url, error, start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::formatter::ContentFormatter;
    use crate::testing::MockFetcher;

    const URL: &str = "https://example.com/";
    const PAGE: &str = "<html><title>T</title><body>Hello</body></html>";

    fn strategy(fetcher: &Arc<MockFetcher>) -> Strategy {
        Strategy::new(fetcher.clone(), ContentFormatter::disabled(), Duration::from_secs(45))
    }

    fn chain(fetchers: &[&Arc<MockFetcher>], cache: Option<Arc<ResultCache>>) -> StrategyChain {
        StrategyChain::new(fetchers.iter().map(|f| strategy(f)).collect(), cache)
    }

    #[tokio::test]
    async fn cheapest_success_short_circuits() {
        let direct = Arc::new(MockFetcher::new("direct").on_html(URL, PAGE));
        let browserless = Arc::new(MockFetcher::new("browserless").on_html(URL, PAGE));
        let chrome = Arc::new(MockFetcher::new("chrome").on_html(URL, PAGE));
        let chain = chain(&[&direct, &browserless, &chrome], None);

        let result = chain.resolve(URL).await;
        assert!(result.success);
        assert_eq!(result.title, "T");
        assert!(result.text.contains("Hello"));
        assert_eq!(direct.calls(), 1);
        assert_eq!(browserless.calls(), 0);
        assert_eq!(chrome.calls(), 0);
    }

    #[tokio::test]
    async fn escalates_in_order_until_success() {
        let direct = Arc::new(MockFetcher::new("direct").on_error(URL, "HTTP 403 Forbidden"));
        let browserless = Arc::new(MockFetcher::new("browserless").on_error(URL, "connection refused"));
        let chrome = Arc::new(MockFetcher::new("chrome").on_html(URL, PAGE));
        let chain = chain(&[&direct, &browserless, &chrome], None);

        let result = chain.resolve(URL).await;
        assert!(result.success);
        assert_eq!(result.metadata["strategy"], "chrome");
        assert_eq!((direct.calls(), browserless.calls(), chrome.calls()), (1, 1, 1));
    }

    #[tokio::test]
    async fn exhausted_chain_reports_last_error() {
        let direct = Arc::new(MockFetcher::new("direct").on_error(URL, "HTTP 403 Forbidden"));
        let browserless = Arc::new(MockFetcher::new("browserless").on_error(URL, "502 Bad Gateway"));
        let chrome = Arc::new(MockFetcher::new("chrome").on_error(URL, "Chrome exited with 1"));
        let chain = chain(&[&direct, &browserless, &chrome], None);

        let result = chain.resolve(URL).await;
        assert!(!result.success);
        let error = result.error.as_deref().unwrap();
        assert!(error.starts_with("All strategies failed"));
        assert!(error.contains("chrome"));
        assert!(error.contains("Chrome exited with 1"));
        assert!(result.scrape_time > 0.0);
    }

    #[tokio::test]
    async fn empty_chain_is_a_generic_failure() {
        let chain = StrategyChain::new(Vec::new(), None);
        let result = chain.resolve(URL).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("All strategies failed"));
    }

    #[tokio::test]
    async fn cache_hit_skips_every_strategy() {
        let direct = Arc::new(MockFetcher::new("direct").on_html(URL, PAGE));
        let cache = Arc::new(ResultCache::new(Duration::from_secs(3600)));
        let chain = chain(&[&direct], Some(cache.clone()));

        let first = chain.resolve(URL).await;
        let second = chain.resolve(URL).await;

        assert_eq!(direct.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let direct = Arc::new(MockFetcher::new("direct").on_error(URL, "timeout"));
        let cache = Arc::new(ResultCache::new(Duration::from_secs(3600)));
        let chain = chain(&[&direct], Some(cache.clone()));

        chain.resolve(URL).await;
        chain.resolve(URL).await;

        assert_eq!(direct.calls(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_a_refetch() {
        let direct = Arc::new(MockFetcher::new("direct").on_html(URL, PAGE));
        let cache = Arc::new(ResultCache::new(Duration::from_secs(60)));
        let chain = chain(&[&direct], Some(cache));

        chain.resolve(URL).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        chain.resolve(URL).await;

        assert_eq!(direct.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_for_one_url_fetch_once() {
        let direct = Arc::new(
            MockFetcher::new("direct")
                .on_html(URL, PAGE)
                .with_delay(Duration::from_secs(2)),
        );
        let cache = Arc::new(ResultCache::new(Duration::from_secs(3600)));
        let chain = Arc::new(chain(&[&direct], Some(cache)));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let chain = chain.clone();
                tokio::spawn(async move { chain.resolve(URL).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().success);
        }
        assert_eq!(direct.calls(), 1);
        assert!(chain.inflight.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn different_urls_do_not_wait_on_each_other() {
        let other = "https://example.org/";
        let direct = Arc::new(
            MockFetcher::new("direct")
                .on_html(URL, PAGE)
                .on_html(other, PAGE)
                .with_delay(Duration::from_secs(10)),
        );
        let cache = Arc::new(ResultCache::new(Duration::from_secs(3600)));
        let chain = Arc::new(chain(&[&direct], Some(cache)));

        let started = tokio::time::Instant::now();
        let (a, b) = tokio::join!(chain.resolve(URL), chain.resolve(other));
        assert!(a.success && b.success);
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_callers_leave_no_lock_behind() {
        let direct = Arc::new(
            MockFetcher::new("direct")
                .on_html(URL, PAGE)
                .with_delay(Duration::from_secs(10)),
        );
        let cache = Arc::new(ResultCache::new(Duration::from_secs(3600)));
        let chain = Arc::new(chain(&[&direct], Some(cache.clone())));

        // One caller holds the lock mid-fetch, the other waits on it.
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let chain = chain.clone();
                tokio::spawn(async move { chain.resolve(URL).await })
            })
            .collect();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(chain.inflight.len(), 1);
        assert_eq!(direct.calls(), 1);

        for handle in handles {
            handle.abort();
            assert!(handle.await.unwrap_err().is_cancelled());
        }

        assert!(chain.inflight.is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_caller_leaves_no_lock_behind() {
        let direct = Arc::new(
            MockFetcher::new("direct")
                .on_html(URL, PAGE)
                .with_delay(Duration::from_secs(10)),
        );
        let cache = Arc::new(ResultCache::new(Duration::from_secs(3600)));
        let chain = chain(&[&direct], Some(cache));

        let outcome = tokio::time::timeout(Duration::from_secs(1), chain.resolve(URL)).await;

        assert!(outcome.is_err());
        assert!(chain.inflight.is_empty());

        // A later caller is not blocked by the abandoned attempt.
        assert!(chain.resolve(URL).await.success);
        assert!(chain.inflight.is_empty());
    }
}
