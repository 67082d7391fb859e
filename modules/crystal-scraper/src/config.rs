use std::env;
use std::str::FromStr;
use std::time::Duration;

use ai_client::Provider;
use tracing::{info, warn};

/// Desktop Chrome user agent; plain library user agents get bot-gated.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";
pub const DEFAULT_REFERER: &str = "https://www.google.com/";

/// Scraper configuration. `Default` carries the production defaults;
/// [`ScraperConfig::from_env`] overlays environment variables on top.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    // Cache
    pub cache_enabled: bool,
    pub cache_ttl: Duration,

    // Fetching
    pub fetch_timeout: Duration,
    /// Outer deadline per strategy attempt. Sits above `fetch_timeout` so a
    /// fetcher's own transport timeout fires first and reports a precise error.
    pub attempt_timeout: Duration,
    pub user_agent: String,
    pub referer: String,

    // Browsers
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
    pub chrome_bin: String,
    pub chrome_settle: Duration,

    // Crawling
    pub max_crawl_pages: usize,

    // LLM formatting
    pub llm: LlmConfig,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub enabled: bool,
    /// Explicit provider; `None` means detect from whichever API key is set.
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: Duration::from_secs(86_400),
            fetch_timeout: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(45),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            browserless_url: None,
            browserless_token: None,
            chrome_bin: "chromium".to_string(),
            chrome_settle: Duration::from_secs(2),
            max_crawl_pages: 50,
            llm: LlmConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: None,
            model: None,
            api_key: None,
            temperature: 0.2,
            max_tokens: 20_000,
            timeout: Duration::from_secs(120),
        }
    }
}

impl ScraperConfig {
    /// Load configuration from environment variables, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let fetch_timeout = parsed(&lookup, "SCRAPER_FETCH_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.fetch_timeout);

        Self {
            cache_enabled: flag(&lookup, "SCRAPER_CACHE_ENABLED").unwrap_or(defaults.cache_enabled),
            cache_ttl: parsed(&lookup, "SCRAPER_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            fetch_timeout,
            attempt_timeout: defaults.attempt_timeout.max(fetch_timeout + Duration::from_secs(15)),
            user_agent: non_empty(&lookup, "SCRAPER_USER_AGENT").unwrap_or(defaults.user_agent),
            referer: non_empty(&lookup, "SCRAPER_REFERER").unwrap_or(defaults.referer),
            browserless_url: non_empty(&lookup, "BROWSERLESS_URL"),
            browserless_token: non_empty(&lookup, "BROWSERLESS_TOKEN"),
            chrome_bin: non_empty(&lookup, "CHROME_BIN").unwrap_or(defaults.chrome_bin),
            chrome_settle: parsed(&lookup, "CHROME_SETTLE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.chrome_settle),
            max_crawl_pages: parsed(&lookup, "SCRAPER_MAX_CRAWL_PAGES")
                .unwrap_or(defaults.max_crawl_pages),
            llm: LlmConfig::from_lookup(&lookup),
        }
    }

    /// Log the effective configuration without secrets.
    pub fn log_redacted(&self) {
        info!(
            cache_enabled = self.cache_enabled,
            cache_ttl_secs = self.cache_ttl.as_secs(),
            fetch_timeout_secs = self.fetch_timeout.as_secs(),
            browserless = self.browserless_url.as_deref().unwrap_or("(disabled)"),
            browserless_token = if self.browserless_token.is_some() { "set" } else { "unset" },
            chrome_bin = %self.chrome_bin,
            max_crawl_pages = self.max_crawl_pages,
            llm_enabled = self.llm.enabled,
            llm_provider = ?self.llm.provider,
            llm_api_key = if self.llm.api_key.is_some() { "set" } else { "unset" },
            "Scraper config"
        );
    }
}

impl LlmConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let provider = non_empty(lookup, "LLM_PROVIDER").and_then(|name| match name.parse::<Provider>() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %e, "Ignoring LLM_PROVIDER; falling back to key detection");
                None
            }
        });

        // An explicit provider reads its own key; otherwise try them in detection order.
        let (provider, api_key) = match provider {
            Some(p) => (Some(p), non_empty(lookup, p.api_key_env())),
            None => match Provider::detect(|key| lookup(key)) {
                Some((p, key)) => (Some(p), Some(key)),
                None => (None, None),
            },
        };

        Self {
            enabled: flag(lookup, "LLM_ENABLED").unwrap_or(defaults.enabled),
            provider,
            model: non_empty(lookup, "LLM_MODEL"),
            api_key,
            temperature: parsed(lookup, "LLM_TEMPERATURE").unwrap_or(defaults.temperature),
            max_tokens: parsed(lookup, "LLM_MAX_TOKENS").unwrap_or(defaults.max_tokens),
            timeout: parsed(lookup, "LLM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Model to request: explicit override, else the provider's default.
    pub fn resolved_model(&self) -> Option<String> {
        self.model
            .clone()
            .or_else(|| self.provider.map(|p| p.default_model().to_string()))
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = non_empty(lookup, key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Unparseable config value, using default");
            None
        }
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let raw = non_empty(lookup, key)?;
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(key, value = %raw, "Unparseable boolean, using default");
            None
        }
    }
}
