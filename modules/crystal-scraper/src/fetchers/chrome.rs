use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::{page_from_html, require_http_url, FetchedPage, PageFetcher};

/// Max concurrent Chromium processes. Each instance is heavy (~100MB+ RSS).
const MAX_CONCURRENT_CHROME: usize = 2;
/// Max attempts when Chromium cannot even be started (fork/resource exhaustion).
const CHROME_MAX_ATTEMPTS: u32 = 2;
/// Base backoff before retrying a transient launch failure. Jitter is added on top.
const CHROME_RETRY_BASE: Duration = Duration::from_secs(1);

/// Local headless Chromium: launch, let the page settle for a fixed virtual
/// time budget, dump the rendered DOM.
pub struct ChromeFetcher {
    chrome_bin: String,
    settle: Duration,
    timeout: Duration,
    semaphore: Semaphore,
}

impl ChromeFetcher {
    pub fn new(chrome_bin: impl Into<String>, settle: Duration, timeout: Duration) -> Self {
        let chrome_bin = chrome_bin.into();
        info!(
            chrome_bin = %chrome_bin,
            settle_ms = settle.as_millis() as u64,
            "ChromeFetcher initialized (max_concurrent={MAX_CONCURRENT_CHROME})"
        );
        Self {
            chrome_bin,
            settle,
            timeout,
            semaphore: Semaphore::new(MAX_CONCURRENT_CHROME),
        }
    }

    fn args(&self, profile_dir: &std::path::Path, url: &str) -> Vec<String> {
        vec![
            "--headless".to_string(),
            "--no-sandbox".to_string(),
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            format!("--user-data-dir={}", profile_dir.display()),
            format!("--virtual-time-budget={}", self.settle.as_millis()),
            "--dump-dom".to_string(),
            url.to_string(),
        ]
    }

    /// Launch Chromium with `--dump-dom` and return its stdout.
    ///
    /// The child is spawned with `kill_on_drop`, so every exit from this
    /// function (success, error, or the timeout dropping the future) tears the
    /// process down. The throwaway profile directory is removed when `tmp_dir`
    /// drops.
    async fn run_chrome(&self, url: &str) -> Result<Vec<u8>> {
        for attempt in 0..CHROME_MAX_ATTEMPTS {
            let tmp_dir = tempfile::tempdir().context("Failed to create temp profile dir")?;

            let child = tokio::process::Command::new(&self.chrome_bin)
                .args(self.args(tmp_dir.path(), url))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn();

            let child = match child {
                Ok(child) => child,
                Err(e) => {
                    if is_transient_error(&e.to_string()) && attempt + 1 < CHROME_MAX_ATTEMPTS {
                        warn!(url, attempt = attempt + 1, error = %e, "Chrome launch failed, retrying");
                        retry_with_backoff(attempt).await;
                        continue;
                    }
                    anyhow::bail!("Failed to launch {}: {e}", self.chrome_bin);
                }
            };

            let output = tokio::time::timeout(self.timeout, child.wait_with_output())
                .await
                .map_err(|_| anyhow::anyhow!("Chrome timed out after {}s", self.timeout.as_secs()))?
                .context("Failed to collect Chrome output")?;

            if output.status.success() {
                return Ok(output.stdout);
            }

            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_transient_error(&stderr) && attempt + 1 < CHROME_MAX_ATTEMPTS {
                warn!(url, attempt = attempt + 1, "Chrome cannot fork, retrying");
                retry_with_backoff(attempt).await;
                continue;
            }
            warn!(url, fetcher = "chrome", stderr = %stderr, "Chrome exited with error");
            anyhow::bail!("Chrome exited with {}", output.status);
        }

        anyhow::bail!("Chrome could not be started after {CHROME_MAX_ATTEMPTS} attempts")
    }
}

#[async_trait]
impl PageFetcher for ChromeFetcher {
    fn name(&self) -> &str {
        "chrome"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        require_http_url(url)?;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| anyhow::anyhow!("Chrome semaphore closed"))?;

        info!(url, fetcher = "chrome", "Fetching page");

        let html_bytes = self.run_chrome(url).await?;
        let raw_html = String::from_utf8_lossy(&html_bytes).into_owned();
        let page = page_from_html(url, raw_html, "chrome").await?;

        info!(url, fetcher = "chrome", bytes = page.raw_html.len(), "Fetched successfully");
        Ok(page)
    }
}

fn is_transient_error(msg: &str) -> bool {
    msg.contains("Cannot fork") || msg.contains("Resource temporarily unavailable")
}

async fn retry_with_backoff(attempt: u32) {
    let backoff = CHROME_RETRY_BASE * 3u32.pow(attempt);
    let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
    tokio::time::sleep(backoff + jitter).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_carry_settle_budget_and_profile() {
        let fetcher = ChromeFetcher::new(
            "chromium",
            Duration::from_millis(2000),
            Duration::from_secs(30),
        );
        let args = fetcher.args(std::path::Path::new("/tmp/profile"), "https://example.com");
        assert!(args.contains(&"--virtual-time-budget=2000".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--dump-dom".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com"));
    }

    #[test]
    fn transient_errors_are_recognised() {
        assert!(is_transient_error("[123:123] Cannot fork: Resource temporarily unavailable"));
        assert!(!is_transient_error("No such file or directory"));
    }

    #[tokio::test]
    async fn missing_binary_is_a_failure() {
        let fetcher = ChromeFetcher::new(
            "/nonexistent/chromium-for-tests",
            Duration::from_millis(10),
            Duration::from_secs(5),
        );
        let err = fetcher.fetch("https://example.com").await.unwrap_err();
        assert!(err.to_string().contains("Failed to launch"));
    }

    #[tokio::test]
    async fn non_http_urls_never_launch_chrome() {
        let fetcher = ChromeFetcher::new(
            "/nonexistent/chromium-for-tests",
            Duration::from_millis(10),
            Duration::from_secs(5),
        );
        let err = fetcher.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(err.to_string().contains("Only http/https"));
    }
}
