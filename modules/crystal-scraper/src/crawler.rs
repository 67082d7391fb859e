use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, REFERER, USER_AGENT};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, ScrapeError};
use crate::html;
use crate::links::{self, Origin};

/// Parameters for one bounded crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    pub root_url: String,
    /// Link hops from the root; the root itself is depth 0.
    pub max_depth: u8,
    pub same_origin: bool,
    pub continue_on_failure: bool,
    pub page_timeout: Duration,
    pub max_pages: usize,
}

impl CrawlRequest {
    pub fn new(root_url: impl Into<String>, max_depth: u8) -> Self {
        Self {
            root_url: root_url.into(),
            max_depth,
            same_origin: true,
            continue_on_failure: true,
            page_timeout: Duration::from_secs(30),
            max_pages: 50,
        }
    }

    pub fn page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }
}

/// One page returned by a crawl, before any text extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawledPage {
    pub url: String,
    pub title: Option<String>,
    pub raw_content: String,
}

/// Link-following crawl boundary.
///
/// Returns the pages that were actually fetched, in crawl order. An `Err`
/// means the crawl could not run at all.
#[async_trait]
pub trait SiteCrawler: Send + Sync {
    async fn crawl(&self, request: &CrawlRequest) -> Result<Vec<CrawledPage>>;
}

/// Breadth-first crawler over plain HTTP.
pub struct LinkCrawler {
    client: reqwest::Client,
}

impl LinkCrawler {
    pub fn new(user_agent: &str, referer: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent).context("Invalid user agent")?);
        headers.insert(REFERER, HeaderValue::from_str(referer).context("Invalid referer")?);
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// GET one page. `Ok(None)` when the response is not an HTML document.
    /// The returned URL is the one the body was served from after redirects.
    async fn fetch_page(&self, url: &str, timeout: Duration) -> anyhow::Result<Option<(Url, String)>> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {status}");
        }
        if !is_html(resp.headers()) {
            debug!(url, content_type = ?resp.headers().get(CONTENT_TYPE), "Not an HTML document, skipping");
            return Ok(None);
        }

        let final_url = resp.url().clone();
        let body = resp.text().await.context("Failed to read response body")?;
        Ok(Some((final_url, body)))
    }
}

/// A missing Content-Type is given the benefit of the doubt.
fn is_html(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return true;
    };
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("text/html") || content_type.contains("application/xhtml+xml")
}

/// Validate the crawl root: absolute http(s) with a host.
fn crawl_root(raw: &str) -> Result<Url> {
    let invalid = |reason: String| ScrapeError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let mut url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".into()));
    }
    url.set_fragment(None);
    Ok(url)
}

fn in_origin(origin: Option<&Origin>, link: &str) -> bool {
    match (origin, Url::parse(link)) {
        (Some(origin), Ok(url)) => origin.contains(&url),
        _ => false,
    }
}

#[async_trait]
impl SiteCrawler for LinkCrawler {
    async fn crawl(&self, request: &CrawlRequest) -> Result<Vec<CrawledPage>> {
        let root = crawl_root(&request.root_url)?;
        let mut origin = Origin::of(&root);

        info!(url = %root, max_depth = request.max_depth, "Starting crawl");

        let mut seen = HashSet::from([root.to_string()]);
        let mut queue = VecDeque::from([(root.to_string(), 0u8)]);
        let mut pages = Vec::new();

        while let Some((url, depth)) = queue.pop_front() {
            if pages.len() >= request.max_pages {
                debug!(max_pages = request.max_pages, "Crawl page limit reached");
                break;
            }

            let (final_url, body) = match self.fetch_page(&url, request.page_timeout).await {
                Ok(Some((final_url, body))) if !body.trim().is_empty() => (final_url, body),
                Ok(Some(_)) => {
                    warn!(url, "Crawled page was empty, skipping");
                    continue;
                }
                Ok(None) => continue,
                Err(e) if request.continue_on_failure => {
                    warn!(url, error = %format!("{e:#}"), "Crawl page failed, skipping");
                    continue;
                }
                Err(e) => return Err(ScrapeError::Crawl(format!("{url}: {e:#}"))),
            };

            if final_url.as_str() != url {
                // A redirected root (http to https, bare to www) defines the site.
                if depth == 0 {
                    origin = Origin::of(&final_url);
                } else if request.same_origin && !origin.as_ref().is_some_and(|o| o.contains(&final_url)) {
                    debug!(url, redirected_to = %final_url, "Redirected off-origin, skipping");
                    continue;
                }
                seen.insert(final_url.to_string());
            }

            let follow = depth < request.max_depth;
            let (title, body, found) = tokio::task::spawn_blocking(move || {
                let title = html::extract_title(&body);
                // Relative links resolve against where the body was actually served from.
                let found = if follow {
                    links::extract_page_links(&body, final_url.as_str())
                } else {
                    Vec::new()
                };
                (title, body, found)
            })
            .await
            .map_err(|e| ScrapeError::Crawl(format!("page parse task failed: {e}")))?;

            for link in found {
                if request.same_origin && !in_origin(origin.as_ref(), &link) {
                    continue;
                }
                if seen.insert(link.clone()) {
                    queue.push_back((link, depth + 1));
                }
            }

            debug!(url, depth, queued = queue.len(), "Crawled page");
            pages.push(CrawledPage {
                url,
                title,
                raw_content: body,
            });
        }

        info!(url = %root, pages = pages.len(), "Crawl finished");
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RunningSite, TestSite};

    fn crawler() -> LinkCrawler {
        LinkCrawler::new("test-agent", "https://www.google.com/").unwrap()
    }

    fn urls(pages: &[CrawledPage]) -> Vec<&str> {
        pages.iter().map(|p| p.url.as_str()).collect()
    }

    /// `/` links to `/about` and `/contact` next to stylesheet and icon
    /// references; `/about` links one level deeper to `/team`.
    async fn small_site() -> RunningSite {
        TestSite::new()
            .page(
                "/",
                r#"<html><head><title>Home</title>
                <link rel="stylesheet" href="/style.css"><link rel="icon" href="/favicon.ico">
                </head><body><a href="/about">About</a> <a href="/contact">Contact</a></body></html>"#,
            )
            .page("/about", r#"<html><body><a href="/team">Team</a></body></html>"#)
            .page("/contact", "<html><body>Call us</body></html>")
            .page("/team", "<html><body>The team</body></html>")
            .asset("/style.css", "text/css", "body { color: red }")
            .asset("/favicon.ico", "image/x-icon", "icon")
            .serve()
            .await
            .unwrap()
    }

    #[test]
    fn request_defaults_stay_in_origin_and_keep_going() {
        let request = CrawlRequest::new("https://example.com", 1);
        assert!(request.same_origin);
        assert!(request.continue_on_failure);
        assert_eq!(request.max_pages, 50);
    }

    #[test]
    fn crawl_root_strips_fragment() {
        let root = crawl_root("https://example.com/a#top").unwrap();
        assert_eq!(root.as_str(), "https://example.com/a");
    }

    #[test]
    fn crawl_root_rejects_bad_urls() {
        for bad in ["not a url", "ftp://example.com/", "mailto:someone@example.com", "file:///tmp/x"] {
            let err = crawl_root(bad).unwrap_err();
            assert!(matches!(err, ScrapeError::InvalidUrl { .. }), "{bad}: {err}");
        }
    }

    #[tokio::test]
    async fn invalid_root_fails_the_crawl() {
        let crawler = LinkCrawler::new("test-agent", "https://www.google.com/").unwrap();
        let err = crawler
            .crawl(&CrawlRequest::new("javascript:alert(1)", 1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("javascript:alert(1)"));
    }

    #[tokio::test]
    async fn unreachable_root_yields_no_pages() {
        let crawler = LinkCrawler::new("test-agent", "https://www.google.com/").unwrap();
        // Port 9 (discard) on loopback refuses connections.
        let request = CrawlRequest::new("http://127.0.0.1:9/", 1).page_timeout(Duration::from_secs(2));
        let pages = crawler.crawl(&request).await.unwrap();
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn depth_one_visits_root_then_linked_pages_in_order() {
        let site = small_site().await;

        let pages = crawler().crawl(&CrawlRequest::new(site.url("/"), 1)).await.unwrap();

        assert_eq!(urls(&pages), [site.url("/"), site.url("/about"), site.url("/contact")]);
        assert_eq!(pages[0].title.as_deref(), Some("Home"));
        assert!(pages[2].raw_content.contains("Call us"));
        assert_eq!(site.hit_count("/style.css"), 0);
        assert_eq!(site.hit_count("/favicon.ico"), 0);
        assert_eq!(site.hit_count("/team"), 0);
    }

    #[tokio::test]
    async fn depth_two_reaches_linked_pages_of_linked_pages() {
        let site = small_site().await;

        let pages = crawler().crawl(&CrawlRequest::new(site.url("/"), 2)).await.unwrap();

        assert_eq!(
            urls(&pages),
            [site.url("/"), site.url("/about"), site.url("/contact"), site.url("/team")]
        );
    }

    #[tokio::test]
    async fn links_to_other_hosts_and_ports_are_not_followed() {
        let site = TestSite::new()
            .page("/local", "<html><body>local</body></html>")
            .page("/elsewhere", "<html><body>elsewhere</body></html>")
            .serve()
            .await
            .unwrap();
        // localhost reaches the same server under a different host name.
        site.add_page(
            "/",
            &format!(
                r#"<a href="http://localhost:{port}/elsewhere">x</a>
                   <a href="http://127.0.0.1:1/other-port">y</a>
                   <a href="/local">z</a>"#,
                port = site.port()
            ),
        );

        let pages = crawler().crawl(&CrawlRequest::new(site.url("/"), 1)).await.unwrap();

        assert_eq!(urls(&pages), [site.url("/"), site.url("/local")]);
        assert_eq!(site.hit_count("/elsewhere"), 0);
    }

    #[tokio::test]
    async fn repeated_links_are_fetched_once() {
        let site = TestSite::new()
            .page("/", r##"<a href="/a">1</a><a href="/a#part">2</a><a href="/a">3</a>"##)
            .page("/a", r#"<a href="/">home</a><a href="/a">self</a><a href="/b">b</a>"#)
            .page("/b", r#"<a href="/a">a</a>"#)
            .serve()
            .await
            .unwrap();

        let pages = crawler().crawl(&CrawlRequest::new(site.url("/"), 2)).await.unwrap();

        assert_eq!(urls(&pages), [site.url("/"), site.url("/a"), site.url("/b")]);
        assert_eq!(site.hits(), ["/", "/a", "/b"]);
    }

    #[tokio::test]
    async fn page_cap_stops_the_crawl() {
        let links: String = (1..=5).map(|i| format!(r#"<a href="/p{i}">{i}</a>"#)).collect();
        let mut site = TestSite::new().page("/", &links);
        for i in 1..=5 {
            site = site.page(&format!("/p{i}"), "<html><body>page</body></html>");
        }
        let site = site.serve().await.unwrap();

        let request = CrawlRequest::new(site.url("/"), 1).max_pages(3);
        let pages = crawler().crawl(&request).await.unwrap();

        assert_eq!(urls(&pages), [site.url("/"), site.url("/p1"), site.url("/p2")]);
        assert_eq!(site.hit_count("/p3"), 0);
    }

    #[tokio::test]
    async fn failed_and_non_html_pages_are_skipped() {
        let site = TestSite::new()
            .page("/", r#"<a href="/gone">1</a><a href="/feed">2</a><a href="/broken">3</a><a href="/ok">4</a>"#)
            .asset("/feed", "application/rss+xml", "<rss><channel><title>News</title></channel></rss>")
            .status("/broken", 500)
            .page("/ok", "<html><body>fine</body></html>")
            .serve()
            .await
            .unwrap();

        let pages = crawler().crawl(&CrawlRequest::new(site.url("/"), 1)).await.unwrap();

        assert_eq!(urls(&pages), [site.url("/"), site.url("/ok")]);
        assert_eq!(site.hit_count("/feed"), 1);
    }

    #[tokio::test]
    async fn strict_crawl_fails_on_http_errors_but_not_on_non_html() {
        let site = TestSite::new()
            .page("/", r#"<a href="/feed">feed</a>"#)
            .asset("/feed", "application/json", "{}")
            .serve()
            .await
            .unwrap();
        let mut request = CrawlRequest::new(site.url("/"), 1);
        request.continue_on_failure = false;

        let pages = crawler().crawl(&request).await.unwrap();
        assert_eq!(urls(&pages), [site.url("/")]);

        let site = TestSite::new()
            .page("/", r#"<a href="/gone">gone</a>"#)
            .serve()
            .await
            .unwrap();
        let mut request = CrawlRequest::new(site.url("/"), 1);
        request.continue_on_failure = false;

        let err = crawler().crawl(&request).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Crawl(_)));
        assert!(err.to_string().contains("/gone"));
    }

    #[tokio::test]
    async fn redirected_page_resolves_links_from_its_final_url() {
        let site = TestSite::new()
            .page("/", r#"<a href="/old">docs</a>"#)
            .redirect("/old", "/docs/")
            .page("/docs/", r#"<a href="guide">guide</a><a href="/docs/">self</a>"#)
            .page("/docs/guide", "<html><body>the guide</body></html>")
            .serve()
            .await
            .unwrap();

        let pages = crawler().crawl(&CrawlRequest::new(site.url("/"), 2)).await.unwrap();

        assert_eq!(urls(&pages), [site.url("/"), site.url("/old"), site.url("/docs/guide")]);
        assert_eq!(site.hit_count("/guide"), 0);
        assert_eq!(site.hit_count("/docs/"), 1);
    }

    #[tokio::test]
    async fn redirected_root_sets_the_origin() {
        let target = TestSite::new()
            .page("/", r#"<a href="/next">next</a>"#)
            .page("/next", "<html><body>next</body></html>")
            .serve()
            .await
            .unwrap();
        let entry = TestSite::new().redirect("/", &target.url("/")).serve().await.unwrap();

        let pages = crawler().crawl(&CrawlRequest::new(entry.url("/"), 1)).await.unwrap();

        assert_eq!(urls(&pages), [entry.url("/"), target.url("/next")]);
    }

    #[test]
    fn content_type_check() {
        let mut headers = HeaderMap::new();
        assert!(is_html(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("TEXT/HTML; charset=utf-8"));
        assert!(is_html(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xhtml+xml"));
        assert!(is_html(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/css"));
        assert!(!is_html(&headers));
    }
}
