// Test doubles for the three trait boundaries:
// - MockFetcher (PageFetcher): HashMap-based URL→HTML or error
// - MockCrawler (SiteCrawler): scripted page list or crawl failure
// - MockCompletion (TextCompletion): fixed reply or failure
// - TestSite: loopback HTTP server for exercising the real LinkCrawler

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use ai_client::{AiError, Message, TextCompletion};

use crate::crawler::{CrawlRequest, CrawledPage, SiteCrawler};
use crate::error::ScrapeError;
use crate::fetchers::{page_from_parsed, FetchedPage, PageFetcher};
use crate::html;

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

enum Scripted {
    Html(String),
    Error(String),
}

/// HashMap-based page fetcher. Returns `Err` for unregistered URLs.
/// Builder pattern: `.on_html()`, `.on_error()`, `.with_delay()`.
pub struct MockFetcher {
    name: String,
    pages: HashMap<String, Scripted>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pages: HashMap::new(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Serve `html` for `url`; it goes through the same parsing as a real fetch.
    pub fn on_html(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), Scripted::Html(html.to_string()));
        self
    }

    pub fn on_error(mut self, url: &str, message: &str) -> Self {
        self.pages.insert(url.to_string(), Scripted::Error(message.to_string()));
        self
    }

    /// Sleep on the tokio clock before answering, so paused-time tests can
    /// drive timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.pages.get(url) {
            // Parsed inline: paused-clock tests must not wait on the blocking pool.
            Some(Scripted::Html(raw)) => {
                page_from_parsed(url, html::parse_page(raw), raw.clone(), &self.name)
            }
            Some(Scripted::Error(message)) => Err(anyhow!("{message}")),
            None => Err(anyhow!("MockFetcher: no page registered for {url}")),
        }
    }
}

// ---------------------------------------------------------------------------
// MockCrawler
// ---------------------------------------------------------------------------

/// Crawler that returns a fixed page list, or fails, and records each request.
pub struct MockCrawler {
    pages: Vec<CrawledPage>,
    failure: Option<String>,
    requests: Mutex<Vec<CrawlRequest>>,
}

impl MockCrawler {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn on_page(mut self, url: &str, title: Option<&str>, raw_content: &str) -> Self {
        self.pages.push(CrawledPage {
            url: url.to_string(),
            title: title.map(str::to_string),
            raw_content: raw_content.to_string(),
        });
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<CrawlRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl Default for MockCrawler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SiteCrawler for MockCrawler {
    async fn crawl(&self, request: &CrawlRequest) -> crate::error::Result<Vec<CrawledPage>> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.failure {
            Some(message) => Err(ScrapeError::Crawl(message.clone())),
            None => Ok(self.pages.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockCompletion
// ---------------------------------------------------------------------------

/// Completion service with a canned reply or a canned failure.
pub struct MockCompletion {
    reply: std::result::Result<String, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletion {
    pub fn replying(reply: &str) -> Self {
        Self::with_reply(Ok(reply.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_reply(Err(message.to_string()))
    }

    fn with_reply(reply: std::result::Result<String, String>) -> Self {
        Self {
            reply,
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The user message of the most recent call.
    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextCompletion for MockCompletion {
    async fn complete(&self, messages: Vec<Message>) -> ai_client::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(user) = messages.iter().rev().find(|m| m.role == ai_client::MessageRole::User) {
            self.prompts.lock().unwrap().push(user.content.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.reply.clone().map_err(|message| AiError::Api {
            status: 429,
            message,
        })
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

// ---------------------------------------------------------------------------
// TestSite
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Route {
    status: u16,
    content_type: String,
    location: Option<String>,
    body: String,
}

impl Route {
    fn ok(content_type: &str, body: &str) -> Self {
        Self {
            status: 200,
            content_type: content_type.to_string(),
            location: None,
            body: body.to_string(),
        }
    }
}

type Routes = Arc<Mutex<HashMap<String, Route>>>;

/// Path-routed HTTP/1.1 server on 127.0.0.1. Unregistered paths answer 404.
/// Builder pattern: `.page()`, `.asset()`, `.status()`, `.redirect()`.
#[derive(Default)]
pub struct TestSite {
    routes: HashMap<String, Route>,
}

impl TestSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, path: &str, html: &str) -> Self {
        self.asset(path, "text/html; charset=utf-8", html)
    }

    pub fn asset(mut self, path: &str, content_type: &str, body: &str) -> Self {
        self.routes.insert(path.to_string(), Route::ok(content_type, body));
        self
    }

    pub fn status(mut self, path: &str, status: u16) -> Self {
        self.routes.insert(
            path.to_string(),
            Route {
                status,
                content_type: "text/html".to_string(),
                location: None,
                body: format!("<html><body>status {status}</body></html>"),
            },
        );
        self
    }

    /// 301 to `location`, which may be relative.
    pub fn redirect(mut self, path: &str, location: &str) -> Self {
        self.routes.insert(
            path.to_string(),
            Route {
                status: 301,
                content_type: "text/html".to_string(),
                location: Some(location.to_string()),
                body: String::new(),
            },
        );
        self
    }

    pub async fn serve(self) -> std::io::Result<RunningSite> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let routes = Arc::new(Mutex::new(self.routes));
        let hits = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn({
            let routes = routes.clone();
            let hits = hits.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(answer(stream, routes.clone(), hits.clone()));
                }
            }
        });

        Ok(RunningSite {
            port,
            routes,
            hits,
            task,
        })
    }
}

async fn answer(stream: TcpStream, routes: Routes, hits: Arc<Mutex<Vec<String>>>) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.is_err() {
        return;
    }
    // Drain headers; requests carry no body.
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) if line == "\r\n" || line == "\n" => break,
            Ok(_) => {}
        }
    }

    let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
    hits.lock().unwrap().push(path.clone());

    let route = routes.lock().unwrap().get(&path).cloned().unwrap_or(Route {
        status: 404,
        content_type: "text/plain".to_string(),
        location: None,
        body: "not found".to_string(),
    });
    let location = route
        .location
        .map(|l| format!("Location: {l}\r\n"))
        .unwrap_or_default();
    let response = format!(
        "HTTP/1.1 {} Status\r\nContent-Type: {}\r\nContent-Length: {}\r\n{location}Connection: close\r\n\r\n{}",
        route.status,
        route.content_type,
        route.body.len(),
        route.body,
    );

    let mut stream = reader.into_inner();
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// A served [`TestSite`]. The server stops when this is dropped.
pub struct RunningSite {
    port: u16,
    routes: Routes,
    hits: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl RunningSite {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Absolute URL for `path` on this site.
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }

    /// Serve `html` at `path` from now on. For pages that link to the
    /// site's own port.
    pub fn add_page(&self, path: &str, html: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Route::ok("text/html; charset=utf-8", html));
    }

    /// Request paths in arrival order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hit_count(&self, path: &str) -> usize {
        self.hits().iter().filter(|p| *p == path).count()
    }
}

impl Drop for RunningSite {
    fn drop(&mut self) {
        self.task.abort();
    }
}
