// Folding crawled pages into one composite result, and annotating the
// single-page fallback when the crawl could not run.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::content::{meta, ScrapedContent, RECURSIVE_CONTENT_TYPE};
use crate::crawler::CrawledPage;
use crate::formatter::ContentFormatter;
use crate::html;

/// Deepest recursion a caller may request.
pub const MAX_RECURSION_DEPTH: u8 = 2;

/// Per-page formatter calls in flight at once.
const FORMAT_CONCURRENCY: usize = 4;

const RULE_WIDTH: usize = 80;

pub const FALLBACK_TITLE_SUFFIX: &str = " (Recursive attempt failed, single page only)";

/// One crawled page after text extraction and formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageSection {
    pub url: String,
    pub title: String,
    pub text: String,
}

/// Readable text of a crawled page. Markup is stripped of scripts, styles and
/// navigation; anything else is taken as already-extracted text.
async fn page_text(raw: String) -> String {
    if !html::looks_like_markup(&raw) {
        return raw;
    }
    let fallback = raw.clone();
    tokio::task::spawn_blocking(move || html::content_text(&raw))
        .await
        .unwrap_or(fallback)
}

/// Extract and format every page, keeping crawl order.
pub(crate) async fn prepare_sections(
    pages: Vec<CrawledPage>,
    formatter: &ContentFormatter,
) -> Vec<PageSection> {
    stream::iter(pages.into_iter().enumerate())
        .map(|(i, page)| async move {
            let title = page.title.unwrap_or_else(|| format!("Page {}", i + 1));
            let text = page_text(page.raw_content).await;
            let text = formatter.clean(&text, &title).await;
            PageSection {
                url: page.url,
                title,
                text,
            }
        })
        .buffered(FORMAT_CONCURRENCY)
        .collect()
        .await
}

fn render(sections: &[PageSection]) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let total = sections.len();
    let mut lines = Vec::with_capacity(total * 8);

    for (i, section) in sections.iter().enumerate() {
        let n = i + 1;
        lines.push(format!("\n{rule}"));
        lines.push(format!("PAGE {n} OF {total}: {}", section.title));
        lines.push(format!("URL: {}", section.url));
        lines.push(format!("{rule}\n"));
        lines.push(section.text.clone());
        lines.push(format!("\n{rule}"));
        lines.push(format!("END OF PAGE {n}"));
        lines.push(format!("{rule}\n"));
    }

    lines.join("\n")
}

/// Composite result for a non-empty crawl.
///
/// `first_title` is the root page's own `<title>`, if it had one.
pub(crate) fn aggregate(
    root_url: &str,
    first_title: Option<&str>,
    sections: &[PageSection],
    max_depth: u8,
    elapsed: Duration,
) -> ScrapedContent {
    let total = sections.len();
    let title = format!(
        "{} (Recursive - {total} pages)",
        first_title.unwrap_or("Recursive Scrape")
    );
    let urls: Vec<Value> = sections.iter().map(|s| Value::from(s.url.as_str())).collect();

    let mut result = ScrapedContent::page(root_url, title, render(sections), None, elapsed)
        .with_metadata(meta::TOTAL_PAGES, total)
        .with_metadata(meta::MAX_DEPTH, max_depth)
        .with_metadata(meta::SCRAPED_URLS, urls);
    result.content_type = Some(RECURSIVE_CONTENT_TYPE.to_string());
    result
}

/// Mark a single-page result as the fallback for a crawl that failed.
/// Failed results pass through untouched.
pub(crate) fn annotate_fallback(mut result: ScrapedContent, depth: u8, reason: &str) -> ScrapedContent {
    if !result.success {
        return result;
    }
    result.title.push_str(FALLBACK_TITLE_SUFFIX);
    result
        .with_metadata(meta::ATTEMPTED_DEPTH, depth)
        .with_metadata(meta::FALLBACK_REASON, reason)
}
