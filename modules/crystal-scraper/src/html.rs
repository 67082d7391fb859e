// HTML → title + readable text, via the `scraper` DOM.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("valid selector"));

/// Subtrees that never hold readable text.
const NON_TEXT_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg", "head"];

/// Additionally dropped from crawled pages: document plumbing and site navigation.
const CHROME_TAGS: &[&str] = &[
    "script", "style", "meta", "link", "noscript", "nav", "template", "svg", "head",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "hr", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol", "tr", "td",
    "th", "table", "article", "section", "main", "header", "footer", "aside", "blockquote", "pre",
    "figcaption", "dt", "dd", "form", "title",
];

/// Title and body text pulled out of one HTML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub text: String,
}

impl ParsedPage {
    /// The page title, or `fallback` (usually the URL) when the page has none.
    pub fn title_or(&self, fallback: &str) -> String {
        self.title.clone().unwrap_or_else(|| fallback.to_string())
    }
}

/// Parse a fetched page: `<title>` plus body text without scripts and styles.
pub fn parse_page(html: &str) -> ParsedPage {
    let doc = Html::parse_document(html);
    ParsedPage {
        title: title_of(&doc),
        text: text_of(&doc, NON_TEXT_TAGS),
    }
}

/// Body text of a crawled page with navigation chrome removed as well.
pub fn content_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    text_of(&doc, CHROME_TAGS)
}

pub fn extract_title(html: &str) -> Option<String> {
    title_of(&Html::parse_document(html))
}

/// Cheap sniff for whether a crawl payload is an HTML document rather than text.
pub fn looks_like_markup(content: &str) -> bool {
    let head = content.trim_start();
    let prefix: String = head.chars().take(5).collect::<String>().to_ascii_lowercase();
    prefix.starts_with("<!") || prefix.starts_with("<html")
}

fn title_of(doc: &Html) -> Option<String> {
    let raw: String = doc.select(&TITLE).next()?.text().collect();
    let title = collapse_spaces(&raw);
    (!title.is_empty()).then_some(title)
}

fn text_of(doc: &Html, skip: &[&str]) -> String {
    let mut buf = String::new();
    match doc.select(&BODY).next() {
        Some(body) => collect_text(&body, &mut buf, skip),
        None => collect_text(&doc.root_element(), &mut buf, skip),
    }
    buf.lines()
        .map(collapse_spaces)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(node: &ElementRef<'_>, buf: &mut String, skip: &[&str]) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => buf.push_str(text),
            Node::Element(el) => {
                let tag = el.name();
                if skip.contains(&tag) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&tag);
                if block {
                    buf.push('\n');
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(&child_ref, buf, skip);
                }
                if block {
                    buf.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn collapse_spaces(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}
