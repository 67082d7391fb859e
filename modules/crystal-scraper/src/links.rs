use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

/// Navigational links only. `<link href>` (stylesheets, icons) and `src`
/// attributes point at assets, not pages.
static PAGE_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href], area[href]").expect("valid selector"));

const SKIP_PREFIXES: &[&str] = &["mailto:", "tel:", "javascript:", "data:"];

const SKIP_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".woff", ".woff2", ".ico", ".webp",
    ".mp3", ".mp4", ".pdf", ".zip", ".xml", ".json",
];

/// Scheme, host and effective port of a URL. Two URLs share an origin only if
/// all three match exactly; `blog.example.com` is a different origin from
/// `example.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Origin {
    pub fn of(url: &Url) -> Option<Self> {
        Some(Self {
            scheme: url.scheme().to_string(),
            host: url.host_str()?.to_ascii_lowercase(),
            port: url.port_or_known_default(),
        })
    }

    pub fn contains(&self, url: &Url) -> bool {
        Self::of(url).is_some_and(|other| &other == self)
    }
}

/// Resolve a raw href against a base URL, returning an absolute http(s) URL
/// with the fragment stripped.
fn resolve_href(raw: &str, base: Option<&Url>) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || SKIP_PREFIXES.iter().any(|p| raw.starts_with(p)) {
        return None;
    }
    let mut parsed = match base {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    parsed.set_fragment(None);
    Some(parsed)
}

/// True when the URL path ends in a static-asset extension.
fn is_asset(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    SKIP_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Page links in `html`: `<a href>` and `<area href>` resolved against
/// `base_url`, non-http(s) schemes and asset files dropped, deduplicated in
/// document order.
pub fn extract_page_links(html: &str, base_url: &str) -> Vec<String> {
    let base = Url::parse(base_url).ok();
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for el in doc.select(&PAGE_LINKS) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Some(resolved) = resolve_href(href, base.as_ref()) else {
            continue;
        };
        if is_asset(&resolved) {
            continue;
        }
        let resolved = resolved.to_string();
        if seen.insert(resolved.clone()) {
            links.push(resolved);
        }
    }

    links
}
