//! Web page text extraction with a cost-ordered fallback chain.
//!
//! A [`Scraper`] tries plain HTTP first, then a remote Browserless session,
//! then a local headless Chromium, returning the first readable result. Results
//! are cached per URL for a TTL. [`Scraper::scrape_recursive`] follows
//! same-origin links a bounded number of hops and folds the pages into one
//! result. Extracted text can optionally be cleaned up by an LLM; any problem
//! with that step leaves the text as extracted.

pub mod cache;
pub mod chain;
pub mod config;
pub mod content;
pub mod crawler;
pub mod error;
pub mod fetchers;
pub mod formatter;
pub mod html;
pub mod links;
mod recursive;
pub mod service;
pub mod strategy;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use cache::ResultCache;
pub use chain::StrategyChain;
pub use config::{LlmConfig, ScraperConfig};
pub use content::{meta, ScrapedContent, RECURSIVE_CONTENT_TYPE};
pub use crawler::{CrawlRequest, CrawledPage, LinkCrawler, SiteCrawler};
pub use error::{Result, ScrapeError};
pub use fetchers::{BrowserlessFetcher, ChromeFetcher, DirectFetcher, FetchedPage, PageFetcher};
pub use formatter::ContentFormatter;
pub use recursive::{FALLBACK_TITLE_SUFFIX, MAX_RECURSION_DEPTH};
pub use service::Scraper;
pub use strategy::Strategy;
