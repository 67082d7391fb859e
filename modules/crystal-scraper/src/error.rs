/// Result type alias for scraping operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Failures that stay inside the engine. None of these cross the public
/// `Scraper` API; they are folded into [`crate::ScrapedContent`] values.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("{strategy} fetch failed: {message}")]
    Fetch { strategy: String, message: String },

    #[error("{strategy} timed out after {secs}s")]
    Timeout { strategy: String, secs: u64 },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Crawl failed: {0}")]
    Crawl(String),

    #[error("Formatting failed: {0}")]
    Format(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ai_client::AiError> for ScrapeError {
    fn from(err: ai_client::AiError) -> Self {
        ScrapeError::Format(err.to_string())
    }
}
