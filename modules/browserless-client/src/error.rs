use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserlessError>;

#[derive(Debug, Error)]
pub enum BrowserlessError {
    #[error("Client setup failed: {0}")]
    Setup(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Browserless request timed out")]
    Timeout,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for BrowserlessError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return BrowserlessError::Timeout;
        }
        // Strip the endpoint URL so the API token never lands in logs.
        BrowserlessError::Network(err.without_url().to_string())
    }
}
