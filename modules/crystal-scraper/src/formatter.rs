use std::sync::Arc;
use std::time::Duration;

use ai_client::{Message, OpenAi, TextCompletion};
use tracing::{info, warn};

use crate::config::LlmConfig;
use crate::error::{Result, ScrapeError};

/// Completions shorter than this (after trimming) are treated as degenerate.
pub const MIN_FORMATTED_LEN: usize = 50;

const SYSTEM_PROMPT: &str =
    "You clean up text scraped from web pages. You return only the cleaned content.";

/// Optional LLM cleanup pass over scraped text.
///
/// [`ContentFormatter::clean`] never fails: when formatting is disabled, the
/// input is blank, the service errors or times out, or the completion is too
/// short, the original text comes back unchanged.
#[derive(Clone)]
pub struct ContentFormatter {
    completion: Option<Arc<dyn TextCompletion>>,
    timeout: Duration,
}

impl ContentFormatter {
    pub fn new(completion: Arc<dyn TextCompletion>, timeout: Duration) -> Self {
        Self {
            completion: Some(completion),
            timeout,
        }
    }

    /// A formatter that passes every input through untouched.
    pub fn disabled() -> Self {
        Self {
            completion: None,
            timeout: Duration::ZERO,
        }
    }

    /// Build from config. Formatting only switches on when the caller asked for
    /// it, config allows it, and a provider API key is available.
    pub fn from_config(llm: &LlmConfig, caller_enabled: bool) -> Self {
        if !caller_enabled {
            info!("LLM formatting disabled by caller");
            return Self::disabled();
        }
        if !llm.enabled {
            info!("LLM formatting is disabled in config");
            return Self::disabled();
        }
        let (Some(provider), Some(api_key), Some(model)) =
            (llm.provider, llm.api_key.as_deref(), llm.resolved_model())
        else {
            warn!("No API key available for LLM formatting; continuing without it");
            return Self::disabled();
        };

        let agent = OpenAi::for_provider(provider, api_key, model)
            .map(|agent| agent.temperature(llm.temperature).max_tokens(llm.max_tokens))
            .and_then(|agent| agent.timeout(llm.timeout));

        match agent {
            Ok(agent) => {
                info!(%provider, model = agent.model(), "LLM formatter initialized");
                Self::new(Arc::new(agent), llm.timeout)
            }
            Err(e) => {
                warn!(error = %e, "Failed to initialize LLM formatter; continuing without it");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.completion.is_some()
    }

    /// Clean `text` for a page titled `title`, falling back to `text` on any problem.
    pub async fn clean(&self, text: &str, title: &str) -> String {
        if !self.is_enabled() || text.trim().is_empty() {
            return text.to_string();
        }

        match self.try_clean(text, title).await {
            Ok(formatted) => {
                info!(title, chars = formatted.len(), "Content formatted with LLM");
                formatted
            }
            Err(e) => {
                warn!(title, error = %e, "LLM formatting failed, using original content");
                text.to_string()
            }
        }
    }

    async fn try_clean(&self, text: &str, title: &str) -> Result<String> {
        let Some(completion) = self.completion.as_ref() else {
            return Err(ScrapeError::Format("formatter disabled".into()));
        };

        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(build_prompt(text, title))];

        let response = tokio::time::timeout(self.timeout, completion.complete(messages))
            .await
            .map_err(|_| {
                ScrapeError::Format(format!("timed out after {}s", self.timeout.as_secs()))
            })??;

        let formatted = response.trim();
        if formatted.chars().count() < MIN_FORMATTED_LEN {
            return Err(ScrapeError::Format(format!(
                "completion too short ({} chars)",
                formatted.chars().count()
            )));
        }
        Ok(formatted.to_string())
    }
}

impl std::fmt::Debug for ContentFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentFormatter")
            .field("model", &self.completion.as_ref().map(|c| c.model().to_string()))
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn build_prompt(text: &str, title: &str) -> String {
    format!(
        r#"Please clean and format the following web content to make it readable and well-structured:

TITLE: {title}

CONTENT:
{text}

Please:
1. Remove all CSS styling, JavaScript code, and HTML artifacts
2. Remove navigation menus, headers, footers, and sidebars that are not main content
3. Remove placeholder text like "Lorem ipsum", "Click here", etc.
4. Format the text with proper headings, paragraphs, and bullet points
5. Preserve important information like dates, names, numbers, and links
6. Use markdown formatting for better readability
7. Remove repetitive or boilerplate content
8. Keep only the main content that a human reader would find valuable

Return only the cleaned, formatted content without any additional commentary.
"#
    )
}
