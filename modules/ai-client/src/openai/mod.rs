mod client;
pub(crate) mod types;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AiError, Result};
use crate::provider::Provider;
use crate::traits::{Message, TextCompletion};
use client::OpenAiClient;
use types::{ChatRequest, ChatResponse, WireMessage};

// =============================================================================
// OpenAi
// =============================================================================

/// Chat-completion agent for any OpenAI-compatible endpoint.
pub struct OpenAi {
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    client: OpenAiClient,
}

impl OpenAi {
    pub fn new(api_key: &str, model: impl Into<String>) -> Result<Self> {
        Self::for_provider(Provider::OpenAi, api_key, model)
    }

    pub fn for_provider(provider: Provider, api_key: &str, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(provider.base_url(), api_key, model)
    }

    pub fn with_base_url(base_url: &str, api_key: &str, model: impl Into<String>) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(AiError::Config("API key is empty".into()));
        }
        Ok(Self {
            model: model.into(),
            temperature: None,
            max_tokens: None,
            client: OpenAiClient::new(api_key, base_url, Duration::from_secs(120))?,
        })
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Replace the HTTP client's request deadline.
    pub fn timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = self.client.with_timeout(timeout)?;
        Ok(self)
    }

    fn request(&self, messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: messages.into_iter().map(WireMessage::from).collect(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl TextCompletion for OpenAi {
    async fn complete(&self, messages: Vec<Message>) -> Result<String> {
        let response: ChatResponse = self.client.chat(&self.request(messages)).await?;
        response
            .into_text()
            .filter(|text| !text.trim().is_empty())
            .ok_or(AiError::EmptyCompletion)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
