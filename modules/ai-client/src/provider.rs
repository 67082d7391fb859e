use std::fmt;
use std::str::FromStr;

use crate::error::AiError;

/// Hosted chat-completion providers that speak the OpenAI wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Together,
    OpenAi,
    OpenRouter,
    Gemini,
}

impl Provider {
    /// Order in which providers are tried when none is named explicitly.
    pub const DETECTION_ORDER: [Provider; 4] = [
        Provider::Together,
        Provider::Gemini,
        Provider::OpenAi,
        Provider::OpenRouter,
    ];

    pub fn base_url(self) -> &'static str {
        match self {
            Provider::Together => "https://api.together.xyz/v1",
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }

    pub fn api_key_env(self) -> &'static str {
        match self {
            Provider::Together => "TOGETHER_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
            Provider::Gemini => "GOOGLE_API_KEY",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Together => "openai/gpt-oss-20b",
            Provider::OpenAi => "gpt-4o-mini",
            Provider::OpenRouter => "openai/gpt-oss-20b",
            Provider::Gemini => "gemini-2.0-flash-lite",
        }
    }

    /// First provider in [`Self::DETECTION_ORDER`] whose API key `lookup` can resolve.
    pub fn detect(lookup: impl Fn(&str) -> Option<String>) -> Option<(Provider, String)> {
        Self::DETECTION_ORDER.into_iter().find_map(|provider| {
            lookup(provider.api_key_env())
                .filter(|key| !key.trim().is_empty())
                .map(|key| (provider, key))
        })
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::Together => "together",
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
            Provider::Gemini => "gemini",
        };
        f.write_str(name)
    }
}

impl FromStr for Provider {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "together" => Ok(Provider::Together),
            "openai" => Ok(Provider::OpenAi),
            "openrouter" => Ok(Provider::OpenRouter),
            "gemini" | "google" => Ok(Provider::Gemini),
            other => Err(AiError::Config(format!("unknown LLM provider: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn together_wins_over_google() {
        let vars = env(&[("GOOGLE_API_KEY", "g"), ("TOGETHER_API_KEY", "t")]);
        let (provider, key) = Provider::detect(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(provider, Provider::Together);
        assert_eq!(key, "t");
    }

    #[test]
    fn falls_through_to_google() {
        let vars = env(&[("GOOGLE_API_KEY", "g"), ("OPENAI_API_KEY", "o")]);
        let (provider, _) = Provider::detect(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(provider, Provider::Gemini);
    }

    #[test]
    fn blank_keys_are_skipped() {
        let vars = env(&[("TOGETHER_API_KEY", "  "), ("OPENROUTER_API_KEY", "r")]);
        let (provider, _) = Provider::detect(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(provider, Provider::OpenRouter);
    }

    #[test]
    fn no_keys_detects_nothing() {
        assert!(Provider::detect(|_| None).is_none());
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("Together".parse::<Provider>().unwrap(), Provider::Together);
        assert_eq!("google".parse::<Provider>().unwrap(), Provider::Gemini);
        assert!("claude".parse::<Provider>().is_err());
    }
}
