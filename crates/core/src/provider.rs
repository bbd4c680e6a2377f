//! Provider trait: the abstraction over hosted LLM backends.
//!
//! A Provider knows how to send a role-tagged history to one hosted API and
//! get a reply back. It makes exactly one network attempt per call; retries
//! belong to the invoker layered on top.
//!
//! Implementations: OpenAI Chat Completions, Anthropic Messages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::Message;

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// System instruction, sent the way each backend expects it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The conversation messages, oldest first. Must not be empty.
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    /// Build a request for the given history with default sampling settings.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            system: None,
            messages,
            temperature: default_temperature(),
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The extracted assistant text (never empty)
    pub text: String,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// Every backend implements this trait. The invoker and orchestrator call
/// `complete()` without knowing which backend is active.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Backend identifier (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// The configured model name.
    fn model(&self) -> &str;

    /// Send a request and get a complete response. Exactly one network attempt.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Health check: are the endpoint and credential usable?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_request_defaults() {
        let req = ProviderRequest::new(vec![Message::user("hi")]);
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(req.system.is_none());
        assert!(req.max_tokens.is_none());
    }

    #[test]
    fn provider_request_builders() {
        let req = ProviderRequest::new(vec![Message::user("hi")])
            .with_system("Be brief")
            .with_max_tokens(256)
            .with_temperature(0.2);
        assert_eq!(req.system.as_deref(), Some("Be brief"));
        assert_eq!(req.max_tokens, Some(256));
        assert!((req.temperature - 0.2).abs() < f32::EPSILON);
    }
}
