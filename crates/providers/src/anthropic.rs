//! Anthropic Messages API backend.
//!
//! Differences from the OpenAI wire format:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field
//! - `max_tokens` is mandatory
//! - History must start with a user turn and alternate roles
//! - Replies are a list of content blocks; only `text` blocks are kept

use async_trait::async_trait;
use parley_core::error::ProviderError;
use parley_core::message::{Message, Role};
use parley_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::http;

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 1024;
/// Anthropic's "overloaded" status; treated as a back-off signal.
const STATUS_OVERLOADED: u16 = 529;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a provider for the given credential and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured("Anthropic API key is empty".into()));
        }
        Ok(Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key,
            model: model.into(),
            client: http::build_client(Duration::from_secs(120))?,
        })
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert history to the alternating user/assistant sequence the API
    /// accepts. Leading assistant turns are dropped and consecutive turns of
    /// the same role are merged.
    fn to_api_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for msg in messages
            .iter()
            .skip_while(|m| m.role == Role::Assistant)
        {
            match result.last_mut() {
                Some(last) if last.role == msg.role.as_str() => {
                    last.content.push_str("\n\n");
                    last.content.push_str(&msg.content);
                }
                _ => result.push(AnthropicMessage {
                    role: msg.role.as_str().into(),
                    content: msg.content.clone(),
                }),
            }
        }

        result
    }

    fn build_body(&self, request: &ProviderRequest) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: request
                .system
                .clone()
                .filter(|s| !s.trim().is_empty()),
            messages: Self::to_api_messages(&request.messages),
            temperature: request.temperature,
        }
    }

    fn extract(api_response: AnthropicResponse) -> Result<ProviderResponse, ProviderError> {
        let text = api_response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        Ok(ProviderResponse {
            text,
            usage: api_response.usage.map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            }),
            model: api_response.model,
        })
    }

    async fn classify_error(response: reqwest::Response) -> ProviderError {
        if response.status().as_u16() == STATUS_OVERLOADED {
            let retry_after_secs = http::retry_after(&response);
            return ProviderError::RateLimited { retry_after_secs };
        }
        http::error_from_response("anthropic", response).await
    }
}

#[async_trait]
impl parley_core::Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = self.build_body(&request);
        if body.messages.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "History has no user message".into(),
            ));
        }

        let url = format!("{}/v1/messages", self.base_url);

        debug!(
            provider = "anthropic",
            model = %self.model,
            messages = body.messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(http::send_error)?;

        if !response.status().is_success() {
            return Err(Self::classify_error(response).await);
        }

        let api_response: AnthropicResponse = http::decode_body("anthropic", response).await?;
        Self::extract(api_response)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
            .map_err(http::send_error)?;

        if response.status().is_success() {
            return Ok(true);
        }
        Err(Self::classify_error(response).await)
    }
}

// --- Anthropic API types (internal) ---

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    content: Vec<ResponseBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{FailureKind, Provider};

    #[test]
    fn constructor() {
        let p = AnthropicProvider::new("sk-ant-test", "claude-3-5-haiku-latest").unwrap();
        assert_eq!(p.name(), "anthropic");
        assert_eq!(p.model(), "claude-3-5-haiku-latest");
        assert_eq!(p.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn constructor_with_base_url() {
        let p = AnthropicProvider::new("sk-ant-test", "m")
            .unwrap()
            .with_base_url("http://localhost:8080/");
        assert_eq!(p.base_url, "http://localhost:8080");
    }

    #[test]
    fn blank_key_is_auth_failure() {
        let err = AnthropicProvider::new("", "m").err().unwrap();
        assert_eq!(err.kind(), FailureKind::Auth);
    }

    #[test]
    fn system_is_top_level() {
        let p = AnthropicProvider::new("k", "m").unwrap();
        let req = ProviderRequest::new(vec![Message::user("hi")]).with_system("Be brief");
        let json = serde_json::to_value(p.build_body(&req)).unwrap();
        assert_eq!(json["system"], "Be brief");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn leading_assistant_turns_dropped() {
        let msgs = vec![
            Message::assistant("stale reply"),
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        let api = AnthropicProvider::to_api_messages(&msgs);
        assert_eq!(api.len(), 2);
        assert_eq!(api[0].role, "user");
        assert_eq!(api[0].content, "hi");
    }

    #[test]
    fn consecutive_same_role_merged() {
        // A failed turn leaves two user messages back to back.
        let msgs = vec![
            Message::user("first try"),
            Message::user("second try"),
            Message::assistant("answer"),
        ];
        let api = AnthropicProvider::to_api_messages(&msgs);
        assert_eq!(api.len(), 2);
        assert_eq!(api[0].content, "first try\n\nsecond try");
        assert_eq!(api[1].role, "assistant");
    }

    #[test]
    fn text_blocks_joined_and_others_ignored() {
        let raw = r#"{
            "model": "claude-3-5-haiku-20241022",
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "world"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 3}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(raw).unwrap();
        let resp = AnthropicProvider::extract(parsed).unwrap();
        assert_eq!(resp.text, "Hello world");
        assert_eq!(resp.usage.unwrap().total_tokens, 13);
    }

    #[test]
    fn no_text_blocks_is_empty_response() {
        let raw = r#"{"model": "m", "content": []}"#;
        let parsed: AnthropicResponse = serde_json::from_str(raw).unwrap();
        let err = AnthropicProvider::extract(parsed).unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
    }

    #[tokio::test]
    async fn assistant_only_history_rejected() {
        let p = AnthropicProvider::new("k", "m")
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let err = p
            .complete(ProviderRequest::new(vec![Message::assistant("orphan")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Protocol);
    }
}
