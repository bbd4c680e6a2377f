//! Provider selection: builds the single active backend from config.
//!
//! The backend is chosen once at startup; every chat turn in the process
//! goes to the same provider.

use std::sync::Arc;
use parley_config::{AppConfig, ProviderKind};
use parley_core::error::ProviderError;
use parley_core::provider::Provider;
use tracing::info;
use crate::anthropic::{self, AnthropicProvider};
use crate::openai::{self, OpenAiProvider};
use crate::retry::{ResilientInvoker, RetryPolicy};

/// Build the configured provider.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let settings = config.active_provider();
    let api_key = settings.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(format!("No API key set for {}", config.provider))
    })?;
    let base_url = settings
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(config.provider).to_string());

    let provider: Arc<dyn Provider> = match config.provider {
        ProviderKind::OpenAi => {
            Arc::new(OpenAiProvider::new(api_key, &settings.model)?.with_base_url(base_url))
        }
        ProviderKind::Anthropic => {
            Arc::new(AnthropicProvider::new(api_key, &settings.model)?.with_base_url(base_url))
        }
    };

    info!(provider = provider.name(), model = provider.model(), "Provider ready");
    Ok(provider)
}

/// Build the configured provider wrapped in the retrying invoker.
pub fn build_invoker(config: &AppConfig) -> Result<ResilientInvoker, ProviderError> {
    let provider = build_from_config(config)?;
    Ok(ResilientInvoker::new(
        provider,
        RetryPolicy::from_config(&config.retry),
        config.retry.timeout(),
    ))
}

/// Default endpoint for each backend.
pub fn default_base_url(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => openai::DEFAULT_BASE_URL,
        ProviderKind::Anthropic => anthropic::DEFAULT_BASE_URL,
    }
}
