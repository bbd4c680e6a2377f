//! Shared test helpers for orchestrator, command and dispatcher tests.

use parley_core::error::ProviderError;
use parley_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use parley_providers::{ResilientInvoker, RetryPolicy};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A mock provider that replays scripted results, then echoes.
///
/// Once the script is used up every call answers `echo: <last user text>`,
/// unless the provider was built with [`MockProvider::failing`].
pub struct MockProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    always_fail: Option<ProviderError>,
    delay: Duration,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl MockProvider {
    pub fn echo() -> Self {
        Self::scripted(vec![])
    }

    pub fn scripted(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            always_fail: None,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(texts: &[&str]) -> Self {
        Self::scripted(texts.iter().map(|t| Ok(make_text_response(t))).collect())
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            always_fail: Some(error),
            ..Self::echo()
        }
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = &self.always_fail {
            return Err(err.clone());
        }
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        let last = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(make_text_response(&format!("echo: {last}")))
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        text: text.into(),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// An invoker with short back-off so retry paths stay fast.
pub fn invoker_for(provider: Arc<MockProvider>) -> ResilientInvoker {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        multiplier: 2.0,
    };
    ResilientInvoker::new(provider, policy, Duration::from_secs(5))
}
