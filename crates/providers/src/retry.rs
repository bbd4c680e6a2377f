//! Resilient invocation: bounded retries with exponential back-off.
//!
//! Wraps a single [`Provider`] and turns one flaky call into a classified
//! [`InvocationOutcome`]. Whether a failure is retried is decided by
//! [`FailureKind::is_retryable`], never by inspecting error text.

use parley_config::RetryConfig;
use parley_core::error::{FailureKind, ProviderError};
use parley_core::provider::{Provider, ProviderRequest, ProviderResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Attempt cap and back-off curve.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            multiplier: config.multiplier,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    ///
    /// A server-provided hint can lengthen the wait but never beyond
    /// `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let backoff_ms = self.base_delay.as_millis() as f64 * factor;
        let backoff = Duration::from_millis(backoff_ms.min(u64::MAX as f64) as u64);

        let delay = match retry_after_secs {
            Some(secs) => backoff.max(Duration::from_secs(secs)),
            None => backoff,
        };
        delay.min(self.max_delay)
    }
}

/// Why a turn could not be completed.
#[derive(Debug, Clone)]
pub struct InvocationFailure {
    pub kind: FailureKind,
    /// The last error observed.
    pub error: ProviderError,
    /// Provider calls made before giving up.
    pub attempts: u32,
}

impl std::fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failure after {} attempt(s): {}",
            self.kind, self.attempts, self.error
        )
    }
}

impl std::error::Error for InvocationFailure {}

/// Result of one invocation, including every retry.
#[derive(Debug, Clone)]
pub enum InvocationOutcome {
    Success(ProviderResponse),
    Failure(InvocationFailure),
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_result(self) -> Result<ProviderResponse, InvocationFailure> {
        match self {
            Self::Success(response) => Ok(response),
            Self::Failure(failure) => Err(failure),
        }
    }
}

/// Calls the active provider with a per-call timeout and retries
/// transient failures.
pub struct ResilientInvoker {
    provider: Arc<dyn Provider>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl ResilientInvoker {
    pub fn new(provider: Arc<dyn Provider>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            provider,
            policy,
            timeout,
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the request until it succeeds, fails permanently, or the attempt
    /// budget is spent. Never panics and never returns a bare error.
    pub async fn invoke(&self, request: ProviderRequest) -> InvocationOutcome {
        let provider_name = self.provider.name().to_string();

        if request.messages.is_empty() {
            let error = ProviderError::InvalidRequest("History is empty".into());
            return InvocationOutcome::Failure(InvocationFailure {
                kind: error.kind(),
                error,
                attempts: 0,
            });
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!(provider = %provider_name, attempt, "Invoking provider");

            let result =
                match tokio::time::timeout(self.timeout, self.provider.complete(request.clone()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(format!(
                        "Provider '{}' timed out after {}s",
                        provider_name,
                        self.timeout.as_secs()
                    ))),
                };

            let err = match result {
                Ok(response) => return InvocationOutcome::Success(response),
                Err(err) => err,
            };

            let kind = err.kind();
            if !kind.is_retryable() {
                if kind == FailureKind::Auth {
                    error!(provider = %provider_name, error = %err, "Provider rejected credentials; check configuration");
                } else {
                    warn!(provider = %provider_name, kind = %kind, error = %err, "Provider call failed permanently");
                }
                return InvocationOutcome::Failure(InvocationFailure {
                    kind,
                    error: err,
                    attempts: attempt,
                });
            }

            if attempt >= self.policy.max_attempts {
                warn!(
                    provider = %provider_name,
                    kind = %kind,
                    attempts = attempt,
                    error = %err,
                    "Retries exhausted"
                );
                return InvocationOutcome::Failure(InvocationFailure {
                    kind,
                    error: err,
                    attempts: attempt,
                });
            }

            let delay = self.policy.delay_for(attempt, err.retry_after_secs());
            warn!(
                provider = %provider_name,
                kind = %kind,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Provider call failed, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::message::Message;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays a fixed script of results and records when each call landed.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        calls: Mutex<Vec<Instant>>,
        hang: bool,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
                hang: false,
            }
        }

        fn hanging() -> Self {
            Self {
                hang: true,
                ..Self::new(vec![])
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn gaps(&self) -> Vec<Duration> {
            let calls = self.calls.lock().unwrap();
            calls.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls.lock().unwrap().push(Instant::now());
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ProviderError::EmptyResponse))
        }
    }

    fn reply(text: &str) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            text: text.into(),
            usage: None,
            model: "test-model".into(),
        })
    }

    fn transient() -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection reset".into()))
    }

    fn request() -> ProviderRequest {
        ProviderRequest::new(vec![Message::user("hi")])
    }

    fn invoker(provider: Arc<ScriptedProvider>) -> ResilientInvoker {
        ResilientInvoker::new(provider, RetryPolicy::default(), Duration::from_secs(60))
    }

    #[test]
    fn delay_progression() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1, None), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2, None), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3, None), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(4, None), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(5, None), Duration::from_millis(8000));
    }

    #[test]
    fn retry_after_lengthens_but_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1, Some(3)), Duration::from_secs(3));
        assert_eq!(policy.delay_for(3, Some(1)), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(1, Some(120)), Duration::from_millis(8000));
    }

    #[test]
    fn policy_from_config() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 250,
            max_delay_ms: 2000,
            multiplier: 3.0,
            timeout_secs: 10,
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for(2, None), Duration::from_millis(750));
        assert_eq!(policy.delay_for(3, None), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_twice_then_success() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            transient(),
            transient(),
            reply("Hello!"),
        ]));
        let outcome = invoker(provider.clone()).invoke(request()).await;

        match outcome {
            InvocationOutcome::Success(r) => assert_eq!(r.text, "Hello!"),
            InvocationOutcome::Failure(f) => panic!("expected success, got {f}"),
        }
        assert_eq!(provider.call_count(), 3);
        let gaps = provider.gaps();
        assert!(gaps[1] > gaps[0], "back-off should grow: {gaps:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::AuthenticationFailed("bad key".into())),
            reply("unreachable"),
        ]));
        let outcome = invoker(provider.clone()).invoke(request()).await;

        let failure = outcome.into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::Auth);
        assert_eq!(failure.attempts, 1);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_failure_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::EmptyResponse),
            reply("unreachable"),
        ]));
        let failure = invoker(provider.clone())
            .invoke(request())
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Protocol);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_carries_last_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            transient(),
            Err(ProviderError::RateLimited {
                retry_after_secs: None,
            }),
            Err(ProviderError::Server {
                status_code: 503,
                message: "unavailable".into(),
            }),
            reply("too late"),
        ]));
        let failure = invoker(provider.clone())
            .invoke(request())
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(provider.call_count(), 3);
        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.kind, FailureKind::Transient);
        assert!(failure.error.to_string().contains("503"));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_honors_retry_after() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::RateLimited {
                retry_after_secs: Some(5),
            }),
            reply("ok"),
        ]));
        let outcome = invoker(provider.clone()).invoke(request()).await;

        assert!(outcome.is_success());
        let gaps = provider.gaps();
        assert!(gaps[0] >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_transient_and_retried() {
        let provider = Arc::new(ScriptedProvider::hanging());
        let invoker = ResilientInvoker::new(
            provider.clone(),
            RetryPolicy::default(),
            Duration::from_secs(2),
        );
        let failure = invoker.invoke(request()).await.into_result().unwrap_err();

        assert_eq!(failure.kind, FailureKind::Transient);
        assert!(matches!(failure.error, ProviderError::Timeout(_)));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_history_never_calls_provider() {
        let provider = Arc::new(ScriptedProvider::new(vec![reply("x")]));
        let failure = invoker(provider.clone())
            .invoke(ProviderRequest::new(vec![]))
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Protocol);
        assert_eq!(failure.attempts, 0);
        assert_eq!(provider.call_count(), 0);
    }
}
