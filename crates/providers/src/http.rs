//! HTTP plumbing shared by the provider backends.
//!
//! Both backends funnel transport failures and non-200 responses through
//! these helpers so a given failure always lands in the same `FailureKind`.

use std::time::Duration;
use parley_core::error::ProviderError;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Error bodies longer than this are truncated before logging or surfacing.
const MAX_ERROR_BODY: usize = 512;

/// Build the HTTP client used by a backend.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))
}

/// Classify a transport-level failure (no HTTP response was read).
pub(crate) fn send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else if e.is_decode() {
        ProviderError::InvalidResponse(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Parse a `retry-after` header expressed in whole seconds.
pub(crate) fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// Turn a non-success response into a classified error.
pub(crate) async fn error_from_response(provider: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let retry_after = retry_after(&response);
    let body = response.text().await.unwrap_or_default();
    let message = truncate(&body);

    warn!(provider, status, body = %message, "Provider returned error");
    ProviderError::from_status(status, message).with_retry_after(retry_after)
}

/// Read a success body and decode it.
///
/// A body that cannot be read is a transport problem; a body that cannot be
/// decoded is a protocol problem.
pub(crate) async fn decode_body<T: DeserializeOwned>(
    provider: &str,
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let body = response.text().await.map_err(send_error)?;
    serde_json::from_str(&body).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse {provider} response: {e}"))
    })
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &body[..end])
}
