//! Error types for the Parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; provider errors additionally
//! collapse onto the provider-agnostic [`FailureKind`] taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider-agnostic failure classes.
///
/// Both provider backends normalize their errors into these four kinds so the
/// retry layer can decide what to do without knowing which backend is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Bad or missing credential, or no access to the configured model.
    Auth,
    /// Quota or back-off signal from the remote service.
    RateLimit,
    /// Network timeout, connection reset, 5xx.
    Transient,
    /// Malformed, rejected or empty exchange.
    Protocol,
}

impl FailureKind {
    /// Whether a failure of this kind is worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Transient)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Transient => write!(f, "transient"),
            Self::Protocol => write!(f, "protocol"),
        }
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found or not accessible: {0}")]
    ModelNotFound(String),

    #[error("Rate limited by provider{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider server error: {message} (status: {status_code})")]
    Server { status_code: u16, message: String },

    #[error("Request rejected: {message} (status: {status_code})")]
    BadRequest { status_code: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider returned an empty reply")]
    EmptyResponse,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    }
}

impl ProviderError {
    /// Classify an HTTP error status into a provider error.
    ///
    /// Shared by every backend so a given status always lands in the same
    /// [`FailureKind`].
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => Self::AuthenticationFailed(message),
            404 => Self::ModelNotFound(message),
            429 => Self::RateLimited {
                retry_after_secs: None,
            },
            408 | 409 | 500..=599 => Self::Server {
                status_code,
                message,
            },
            _ => Self::BadRequest {
                status_code,
                message,
            },
        }
    }

    /// Attach a server-provided retry hint to a rate-limit error.
    pub fn with_retry_after(self, secs: Option<u64>) -> Self {
        match self {
            Self::RateLimited { .. } => Self::RateLimited {
                retry_after_secs: secs,
            },
            other => other,
        }
    }

    /// The provider-agnostic class of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AuthenticationFailed(_) | Self::ModelNotFound(_) | Self::NotConfigured(_) => {
                FailureKind::Auth
            }
            Self::RateLimited { .. } => FailureKind::RateLimit,
            Self::Timeout(_) | Self::Network(_) | Self::Server { .. } => FailureKind::Transient,
            Self::BadRequest { .. }
            | Self::InvalidRequest(_)
            | Self::InvalidResponse(_)
            | Self::EmptyResponse => FailureKind::Protocol,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Server-requested delay before the next attempt, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}
