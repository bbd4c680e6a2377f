//! Turn-level errors and their user-facing wording.

use parley_core::FailureKind;
use parley_providers::InvocationFailure;
use thiserror::Error;

/// Why a chat turn produced no reply.
#[derive(Debug, Error)]
pub enum TurnError {
    /// Empty or whitespace-only input. Nothing was recorded or sent.
    #[error("Message text is empty")]
    Validation,

    #[error(transparent)]
    Provider(#[from] InvocationFailure),
}

impl TurnError {
    /// The failure class, if the provider was involved.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Validation => None,
            Self::Provider(failure) => Some(failure.kind),
        }
    }

    /// One short apology suitable for sending back to the chat.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            None => "Please send a message with some text in it.",
            Some(FailureKind::Auth) => {
                "⚠️ I can't reach the AI provider because of a configuration problem. \
                 The bot operator needs to check the API key and model."
            }
            Some(FailureKind::RateLimit) | Some(FailureKind::Transient) => {
                "⚠️ The AI provider is busy right now. Please try again in a moment."
            }
            Some(FailureKind::Protocol) => {
                "⚠️ Sorry, I couldn't get a usable response from the AI provider. Please try again."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::error::ProviderError;

    fn failure(error: ProviderError) -> TurnError {
        TurnError::Provider(InvocationFailure {
            kind: error.kind(),
            error,
            attempts: 1,
        })
    }

    #[test]
    fn each_kind_has_distinct_wording() {
        let auth = failure(ProviderError::AuthenticationFailed("bad key".into()));
        let busy = failure(ProviderError::RateLimited { retry_after_secs: None });
        let broken = failure(ProviderError::EmptyResponse);

        assert!(auth.user_message().contains("configuration"));
        assert!(busy.user_message().contains("busy"));
        assert!(broken.user_message().contains("usable"));
        assert_ne!(TurnError::Validation.user_message(), auth.user_message());
    }

    #[test]
    fn transient_and_rate_limit_share_wording() {
        let busy = failure(ProviderError::RateLimited { retry_after_secs: Some(3) });
        let flaky = failure(ProviderError::Network("reset".into()));
        assert_eq!(busy.user_message(), flaky.user_message());
    }

    #[test]
    fn display_includes_cause() {
        let err = failure(ProviderError::Server {
            status_code: 503,
            message: "overloaded".into(),
        });
        assert!(err.to_string().contains("503"));
        assert_eq!(err.kind(), Some(FailureKind::Transient));
    }
}
