//! # Transport Error Types
//!
//! Single classification point for everything that can go wrong between a
//! prepared request and a parsed canonical response. The atomic-job layer
//! maps this taxonomy onto its own retry policy (transient and rate-limited
//! failures retry, signature failures are fatal).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors produced while executing a signed REST request.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum TransportError {
    /// The request could not be constructed (bad URL, header, builder).
    #[error("BuildRequest: {0}")]
    BuildRequest(String),

    /// Query or body parameters failed to serialize.
    #[error("Serialization: {0}")]
    Serialization(String),

    /// The response body failed to parse into the expected model.
    #[error("Deserialize: {0}")]
    Deserialize(String),

    /// Network-level failure (connect, reset, TLS). Retryable.
    #[error("Transport: {0}")]
    Transport(String),

    /// The request-level time budget elapsed. Retryable.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// HTTP 429 or a venue rate-limit rejection, with the retry-after hint
    /// (seconds) when the venue provided one.
    #[error("RateLimited: retry_after={retry_after:?}: {message}")]
    RateLimited {
        retry_after: Option<u64>,
        message: String,
    },

    /// Authentication or signature rejection. Not retryable.
    #[error("Signature: {0}")]
    Signature(String),

    /// Venue 5xx. Retryable.
    #[error("ServerError: status={status}: {body}")]
    ServerError { status: u16, body: String },

    /// Any other venue rejection, surfaced with its status and raw body.
    #[error("Api: status={status}: {body}")]
    Api { status: u16, body: String },
}

impl TransportError {
    /// True when retrying with backoff is a reasonable reaction.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Transport(_)
                | TransportError::Timeout(_)
                | TransportError::RateLimited { .. }
                | TransportError::ServerError { .. }
        )
    }

    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout(error.to_string())
        } else {
            TransportError::Transport(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(TransportError::Timeout("t".into()).is_retryable());
        assert!(TransportError::Transport("t".into()).is_retryable());
        assert!(TransportError::RateLimited {
            retry_after: Some(3),
            message: "slow down".into()
        }
        .is_retryable());
        assert!(TransportError::ServerError {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!TransportError::Signature("bad".into()).is_retryable());
        assert!(!TransportError::Api {
            status: 400,
            body: String::new()
        }
        .is_retryable());
    }
}
