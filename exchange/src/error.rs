//! Adapter error taxonomy.

use escada_integration::TransportError;
use serde::Serialize;
use thiserror::Error;

/// All errors produced by an [`ExchangeAdapter`](crate::ExchangeAdapter).
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Error)]
pub enum AdapterError {
    /// Failure below the venue protocol: network, timeout, signature, HTTP.
    #[error("Transport: {0}")]
    Transport(#[from] TransportError),

    /// The venue accepted the request but rejected it with an error payload.
    #[error("Venue: code={code}: {message}")]
    Venue { code: i64, message: String },

    /// The queried order does not exist on the venue.
    #[error("OrderNotFound")]
    OrderNotFound,

    /// The operation is not available on this venue.
    #[error("UnsupportedOperation: {0}")]
    UnsupportedOperation(&'static str),

    /// A venue payload did not carry the expected fields.
    #[error("Decode: {0}")]
    Decode(String),
}

impl AdapterError {
    /// True when retrying with backoff is a reasonable reaction.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Transport(transport) => transport.is_retryable(),
            _ => false,
        }
    }

    /// Rate-limit hint in seconds, when the venue provided one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AdapterError::Transport(TransportError::RateLimited { retry_after, .. }) => {
                *retry_after
            }
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            AdapterError::Transport(TransportError::RateLimited { .. })
        )
    }

    /// Signature and credential failures are never retryable and notify the
    /// operator.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, AdapterError::Transport(TransportError::Signature(_)))
    }

    pub fn decode(message: impl Into<String>) -> Self {
        AdapterError::Decode(message.into())
    }
}
