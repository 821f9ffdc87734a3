#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # Integration - Signed REST Plumbing
//!
//! Low-level framework for composing the signed HTTP integrations the
//! exchange adapters are built on. Translates between venue wire formats and
//! the canonical request/response models without knowing anything about the
//! venues themselves.
//!
//! ## Fundamental Abstractions
//!
//! ### [`RestRequest`](protocol::http::rest::RestRequest)
//! One venue endpoint: path, method, query parameters, body, request weight
//! and expected response type.
//!
//! ### [`RequestSigner`](protocol::http::private::RequestSigner)
//! Venue authentication scheme: given a request and a prepared builder,
//! produce the final signed [`reqwest::Request`].
//!
//! ### [`RestClient`](protocol::http::RestClient)
//! Drives a [`RestRequest`] through the limiter, the signer, the wire and the
//! response parser, classifying every failure into the [`TransportError`]
//! taxonomy (transient, rate-limited, signature, API rejection).
//!
//! ## Shared Resources
//!
//! - [`ExponentialBackoff`](backoff::ExponentialBackoff): retry and
//!   double-check polling schedules, optionally jittered
//! - [`AccountRateLimiter`](limiter::AccountRateLimiter): weighted
//!   token-bucket limiter governing all adapter calls for one account

/// Retry and polling schedules.
pub mod backoff;

/// All [`Error`](std::error::Error)s generated in Integration.
pub mod error;

/// Per-account weighted rate limiting.
pub mod limiter;

/// HTTP protocol implementation: request/signer traits plus the REST client.
pub mod protocol;

pub use backoff::ExponentialBackoff;
pub use error::TransportError;
pub use limiter::AccountRateLimiter;
pub use protocol::http::{
    private::{encode_json, encode_query, RequestSigner},
    rest::RestRequest,
    RestClient,
};
