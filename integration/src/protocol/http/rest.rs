//! The [`RestRequest`] trait modelling one venue endpoint.

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use std::borrow::Cow;

/// One REST endpoint on a venue.
///
/// An implementation carries everything needed to build, weigh and parse the
/// endpoint: path, method, typed query parameters and body, the request
/// weight charged by the venue, and the expected response model.
pub trait RestRequest {
    /// Expected response model for this endpoint.
    type Response: DeserializeOwned;
    /// Serializable query parameters.
    type QueryParams: Serialize;
    /// Serializable request body.
    type Body: Serialize;

    /// Endpoint path, relative to the venue base URL.
    fn path(&self) -> Cow<'static, str>;

    /// HTTP method used by this endpoint.
    fn method() -> Method;

    /// Query parameters, if any.
    fn query_params(&self) -> Option<&Self::QueryParams> {
        None
    }

    /// Request body, if any.
    fn body(&self) -> Option<&Self::Body> {
        None
    }

    /// Whether the endpoint requires authentication. Signers skip signing
    /// when this returns false.
    fn signed() -> bool {
        true
    }

    /// Request weight charged against the account limiter.
    fn weight() -> u32 {
        1
    }
}
