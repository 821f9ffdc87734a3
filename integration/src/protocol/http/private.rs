//! Request signing for authenticated endpoints.

use crate::error::TransportError;
use crate::protocol::http::rest::RestRequest;
use serde::Serialize;

/// A venue authentication scheme.
///
/// Given a [`RestRequest`] and a prepared [`reqwest::RequestBuilder`] (method,
/// URL and query already applied), produce the final signed request. Public
/// endpoints (`RestRequest::signed() == false`) must pass through untouched
/// apart from any venue-mandatory headers.
pub trait RequestSigner {
    fn sign<Request>(
        &self,
        request: &Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, TransportError>
    where
        Request: RestRequest;
}

/// Serialize query parameters into the canonical `k=v&k=v` form signers hash.
pub fn encode_query<Params>(params: &Params) -> Result<String, TransportError>
where
    Params: Serialize,
{
    serde_urlencoded::to_string(params)
        .map_err(|error| TransportError::Serialization(error.to_string()))
}

/// Serialize a request body as the JSON string signers hash.
pub fn encode_json<Body>(body: &Body) -> Result<String, TransportError>
where
    Body: Serialize,
{
    serde_json::to_string(body).map_err(|error| TransportError::Serialization(error.to_string()))
}

/// Signer for venues (or endpoints) that require no authentication.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSigner;

impl RequestSigner for NoSigner {
    fn sign<Request>(
        &self,
        _: &Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, TransportError>
    where
        Request: RestRequest,
    {
        builder
            .build()
            .map_err(|error| TransportError::BuildRequest(error.to_string()))
    }
}
