//! Configurable, signed HTTP communication between client and venue.

use crate::{
    error::TransportError,
    limiter::AccountRateLimiter,
    protocol::http::{private::RequestSigner, rest::RestRequest},
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::{sync::Arc, time::Duration};
use tracing::debug;
use url::Url;

/// Request signing for authenticated endpoints.
pub mod private;

/// The [`RestRequest`] endpoint trait.
pub mod rest;

/// Default request-level time budget.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Signed REST client for one venue and one account.
///
/// Drives a [`RestRequest`] through the account limiter, the venue signer,
/// the wire and the response parser. Every failure is classified into the
/// [`TransportError`] taxonomy.
#[derive(Debug, Clone)]
pub struct RestClient<Signer> {
    http: reqwest::Client,
    base_url: Url,
    signer: Signer,
    limiter: Option<Arc<AccountRateLimiter>>,
    request_timeout: Duration,
}

impl<Signer> RestClient<Signer>
where
    Signer: RequestSigner,
{
    pub fn new(base_url: Url, signer: Signer) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            signer,
            limiter: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Attach the per-account limiter governing all calls through this client.
    pub fn with_limiter(mut self, limiter: Arc<AccountRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Execute `request`, returning its parsed canonical response.
    pub async fn execute<Request>(
        &self,
        request: Request,
    ) -> Result<Request::Response, TransportError>
    where
        Request: RestRequest,
    {
        if let Some(limiter) = &self.limiter {
            limiter.acquire(Request::weight()).await;
        }

        let url = self
            .base_url
            .join(request.path().as_ref())
            .map_err(|error| TransportError::BuildRequest(error.to_string()))?;

        let mut builder = self
            .http
            .request(Request::method(), url)
            .timeout(self.request_timeout);

        if let Some(params) = request.query_params() {
            builder = builder.query(params);
        }

        let signed = self.signer.sign(&request, builder)?;
        debug!(
            method = %Request::method(),
            path = %request.path(),
            "sending venue request"
        );

        let response = self
            .http
            .execute(signed)
            .await
            .map_err(TransportError::from_reqwest)?;

        parse_response::<Request::Response>(response).await
    }
}

/// Parse a venue response, classifying non-success statuses.
async fn parse_response<T>(response: reqwest::Response) -> Result<T, TransportError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if status.is_success() {
        let bytes = response
            .bytes()
            .await
            .map_err(TransportError::from_reqwest)?;
        return serde_json::from_slice(&bytes).map_err(|error| {
            TransportError::Deserialize(format!(
                "{error}: {}",
                String::from_utf8_lossy(&bytes)
            ))
        });
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => TransportError::RateLimited {
            retry_after,
            message: body,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Signature(body),
        status if status.is_server_error() => TransportError::ServerError {
            status: status.as_u16(),
            body,
        },
        status => TransportError::Api {
            status: status.as_u16(),
            body,
        },
    })
}
