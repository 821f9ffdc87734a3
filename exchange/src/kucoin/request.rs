//! KuCoin futures: request signing and endpoint definitions.
//!
//! Signature scheme: `KC-API-SIGN = base64(HMAC-SHA256(secret, timestamp +
//! METHOD + endpoint(+query) + body))`; the passphrase itself is signed the
//! same way (key version 2).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use escada_integration::{
    error::TransportError,
    protocol::http::{
        private::{encode_json, encode_query, RequestSigner},
        rest::RestRequest,
    },
};
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::Serialize;
use sha2::Sha256;
use std::borrow::Cow;

use super::model::*;

#[derive(Debug, Clone)]
pub struct KucoinRequestSigner {
    api_key: String,
    secret_key: String,
    passphrase: String,
}

impl KucoinRequestSigner {
    pub fn new(api_key: String, secret_key: String, passphrase: String) -> Self {
        Self {
            api_key,
            secret_key,
            passphrase,
        }
    }

    fn hmac_base64(&self, payload: &str) -> Result<String, TransportError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .map_err(|error| TransportError::Signature(error.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

impl RequestSigner for KucoinRequestSigner {
    fn sign<Request>(
        &self,
        request: &Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, TransportError>
    where
        Request: RestRequest,
    {
        let mut builder = builder;
        let body_json = match request.body() {
            Some(body) => {
                let json = encode_json(body)?;
                builder = builder
                    .header("Content-Type", "application/json")
                    .body(json.clone());
                Some(json)
            }
            None => None,
        };

        if !Request::signed() {
            return builder
                .build()
                .map_err(|error| TransportError::BuildRequest(error.to_string()));
        }

        let query = match request.query_params() {
            Some(params) => {
                let serialized = encode_query(params)?;
                if serialized.is_empty() {
                    String::new()
                } else {
                    format!("?{serialized}")
                }
            }
            None => String::new(),
        };
        let timestamp = Utc::now().timestamp_millis().to_string();
        let prehash = format!(
            "{timestamp}{}{}{query}{}",
            Request::method().as_str(),
            request.path(),
            body_json.as_deref().unwrap_or("")
        );

        builder
            .header("KC-API-KEY", &self.api_key)
            .header("KC-API-SIGN", self.hmac_base64(&prehash)?)
            .header("KC-API-TIMESTAMP", timestamp)
            .header("KC-API-PASSPHRASE", self.hmac_base64(&self.passphrase)?)
            .header("KC-API-KEY-VERSION", "2")
            .build()
            .map_err(|error| TransportError::BuildRequest(error.to_string()))
    }
}

// REST Request implementations for the KuCoin futures endpoints.

#[derive(Debug, Clone)]
pub struct GetServerTime;

impl RestRequest for GetServerTime {
    type Response = KucoinResponse<i64>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v1/timestamp")
    }

    fn method() -> Method {
        Method::GET
    }

    fn signed() -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct GetActiveContracts;

impl RestRequest for GetActiveContracts {
    type Response = KucoinResponse<Vec<KucoinContract>>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v1/contracts/active")
    }

    fn method() -> Method {
        Method::GET
    }

    fn signed() -> bool {
        false
    }

    fn weight() -> u32 {
        5
    }
}

#[derive(Debug, Clone)]
pub struct GetMarkPrice {
    pub symbol: String,
}

impl RestRequest for GetMarkPrice {
    type Response = KucoinResponse<KucoinMarkPrice>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Owned(format!("/api/v1/mark-price/{}/current", self.symbol))
    }

    fn method() -> Method {
        Method::GET
    }

    fn signed() -> bool {
        false
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KlineParams {
    pub symbol: String,
    /// Granularity in minutes.
    pub granularity: u32,
}

#[derive(Debug, Clone)]
pub struct GetKlines {
    pub params: KlineParams,
}

impl RestRequest for GetKlines {
    type Response = KucoinResponse<Vec<KucoinKline>>;
    type QueryParams = KlineParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v1/kline/query")
    }

    fn method() -> Method {
        Method::GET
    }

    fn signed() -> bool {
        false
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrencyParams {
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct GetAccountOverview {
    pub params: CurrencyParams,
}

impl RestRequest for GetAccountOverview {
    type Response = KucoinResponse<KucoinAccountOverview>;
    type QueryParams = CurrencyParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v1/account-overview")
    }

    fn method() -> Method {
        Method::GET
    }

    fn weight() -> u32 {
        5
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone)]
pub struct GetPositions;

impl RestRequest for GetPositions {
    type Response = KucoinResponse<Vec<KucoinPosition>>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v1/positions")
    }

    fn method() -> Method {
        Method::GET
    }

    fn weight() -> u32 {
        5
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveOrdersParams {
    pub status: String,
    pub symbol: String,
}

#[derive(Debug, Clone)]
pub struct GetActiveOrders {
    pub params: ActiveOrdersParams,
}

impl RestRequest for GetActiveOrders {
    type Response = KucoinResponse<KucoinPage<KucoinOrder>>;
    type QueryParams = ActiveOrdersParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v1/orders")
    }

    fn method() -> Method {
        Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderBody {
    #[serde(rename = "clientOid")]
    pub client_oid: String,
    pub symbol: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub leverage: String,
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
    #[serde(rename = "stopPrice", skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<String>,
    #[serde(rename = "stopPriceType", skip_serializing_if = "Option::is_none")]
    pub stop_price_type: Option<String>,
    #[serde(rename = "reduceOnly", skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
    #[serde(rename = "timeInForce", skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub body: PlaceOrderBody,
}

impl RestRequest for PlaceOrder {
    type Response = KucoinResponse<KucoinOrderAck>;
    type QueryParams = ();
    type Body = PlaceOrderBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v1/orders")
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }
}

#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_id: String,
}

impl RestRequest for CancelOrder {
    type Response = KucoinResponse<KucoinCancelledIds>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Owned(format!("/api/v1/orders/{}", self.order_id))
    }

    fn method() -> Method {
        Method::DELETE
    }
}

#[derive(Debug, Clone)]
pub struct QueryOrder {
    pub order_id: String,
}

impl RestRequest for QueryOrder {
    type Response = KucoinResponse<KucoinOrder>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Owned(format!("/api/v1/orders/{}", self.order_id))
    }

    fn method() -> Method {
        Method::GET
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolParams {
    pub symbol: String,
}

#[derive(Debug, Clone)]
pub struct CancelAllOrders {
    pub params: SymbolParams,
}

impl RestRequest for CancelAllOrders {
    type Response = KucoinResponse<KucoinCancelledIds>;
    type QueryParams = SymbolParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v1/orders")
    }

    fn method() -> Method {
        Method::DELETE
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeMarginModeBody {
    pub symbol: String,
    #[serde(rename = "marginMode")]
    pub margin_mode: String,
}

#[derive(Debug, Clone)]
pub struct ChangeMarginMode {
    pub body: ChangeMarginModeBody,
}

impl RestRequest for ChangeMarginMode {
    type Response = KucoinResponse<serde_json::Value>;
    type QueryParams = ();
    type Body = ChangeMarginModeBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/position/changeMarginMode")
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FillsParams {
    pub symbol: String,
}

#[derive(Debug, Clone)]
pub struct GetFills {
    pub params: FillsParams,
}

impl RestRequest for GetFills {
    type Response = KucoinResponse<KucoinPage<KucoinFill>>;
    type QueryParams = FillsParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v1/fills")
    }

    fn method() -> Method {
        Method::GET
    }

    fn weight() -> u32 {
        5
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}
