//! Kraken futures: request signing and endpoint definitions.
//!
//! Signature scheme: `Authent = base64(HMAC-SHA512(base64decode(secret),
//! SHA256(postData + nonce + endpointPath)))` with the API key and nonce in
//! headers. All parameters travel in the query string, including for POST.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use escada_integration::{
    error::TransportError,
    protocol::http::{
        private::{encode_query, RequestSigner},
        rest::RestRequest,
    },
};
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::Serialize;
use sha2::{Digest, Sha256, Sha512};
use std::borrow::Cow;

use super::model::*;

#[derive(Debug, Clone)]
pub struct KrakenRequestSigner {
    api_key: String,
    private_key: String,
}

impl KrakenRequestSigner {
    pub fn new(api_key: String, private_key: String) -> Self {
        Self {
            api_key,
            private_key,
        }
    }

    fn generate_authent(
        &self,
        post_data: &str,
        nonce: &str,
        path: &str,
    ) -> Result<String, TransportError> {
        let digest = Sha256::digest(format!("{post_data}{nonce}{path}").as_bytes());
        let key = BASE64
            .decode(&self.private_key)
            .map_err(|error| TransportError::Signature(error.to_string()))?;
        let mut mac = Hmac::<Sha512>::new_from_slice(&key)
            .map_err(|error| TransportError::Signature(error.to_string()))?;
        mac.update(&digest);
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

impl RequestSigner for KrakenRequestSigner {
    fn sign<Request>(
        &self,
        request: &Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, TransportError>
    where
        Request: RestRequest,
    {
        if !Request::signed() {
            return builder
                .build()
                .map_err(|error| TransportError::BuildRequest(error.to_string()));
        }

        let post_data = match request.query_params() {
            Some(params) => encode_query(params)?,
            None => String::new(),
        };
        let nonce = Utc::now().timestamp_millis().to_string();
        let authent = self.generate_authent(&post_data, &nonce, request.path().as_ref())?;

        builder
            .header("APIKey", &self.api_key)
            .header("Nonce", nonce)
            .header("Authent", authent)
            .build()
            .map_err(|error| TransportError::BuildRequest(error.to_string()))
    }
}

// REST Request implementations for the Kraken futures endpoints.

#[derive(Debug, Clone)]
pub struct GetInstruments;

impl RestRequest for GetInstruments {
    type Response = KrakenInstruments;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/derivatives/api/v3/instruments")
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
pub struct GetTickers;

impl RestRequest for GetTickers {
    type Response = KrakenTickers;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/derivatives/api/v3/tickers")
    }

    fn method() -> Method {
        Method::GET
    }

    fn signed() -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct GetAccounts;

impl RestRequest for GetAccounts {
    type Response = KrakenAccounts;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/derivatives/api/v3/accounts")
    }

    fn method() -> Method {
        Method::GET
    }

    fn weight() -> u32 {
        5
    }
}

#[derive(Debug, Clone)]
pub struct GetOpenPositions;

impl RestRequest for GetOpenPositions {
    type Response = KrakenOpenPositions;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/derivatives/api/v3/openpositions")
    }

    fn method() -> Method {
        Method::GET
    }

    fn weight() -> u32 {
        5
    }
}

#[derive(Debug, Clone)]
pub struct GetOpenOrders;

impl RestRequest for GetOpenOrders {
    type Response = KrakenOpenOrders;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/derivatives/api/v3/openorders")
    }

    fn method() -> Method {
        Method::GET
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SendOrderParams {
    #[serde(rename = "orderType")]
    pub order_type: String,
    pub symbol: String,
    pub side: String,
    pub size: String,
    #[serde(rename = "limitPrice", skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
    #[serde(rename = "stopPrice", skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<String>,
    #[serde(rename = "cliOrdId")]
    pub cli_ord_id: String,
    #[serde(rename = "reduceOnly", skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct SendOrder {
    pub params: SendOrderParams,
}

impl RestRequest for SendOrder {
    type Response = KrakenSendOrder;
    type QueryParams = SendOrderParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/derivatives/api/v3/sendorder")
    }

    fn method() -> Method {
        Method::POST
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderIdParams {
    #[serde(rename = "order_id")]
    pub order_id: String,
}

#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub params: OrderIdParams,
}

impl RestRequest for CancelOrder {
    type Response = KrakenCancelOrder;
    type QueryParams = OrderIdParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/derivatives/api/v3/cancelorder")
    }

    fn method() -> Method {
        Method::POST
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EditOrderParams {
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub size: String,
    #[serde(rename = "limitPrice")]
    pub limit_price: String,
}

#[derive(Debug, Clone)]
pub struct EditOrder {
    pub params: EditOrderParams,
}

impl RestRequest for EditOrder {
    type Response = KrakenEditOrder;
    type QueryParams = EditOrderParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/derivatives/api/v3/editorder")
    }

    fn method() -> Method {
        Method::POST
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
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
    type Response = KrakenCancelAll;
    type QueryParams = SymbolParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/derivatives/api/v3/cancelallorders")
    }

    fn method() -> Method {
        Method::POST
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

/// Combined margin-mode + leverage preference. Omitting `maxLeverage`
/// selects cross margin.
#[derive(Debug, Clone, Serialize)]
pub struct LeveragePreferenceParams {
    pub symbol: String,
    #[serde(rename = "maxLeverage", skip_serializing_if = "Option::is_none")]
    pub max_leverage: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SetLeveragePreference {
    pub params: LeveragePreferenceParams,
}

impl RestRequest for SetLeveragePreference {
    type Response = KrakenResult;
    type QueryParams = LeveragePreferenceParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/derivatives/api/v3/leveragepreferences")
    }

    fn method() -> Method {
        Method::PUT
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone)]
pub struct GetFills;

impl RestRequest for GetFills {
    type Response = KrakenFills;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/derivatives/api/v3/fills")
    }

    fn method() -> Method {
        Method::GET
    }

    fn weight() -> u32 {
        5
    }
}

/// Candles live on the charts API, outside the derivatives prefix.
#[derive(Debug, Clone)]
pub struct GetCandles {
    pub symbol: String,
    pub resolution: String,
}

impl RestRequest for GetCandles {
    type Response = KrakenCandles;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Owned(format!(
            "/api/charts/v1/trade/{}/{}",
            self.symbol, self.resolution
        ))
    }

    fn method() -> Method {
        Method::GET
    }

    fn signed() -> bool {
        false
    }
}
