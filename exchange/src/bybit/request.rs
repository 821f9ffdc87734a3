//! Bybit v5: request signing and endpoint definitions.
//!
//! Signature scheme: `HMAC-SHA256(secret, timestamp + api_key + recv_window +
//! payload)` where payload is the query string for GET and the JSON body for
//! POST, delivered through the `X-BAPI-*` headers.

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

const RECV_WINDOW: &str = "5000";

#[derive(Debug, Clone)]
pub struct BybitRequestSigner {
    api_key: String,
    secret_key: String,
}

impl BybitRequestSigner {
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key,
        }
    }

    fn generate_signature(&self, payload: &str) -> Result<String, TransportError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .map_err(|error| TransportError::Signature(error.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl RequestSigner for BybitRequestSigner {
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

        let payload = match (&body_json, request.query_params()) {
            (Some(json), _) => json.clone(),
            (None, Some(params)) => encode_query(params)?,
            (None, None) => String::new(),
        };
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature =
            self.generate_signature(&format!("{timestamp}{}{RECV_WINDOW}{payload}", self.api_key))?;

        builder
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp)
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .header("X-BAPI-SIGN", signature)
            .build()
            .map_err(|error| TransportError::BuildRequest(error.to_string()))
    }
}

// REST Request implementations for the Bybit v5 endpoints.

#[derive(Debug, Clone, Serialize)]
pub struct CategoryParams {
    pub category: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySymbolParams {
    pub category: String,
    pub symbol: String,
}

#[derive(Debug, Clone)]
pub struct GetServerTime;

impl RestRequest for GetServerTime {
    type Response = BybitResponse<BybitServerTime>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/time")
    }

    fn method() -> Method {
        Method::GET
    }

    fn signed() -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct GetInstruments {
    pub params: CategoryParams,
}

impl RestRequest for GetInstruments {
    type Response = BybitResponse<BybitList<BybitInstrument>>;
    type QueryParams = CategoryParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/instruments-info")
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

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone)]
pub struct GetTickers {
    pub params: CategorySymbolParams,
}

impl RestRequest for GetTickers {
    type Response = BybitResponse<BybitList<BybitTicker>>;
    type QueryParams = CategorySymbolParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/tickers")
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
pub struct KlineParams {
    pub category: String,
    pub symbol: String,
    pub interval: String,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct GetKlines {
    pub params: KlineParams,
}

impl RestRequest for GetKlines {
    type Response = BybitResponse<BybitList<BybitKline>>;
    type QueryParams = KlineParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/kline")
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

#[derive(Debug, Clone)]
pub struct GetRiskLimits {
    pub params: CategorySymbolParams,
}

impl RestRequest for GetRiskLimits {
    type Response = BybitResponse<BybitList<BybitRiskLimit>>;
    type QueryParams = CategorySymbolParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/risk-limit")
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
pub struct WalletBalanceParams {
    #[serde(rename = "accountType")]
    pub account_type: String,
}

#[derive(Debug, Clone)]
pub struct GetWalletBalance {
    pub params: WalletBalanceParams,
}

impl RestRequest for GetWalletBalance {
    type Response = BybitResponse<BybitList<BybitWallet>>;
    type QueryParams = WalletBalanceParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/account/wallet-balance")
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

#[derive(Debug, Clone, Serialize)]
pub struct PositionListParams {
    pub category: String,
    #[serde(rename = "settleCoin")]
    pub settle_coin: String,
}

#[derive(Debug, Clone)]
pub struct GetPositions {
    pub params: PositionListParams,
}

impl RestRequest for GetPositions {
    type Response = BybitResponse<BybitList<BybitPosition>>;
    type QueryParams = PositionListParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/position/list")
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

#[derive(Debug, Clone, Serialize)]
pub struct OrderRealtimeParams {
    pub category: String,
    pub symbol: String,
    #[serde(rename = "orderId", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GetOpenOrders {
    pub params: OrderRealtimeParams,
}

impl RestRequest for GetOpenOrders {
    type Response = BybitResponse<BybitList<BybitOrder>>;
    type QueryParams = OrderRealtimeParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/order/realtime")
    }

    fn method() -> Method {
        Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderBody {
    pub category: String,
    pub symbol: String,
    pub side: String,
    #[serde(rename = "orderType")]
    pub order_type: String,
    pub qty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(rename = "triggerPrice", skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<String>,
    #[serde(rename = "timeInForce", skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<String>,
    #[serde(rename = "reduceOnly", skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
    #[serde(rename = "positionIdx")]
    pub position_idx: u8,
    #[serde(rename = "orderLinkId")]
    pub order_link_id: String,
}

#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub body: CreateOrderBody,
}

impl RestRequest for CreateOrder {
    type Response = BybitResponse<BybitOrderAck>;
    type QueryParams = ();
    type Body = CreateOrderBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/order/create")
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderIdBody {
    pub category: String,
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
}

#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub body: OrderIdBody,
}

impl RestRequest for CancelOrder {
    type Response = BybitResponse<BybitOrderAck>;
    type QueryParams = ();
    type Body = OrderIdBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/order/cancel")
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AmendOrderBody {
    pub category: String,
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub qty: String,
    pub price: String,
}

#[derive(Debug, Clone)]
pub struct AmendOrder {
    pub body: AmendOrderBody,
}

impl RestRequest for AmendOrder {
    type Response = BybitResponse<BybitOrderAck>;
    type QueryParams = ();
    type Body = AmendOrderBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/order/amend")
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelAllBody {
    pub category: String,
    pub symbol: String,
}

#[derive(Debug, Clone)]
pub struct CancelAllOrders {
    pub body: CancelAllBody,
}

impl RestRequest for CancelAllOrders {
    type Response = BybitResponse<serde_json::Value>;
    type QueryParams = ();
    type Body = CancelAllBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/order/cancel-all")
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SetLeverageBody {
    pub category: String,
    pub symbol: String,
    #[serde(rename = "buyLeverage")]
    pub buy_leverage: String,
    #[serde(rename = "sellLeverage")]
    pub sell_leverage: String,
}

#[derive(Debug, Clone)]
pub struct SetLeverage {
    pub body: SetLeverageBody,
}

impl RestRequest for SetLeverage {
    type Response = BybitResponse<serde_json::Value>;
    type QueryParams = ();
    type Body = SetLeverageBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/position/set-leverage")
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchIsolatedBody {
    pub category: String,
    pub symbol: String,
    #[serde(rename = "tradeMode")]
    pub trade_mode: u8,
    #[serde(rename = "buyLeverage")]
    pub buy_leverage: String,
    #[serde(rename = "sellLeverage")]
    pub sell_leverage: String,
}

#[derive(Debug, Clone)]
pub struct SwitchIsolated {
    pub body: SwitchIsolatedBody,
}

impl RestRequest for SwitchIsolated {
    type Response = BybitResponse<serde_json::Value>;
    type QueryParams = ();
    type Body = SwitchIsolatedBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/position/switch-isolated")
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionListParams {
    pub category: String,
    pub symbol: String,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct GetExecutions {
    pub params: ExecutionListParams,
}

impl RestRequest for GetExecutions {
    type Response = BybitResponse<BybitList<BybitExecution>>;
    type QueryParams = ExecutionListParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/execution/list")
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
