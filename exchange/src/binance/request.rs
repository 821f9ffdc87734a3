//! Binance USD-M futures: request signing and endpoint definitions.

use chrono::Utc;
use escada_integration::{
    error::TransportError,
    protocol::http::{private::{encode_query, RequestSigner}, rest::RestRequest},
};
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::Serialize;
use sha2::Sha256;
use std::borrow::Cow;

use super::model::*;

/// Binance request signer: HMAC-SHA256 over the canonical query string, with
/// the millisecond timestamp appended and the API key in `X-MBX-APIKEY`.
#[derive(Debug, Clone)]
pub struct BinanceRequestSigner {
    api_key: String,
    secret_key: String,
}

impl BinanceRequestSigner {
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key,
        }
    }

    fn generate_signature(&self, query_string: &str) -> Result<String, TransportError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .map_err(|error| TransportError::Signature(error.to_string()))?;
        mac.update(query_string.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl RequestSigner for BinanceRequestSigner {
    fn sign<Request>(
        &self,
        request: &Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, TransportError>
    where
        Request: RestRequest,
    {
        let builder = builder.header("X-MBX-APIKEY", &self.api_key);
        if !Request::signed() {
            return builder
                .build()
                .map_err(|error| TransportError::BuildRequest(error.to_string()));
        }

        let query_string = match request.query_params() {
            Some(params) => {
                let serialized = encode_query(params)?;
                if serialized.is_empty() {
                    format!("timestamp={}", Utc::now().timestamp_millis())
                } else {
                    format!("{serialized}&timestamp={}", Utc::now().timestamp_millis())
                }
            }
            None => format!("timestamp={}", Utc::now().timestamp_millis()),
        };

        let signature = self.generate_signature(&query_string)?;
        let signed_query = format!("{query_string}&signature={signature}");

        let mut http_request = builder
            .build()
            .map_err(|error| TransportError::BuildRequest(error.to_string()))?;
        http_request.url_mut().set_query(Some(&signed_query));
        Ok(http_request)
    }
}

// REST Request implementations for the Binance futures endpoints.

/// Get server time.
#[derive(Debug, Clone)]
pub struct GetServerTime;

impl RestRequest for GetServerTime {
    type Response = BinanceServerTime;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/time")
    }

    fn method() -> Method {
        Method::GET
    }

    fn signed() -> bool {
        false
    }
}

/// Get exchange information (symbols and trading filters).
#[derive(Debug, Clone)]
pub struct GetExchangeInfo;

impl RestRequest for GetExchangeInfo {
    type Response = BinanceExchangeInfo;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/exchangeInfo")
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

#[derive(Debug, Clone, Serialize)]
pub struct SymbolParams {
    pub symbol: String,
}

/// Get the premium index (mark price) for one symbol.
#[derive(Debug, Clone)]
pub struct GetMarkPrice {
    pub params: SymbolParams,
}

impl RestRequest for GetMarkPrice {
    type Response = BinancePremiumIndex;
    type QueryParams = SymbolParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/premiumIndex")
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
pub struct KlinesParams {
    pub symbol: String,
    pub interval: String,
    pub limit: u32,
}

/// Get candles.
#[derive(Debug, Clone)]
pub struct GetKlines {
    pub params: KlinesParams,
}

impl RestRequest for GetKlines {
    type Response = Vec<BinanceKline>;
    type QueryParams = KlinesParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/klines")
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

/// Get the leverage bracket table for one symbol.
#[derive(Debug, Clone)]
pub struct GetLeverageBrackets {
    pub params: SymbolParams,
}

impl RestRequest for GetLeverageBrackets {
    type Response = Vec<BinanceSymbolBrackets>;
    type QueryParams = SymbolParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/leverageBracket")
    }

    fn method() -> Method {
        Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

/// Get futures account balances.
#[derive(Debug, Clone)]
pub struct GetBalance;

impl RestRequest for GetBalance {
    type Response = Vec<BinanceBalanceEntry>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v2/balance")
    }

    fn method() -> Method {
        Method::GET
    }

    fn weight() -> u32 {
        5
    }
}

/// Get open positions (position risk).
#[derive(Debug, Clone)]
pub struct GetPositionRisk;

impl RestRequest for GetPositionRisk {
    type Response = Vec<BinancePositionRisk>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v2/positionRisk")
    }

    fn method() -> Method {
        Method::GET
    }

    fn weight() -> u32 {
        5
    }
}

/// Get open orders for one symbol.
#[derive(Debug, Clone)]
pub struct GetOpenOrders {
    pub params: SymbolParams,
}

impl RestRequest for GetOpenOrders {
    type Response = Vec<BinanceOrder>;
    type QueryParams = SymbolParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/openOrders")
    }

    fn method() -> Method {
        Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderParams {
    pub symbol: String,
    pub side: String,
    #[serde(rename = "positionSide")]
    pub position_side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub quantity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(rename = "stopPrice", skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<String>,
    #[serde(rename = "timeInForce", skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<String>,
    #[serde(rename = "reduceOnly", skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
    #[serde(rename = "newClientOrderId")]
    pub new_client_order_id: String,
}

/// Create a new order.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub params: PlaceOrderParams,
}

impl RestRequest for PlaceOrder {
    type Response = BinanceOrder;
    type QueryParams = PlaceOrderParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/order")
    }

    fn method() -> Method {
        Method::POST
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

/// Create a new algo (trigger) order. Since Dec-2025 STOP_MARKET orders are
/// routed here rather than through `/fapi/v1/order`.
#[derive(Debug, Clone)]
pub struct PlaceAlgoOrder {
    pub params: PlaceOrderParams,
}

impl RestRequest for PlaceAlgoOrder {
    type Response = BinanceAlgoOrder;
    type QueryParams = PlaceOrderParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/algo/order")
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
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
}

/// Cancel a resting order.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub params: OrderIdParams,
}

impl RestRequest for CancelOrder {
    type Response = BinanceOrder;
    type QueryParams = OrderIdParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/order")
    }

    fn method() -> Method {
        Method::DELETE
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

/// Cancel a resting algo order.
#[derive(Debug, Clone)]
pub struct CancelAlgoOrder {
    pub params: OrderIdParams,
}

impl RestRequest for CancelAlgoOrder {
    type Response = BinanceAlgoOrder;
    type QueryParams = OrderIdParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/algo/order")
    }

    fn method() -> Method {
        Method::DELETE
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModifyOrderParams {
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub side: String,
    pub quantity: String,
    pub price: String,
}

/// Modify a resting non-algo order in place.
#[derive(Debug, Clone)]
pub struct ModifyOrder {
    pub params: ModifyOrderParams,
}

impl RestRequest for ModifyOrder {
    type Response = BinanceOrder;
    type QueryParams = ModifyOrderParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/order")
    }

    fn method() -> Method {
        Method::PUT
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

/// Query one order.
#[derive(Debug, Clone)]
pub struct QueryOrder {
    pub params: OrderIdParams,
}

impl RestRequest for QueryOrder {
    type Response = BinanceOrder;
    type QueryParams = OrderIdParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/order")
    }

    fn method() -> Method {
        Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

/// Query one algo order.
#[derive(Debug, Clone)]
pub struct QueryAlgoOrder {
    pub params: OrderIdParams,
}

impl RestRequest for QueryAlgoOrder {
    type Response = BinanceAlgoOrder;
    type QueryParams = OrderIdParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/algo/order")
    }

    fn method() -> Method {
        Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

/// Cancel all resting non-algo orders on one symbol.
#[derive(Debug, Clone)]
pub struct CancelAllOrders {
    pub params: SymbolParams,
}

impl RestRequest for CancelAllOrders {
    type Response = BinanceCodeMessage;
    type QueryParams = SymbolParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/allOpenOrders")
    }

    fn method() -> Method {
        Method::DELETE
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SetLeverageParams {
    pub symbol: String,
    pub leverage: u32,
}

/// Set initial leverage for one symbol.
#[derive(Debug, Clone)]
pub struct SetLeverage {
    pub params: SetLeverageParams,
}

impl RestRequest for SetLeverage {
    type Response = BinanceLeverageAck;
    type QueryParams = SetLeverageParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/leverage")
    }

    fn method() -> Method {
        Method::POST
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SetMarginTypeParams {
    pub symbol: String,
    #[serde(rename = "marginType")]
    pub margin_type: String,
}

/// Set the margin type (ISOLATED / CROSSED) for one symbol.
#[derive(Debug, Clone)]
pub struct SetMarginType {
    pub params: SetMarginTypeParams,
}

impl RestRequest for SetMarginType {
    type Response = BinanceCodeMessage;
    type QueryParams = SetMarginTypeParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/marginType")
    }

    fn method() -> Method {
        Method::POST
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserTradesParams {
    pub symbol: String,
    pub limit: u32,
}

/// Get recent account trades for one symbol.
#[derive(Debug, Clone)]
pub struct GetUserTrades {
    pub params: UserTradesParams,
}

impl RestRequest for GetUserTrades {
    type Response = Vec<BinanceUserTrade>;
    type QueryParams = UserTradesParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/userTrades")
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
