//! BitGet v2 mix: request signing and endpoint definitions.
//!
//! Signature scheme: `base64(HMAC-SHA256(secret, timestamp + METHOD +
//! requestPath(+query) + body))`, delivered through `ACCESS-*` headers along
//! with the account passphrase.

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
pub struct BitgetRequestSigner {
    api_key: String,
    secret_key: String,
    passphrase: String,
}

impl BitgetRequestSigner {
    pub fn new(api_key: String, secret_key: String, passphrase: String) -> Self {
        Self {
            api_key,
            secret_key,
            passphrase,
        }
    }

    fn generate_signature(&self, prehash: &str) -> Result<String, TransportError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .map_err(|error| TransportError::Signature(error.to_string()))?;
        mac.update(prehash.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

impl RequestSigner for BitgetRequestSigner {
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
        let signature = self.generate_signature(&prehash)?;

        builder
            .header("ACCESS-KEY", &self.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", timestamp)
            .header("ACCESS-PASSPHRASE", &self.passphrase)
            .build()
            .map_err(|error| TransportError::BuildRequest(error.to_string()))
    }
}

// REST Request implementations for the BitGet v2 mix endpoints.

#[derive(Debug, Clone, Serialize)]
pub struct ProductParams {
    #[serde(rename = "productType")]
    pub product_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductSymbolParams {
    pub symbol: String,
    #[serde(rename = "productType")]
    pub product_type: String,
}

#[derive(Debug, Clone)]
pub struct GetServerTime;

impl RestRequest for GetServerTime {
    type Response = BitgetResponse<BitgetServerTime>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/public/time")
    }

    fn method() -> Method {
        Method::GET
    }

    fn signed() -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct GetContracts {
    pub params: ProductParams,
}

impl RestRequest for GetContracts {
    type Response = BitgetResponse<Vec<BitgetContract>>;
    type QueryParams = ProductParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/market/contracts")
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
pub struct GetTicker {
    pub params: ProductSymbolParams,
}

impl RestRequest for GetTicker {
    type Response = BitgetResponse<Vec<BitgetTicker>>;
    type QueryParams = ProductSymbolParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/market/ticker")
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
pub struct CandlesParams {
    pub symbol: String,
    #[serde(rename = "productType")]
    pub product_type: String,
    pub granularity: String,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct GetCandles {
    pub params: CandlesParams,
}

impl RestRequest for GetCandles {
    type Response = BitgetResponse<Vec<BitgetCandle>>;
    type QueryParams = CandlesParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/market/candles")
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
pub struct GetPositionTiers {
    pub params: ProductSymbolParams,
}

impl RestRequest for GetPositionTiers {
    type Response = BitgetResponse<Vec<BitgetPositionTier>>;
    type QueryParams = ProductSymbolParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/market/query-position-lever")
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
pub struct AccountParams {
    pub symbol: String,
    #[serde(rename = "productType")]
    pub product_type: String,
    #[serde(rename = "marginCoin")]
    pub margin_coin: String,
}

#[derive(Debug, Clone)]
pub struct GetAccount {
    pub params: AccountParams,
}

impl RestRequest for GetAccount {
    type Response = BitgetResponse<BitgetAccount>;
    type QueryParams = AccountParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/account/account")
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
pub struct AllPositionsParams {
    #[serde(rename = "productType")]
    pub product_type: String,
    #[serde(rename = "marginCoin")]
    pub margin_coin: String,
}

#[derive(Debug, Clone)]
pub struct GetAllPositions {
    pub params: AllPositionsParams,
}

impl RestRequest for GetAllPositions {
    type Response = BitgetResponse<Vec<BitgetPosition>>;
    type QueryParams = AllPositionsParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/position/all-position")
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
pub struct GetPendingOrders {
    pub params: ProductSymbolParams,
}

impl RestRequest for GetPendingOrders {
    type Response = BitgetResponse<BitgetPendingOrders>;
    type QueryParams = ProductSymbolParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/order/orders-pending")
    }

    fn method() -> Method {
        Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone)]
pub struct GetPendingPlanOrders {
    pub params: ProductSymbolParams,
}

impl RestRequest for GetPendingPlanOrders {
    type Response = BitgetResponse<BitgetPendingPlanOrders>;
    type QueryParams = ProductSymbolParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/order/orders-plan-pending")
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
    pub symbol: String,
    #[serde(rename = "productType")]
    pub product_type: String,
    #[serde(rename = "marginMode")]
    pub margin_mode: String,
    #[serde(rename = "marginCoin")]
    pub margin_coin: String,
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    pub side: String,
    #[serde(rename = "tradeSide")]
    pub trade_side: String,
    #[serde(rename = "orderType")]
    pub order_type: String,
    #[serde(rename = "clientOid")]
    pub client_oid: String,
    #[serde(rename = "reduceOnly", skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub body: PlaceOrderBody,
}

impl RestRequest for PlaceOrder {
    type Response = BitgetResponse<BitgetOrderAck>;
    type QueryParams = ();
    type Body = PlaceOrderBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/order/place-order")
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }
}

/// Position-attached TP/SL plan. Carries no size: the venue applies it to
/// the whole position.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceTpslBody {
    pub symbol: String,
    #[serde(rename = "productType")]
    pub product_type: String,
    #[serde(rename = "marginCoin")]
    pub margin_coin: String,
    #[serde(rename = "planType")]
    pub plan_type: String,
    #[serde(rename = "triggerPrice")]
    pub trigger_price: String,
    #[serde(rename = "holdSide")]
    pub hold_side: String,
    #[serde(rename = "clientOid")]
    pub client_oid: String,
}

#[derive(Debug, Clone)]
pub struct PlaceTpslOrder {
    pub body: PlaceTpslBody,
}

impl RestRequest for PlaceTpslOrder {
    type Response = BitgetResponse<BitgetOrderAck>;
    type QueryParams = ();
    type Body = PlaceTpslBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/order/place-tpsl-order")
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
    pub symbol: String,
    #[serde(rename = "productType")]
    pub product_type: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
}

#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub body: OrderIdBody,
}

impl RestRequest for CancelOrder {
    type Response = BitgetResponse<BitgetOrderAck>;
    type QueryParams = ();
    type Body = OrderIdBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/order/cancel-order")
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelPlanOrderBody {
    pub symbol: String,
    #[serde(rename = "productType")]
    pub product_type: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "planType")]
    pub plan_type: String,
}

#[derive(Debug, Clone)]
pub struct CancelPlanOrder {
    pub body: CancelPlanOrderBody,
}

impl RestRequest for CancelPlanOrder {
    type Response = BitgetResponse<BitgetOrderAck>;
    type QueryParams = ();
    type Body = CancelPlanOrderBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/order/cancel-plan-order")
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModifyOrderBody {
    pub symbol: String,
    #[serde(rename = "productType")]
    pub product_type: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "newSize")]
    pub new_size: String,
    #[serde(rename = "newPrice")]
    pub new_price: String,
    #[serde(rename = "newClientOid")]
    pub new_client_oid: String,
}

#[derive(Debug, Clone)]
pub struct ModifyOrder {
    pub body: ModifyOrderBody,
}

impl RestRequest for ModifyOrder {
    type Response = BitgetResponse<BitgetOrderAck>;
    type QueryParams = ();
    type Body = ModifyOrderBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/order/modify-order")
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetailParams {
    pub symbol: String,
    #[serde(rename = "productType")]
    pub product_type: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
}

#[derive(Debug, Clone)]
pub struct GetOrderDetail {
    pub params: OrderDetailParams,
}

impl RestRequest for GetOrderDetail {
    type Response = BitgetResponse<BitgetOrder>;
    type QueryParams = OrderDetailParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/order/detail")
    }

    fn method() -> Method {
        Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.params)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SetLeverageBody {
    pub symbol: String,
    #[serde(rename = "productType")]
    pub product_type: String,
    #[serde(rename = "marginCoin")]
    pub margin_coin: String,
    pub leverage: String,
}

#[derive(Debug, Clone)]
pub struct SetLeverage {
    pub body: SetLeverageBody,
}

impl RestRequest for SetLeverage {
    type Response = BitgetResponse<serde_json::Value>;
    type QueryParams = ();
    type Body = SetLeverageBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/account/set-leverage")
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SetMarginModeBody {
    pub symbol: String,
    #[serde(rename = "productType")]
    pub product_type: String,
    #[serde(rename = "marginCoin")]
    pub margin_coin: String,
    #[serde(rename = "marginMode")]
    pub margin_mode: String,
}

#[derive(Debug, Clone)]
pub struct SetMarginMode {
    pub body: SetMarginModeBody,
}

impl RestRequest for SetMarginMode {
    type Response = BitgetResponse<serde_json::Value>;
    type QueryParams = ();
    type Body = SetMarginModeBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/account/set-margin-mode")
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
    #[serde(rename = "productType")]
    pub product_type: String,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct GetFills {
    pub params: FillsParams,
}

impl RestRequest for GetFills {
    type Response = BitgetResponse<BitgetFills>;
    type QueryParams = FillsParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/mix/order/fills")
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
