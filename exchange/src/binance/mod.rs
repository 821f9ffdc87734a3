//! Binance USD-M futures adapter.
//!
//! STOP_MARKET orders route through the dedicated algo endpoints (the
//! venue moved trigger orders off `/fapi/v1/order` in Dec-2025); cancel and
//! query for those orders must use the algo routes as well, which is why
//! [`OrderRef::is_algo`](crate::model::OrderRef) travels with every order
//! reference.

use crate::{
    credentials::ApiCredentials,
    error::AdapterError,
    model::{
        AccountBalance, ExchangeCapabilities, ExchangePosition, Kline, KlineInterval, OrderAck,
        OrderKind, OrderRef, OrderSnapshot, PlaceOrderRequest, SymbolInfo, TradeFill,
    },
    ExchangeAdapter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escada_integration::{AccountRateLimiter, RestClient, TransportError};
use escada_markets::{ExchangeId, ExchangeSymbol, LeverageBracket, MarginMode, Side};
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::info;
use url::Url;

pub mod model;
pub mod request;

use request::*;

/// Binance futures execution adapter for one account.
#[derive(Debug)]
pub struct BinanceFutures {
    client: RestClient<BinanceRequestSigner>,
    quote: SmolStr,
}

impl BinanceFutures {
    pub const DEFAULT_BASE_URL: &'static str = "https://fapi.binance.com";

    pub fn new(
        credentials: ApiCredentials,
        base_url: Option<Url>,
        limiter: Arc<AccountRateLimiter>,
        quote: SmolStr,
    ) -> Result<Self, AdapterError> {
        let base_url = match base_url {
            Some(url) => url,
            None => Url::parse(Self::DEFAULT_BASE_URL)
                .map_err(|error| TransportError::BuildRequest(error.to_string()))?,
        };
        let signer = BinanceRequestSigner::new(credentials.api_key, credentials.api_secret);
        Ok(Self {
            client: RestClient::new(base_url, signer).with_limiter(limiter),
            quote,
        })
    }

    fn interval_str(interval: KlineInterval) -> &'static str {
        match interval {
            KlineInterval::OneMinute => "1m",
            KlineInterval::OneHour => "1h",
            KlineInterval::OneDay => "1d",
        }
    }

    fn side_str(side: Side) -> &'static str {
        match side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    fn order_type_str(kind: OrderKind) -> &'static str {
        match kind {
            OrderKind::Market => "MARKET",
            OrderKind::Limit | OrderKind::ProfitLimit => "LIMIT",
            OrderKind::StopMarket => "STOP_MARKET",
        }
    }

    /// Build the shared placement params; the caller picks the endpoint.
    fn prepare_place(
        &self,
        symbol: &ExchangeSymbol,
        order: &PlaceOrderRequest,
    ) -> PlaceOrderParams {
        PlaceOrderParams {
            symbol: self.format_pair(symbol),
            side: Self::side_str(order.side).to_string(),
            position_side: order.direction.as_str().to_string(),
            order_type: Self::order_type_str(order.kind).to_string(),
            quantity: order.quantity.to_string(),
            price: order.price.map(|price| price.to_string()),
            stop_price: order.stop_price.map(|price| price.to_string()),
            time_in_force: matches!(order.kind, OrderKind::Limit | OrderKind::ProfitLimit)
                .then(|| "GTC".to_string()),
            // hedge mode: positionSide already scopes the order and the venue
            // rejects an explicit reduceOnly alongside it
            reduce_only: None,
            new_client_order_id: order.client_order_id.to_string(),
        }
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceFutures {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::BinanceFutures
    }

    fn capabilities(&self) -> ExchangeCapabilities {
        ExchangeCapabilities::for_exchange(ExchangeId::BinanceFutures)
    }

    fn format_pair(&self, symbol: &ExchangeSymbol) -> String {
        format!("{}{}", symbol.token, symbol.quote)
    }

    async fn server_time(&self) -> Result<DateTime<Utc>, AdapterError> {
        let response = self.client.execute(GetServerTime).await?;
        model::resolve_server_time(response)
    }

    async fn exchange_info(&self) -> Result<Vec<SymbolInfo>, AdapterError> {
        let response = self.client.execute(GetExchangeInfo).await?;
        model::resolve_symbol_info(response)
    }

    async fn mark_price(&self, symbol: &ExchangeSymbol) -> Result<Decimal, AdapterError> {
        let response = self
            .client
            .execute(GetMarkPrice {
                params: SymbolParams {
                    symbol: self.format_pair(symbol),
                },
            })
            .await?;
        escada_markets::parse_decimal(&response.mark_price)
            .map_err(|error| AdapterError::decode(error.to_string()))
    }

    async fn klines(
        &self,
        symbol: &ExchangeSymbol,
        interval: KlineInterval,
        limit: u32,
    ) -> Result<Vec<Kline>, AdapterError> {
        let response = self
            .client
            .execute(GetKlines {
                params: KlinesParams {
                    symbol: self.format_pair(symbol),
                    interval: Self::interval_str(interval).to_string(),
                    limit,
                },
            })
            .await?;
        model::resolve_klines(response)
    }

    async fn leverage_brackets(
        &self,
        symbol: &ExchangeSymbol,
    ) -> Result<Vec<LeverageBracket>, AdapterError> {
        let response = self
            .client
            .execute(GetLeverageBrackets {
                params: SymbolParams {
                    symbol: self.format_pair(symbol),
                },
            })
            .await?;
        model::resolve_brackets(response)
    }

    async fn balance(&self) -> Result<AccountBalance, AdapterError> {
        let response = self.client.execute(GetBalance).await?;
        model::resolve_balance(response, &self.quote)
    }

    async fn positions(&self) -> Result<FnvHashMap<String, ExchangePosition>, AdapterError> {
        let response = self.client.execute(GetPositionRisk).await?;
        Ok(model::resolve_positions(response)?
            .into_iter()
            .map(|position| (position.key.clone(), position))
            .collect())
    }

    async fn open_orders(
        &self,
        symbol: &ExchangeSymbol,
    ) -> Result<Vec<OrderSnapshot>, AdapterError> {
        let response = self
            .client
            .execute(GetOpenOrders {
                params: SymbolParams {
                    symbol: self.format_pair(symbol),
                },
            })
            .await?;
        response.into_iter().map(model::resolve_order).collect()
    }

    async fn place_order(
        &self,
        symbol: &ExchangeSymbol,
        order: &PlaceOrderRequest,
    ) -> Result<OrderAck, AdapterError> {
        let params = self.prepare_place(symbol, order);
        if self.capabilities().is_algo_order(order.kind) {
            let response = self.client.execute(PlaceAlgoOrder { params }).await?;
            info!(algo_id = %response.algo_id, kind = %order.kind, "placed algo order");
            Ok(model::resolve_algo_ack(response))
        } else {
            let response = self.client.execute(PlaceOrder { params }).await?;
            info!(order_id = %response.order_id, kind = %order.kind, "placed order");
            Ok(model::resolve_order_ack(response))
        }
    }

    async fn cancel_order(
        &self,
        symbol: &ExchangeSymbol,
        order: &OrderRef,
    ) -> Result<OrderAck, AdapterError> {
        let params = OrderIdParams {
            symbol: self.format_pair(symbol),
            order_id: order.exchange_order_id.clone(),
        };
        if order.is_algo {
            let response = self.client.execute(CancelAlgoOrder { params }).await?;
            Ok(model::resolve_algo_ack(response))
        } else {
            let response = self.client.execute(CancelOrder { params }).await?;
            Ok(model::resolve_order_ack(response))
        }
    }

    async fn modify_order(
        &self,
        symbol: &ExchangeSymbol,
        order: &OrderRef,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<OrderAck, AdapterError> {
        if order.is_algo {
            return Err(AdapterError::UnsupportedOperation(
                "algo orders cannot be modified in place; cancel and recreate",
            ));
        }
        // the modify endpoint requires the resting order's side
        let resting = self
            .client
            .execute(QueryOrder {
                params: OrderIdParams {
                    symbol: self.format_pair(symbol),
                    order_id: order.exchange_order_id.clone(),
                },
            })
            .await?;
        let side = resting
            .side
            .clone()
            .ok_or_else(|| AdapterError::decode("resting order missing side"))?;
        let response = self
            .client
            .execute(ModifyOrder {
                params: ModifyOrderParams {
                    symbol: self.format_pair(symbol),
                    order_id: order.exchange_order_id.clone(),
                    side,
                    quantity: quantity.to_string(),
                    price: price.to_string(),
                },
            })
            .await?;
        Ok(model::resolve_order_ack(response))
    }

    async fn query_order(
        &self,
        symbol: &ExchangeSymbol,
        order: &OrderRef,
    ) -> Result<OrderSnapshot, AdapterError> {
        let params = OrderIdParams {
            symbol: self.format_pair(symbol),
            order_id: order.exchange_order_id.clone(),
        };
        if order.is_algo {
            let response = self.client.execute(QueryAlgoOrder { params }).await?;
            model::resolve_algo_order(response)
        } else {
            let response = self.client.execute(QueryOrder { params }).await?;
            model::resolve_order(response)
        }
    }

    async fn cancel_all_orders(&self, symbol: &ExchangeSymbol) -> Result<(), AdapterError> {
        let response = self
            .client
            .execute(CancelAllOrders {
                params: SymbolParams {
                    symbol: self.format_pair(symbol),
                },
            })
            .await?;
        if response.code == 200 {
            Ok(())
        } else {
            Err(AdapterError::Venue {
                code: response.code,
                message: response.msg,
            })
        }
    }

    async fn set_leverage(
        &self,
        symbol: &ExchangeSymbol,
        leverage: u32,
    ) -> Result<(), AdapterError> {
        self.client
            .execute(SetLeverage {
                params: SetLeverageParams {
                    symbol: self.format_pair(symbol),
                    leverage,
                },
            })
            .await?;
        Ok(())
    }

    async fn set_margin_mode(
        &self,
        symbol: &ExchangeSymbol,
        mode: MarginMode,
        _leverage: Option<u32>,
    ) -> Result<(), AdapterError> {
        let margin_type = match mode {
            MarginMode::Isolated => "ISOLATED",
            MarginMode::Crossed => "CROSSED",
        };
        let result = self
            .client
            .execute(SetMarginType {
                params: SetMarginTypeParams {
                    symbol: self.format_pair(symbol),
                    margin_type: margin_type.to_string(),
                },
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            // -4046: "No need to change margin type" - already in the mode
            Err(TransportError::Api { body, .. }) if body.contains("-4046") => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn trade_history(
        &self,
        symbol: &ExchangeSymbol,
        limit: u32,
    ) -> Result<Vec<TradeFill>, AdapterError> {
        let response = self
            .client
            .execute(GetUserTrades {
                params: UserTradesParams {
                    symbol: self.format_pair(symbol),
                    limit,
                },
            })
            .await?;
        model::resolve_trades(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn adapter() -> BinanceFutures {
        BinanceFutures::new(
            ApiCredentials::new("key", "secret"),
            None,
            Arc::new(AccountRateLimiter::new(2400)),
            SmolStr::new("USDT"),
        )
        .unwrap()
    }

    #[test]
    fn formats_pair_as_concatenation() {
        let adapter = adapter();
        let symbol = crate::mock::test_symbol(ExchangeId::BinanceFutures);
        assert_eq!(adapter.format_pair(&symbol), "BTCUSDT");
    }

    #[test]
    fn prepare_place_maps_canonical_fields() {
        let adapter = adapter();
        let symbol = crate::mock::test_symbol(ExchangeId::BinanceFutures);
        let request = PlaceOrderRequest {
            side: Side::Buy,
            direction: escada_markets::Direction::Long,
            kind: OrderKind::Limit,
            quantity: dec!(0.312),
            price: Some(dec!(98)),
            stop_price: None,
            client_order_id: SmolStr::new("escada-p1-l1"),
            reduce_only: false,
        };
        let params = adapter.prepare_place(&symbol, &request);
        assert_eq!(params.symbol, "BTCUSDT");
        assert_eq!(params.side, "BUY");
        assert_eq!(params.position_side, "LONG");
        assert_eq!(params.order_type, "LIMIT");
        assert_eq!(params.time_in_force.as_deref(), Some("GTC"));
        assert_eq!(params.reduce_only, None);
    }

    #[test]
    fn stop_market_is_routed_as_algo() {
        let adapter = adapter();
        assert!(adapter.capabilities().is_algo_order(OrderKind::StopMarket));
        assert!(!adapter.capabilities().is_algo_order(OrderKind::ProfitLimit));
    }
}
