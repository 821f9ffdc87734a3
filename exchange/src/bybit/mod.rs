//! Bybit linear perpetuals adapter.
//!
//! Trigger orders (stop-loss) share the ordinary order endpoints but carry a
//! `stopOrderType`; the venue reports them as `Untriggered`/`Deactivated`,
//! which normalize to NEW/CANCELLED.

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
use chrono::{DateTime, TimeZone, Utc};
use escada_integration::{AccountRateLimiter, RestClient, TransportError};
use escada_markets::{Direction, ExchangeId, ExchangeSymbol, LeverageBracket, MarginMode, Side};
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::info;
use url::Url;

pub mod model;
pub mod request;

use request::*;

const CATEGORY: &str = "linear";

/// Bybit execution adapter for one account.
#[derive(Debug)]
pub struct Bybit {
    client: RestClient<BybitRequestSigner>,
    quote: SmolStr,
}

impl Bybit {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.bybit.com";

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
        let signer = BybitRequestSigner::new(credentials.api_key, credentials.api_secret);
        Ok(Self {
            client: RestClient::new(base_url, signer).with_limiter(limiter),
            quote,
        })
    }

    fn interval_str(interval: KlineInterval) -> &'static str {
        match interval {
            KlineInterval::OneMinute => "1",
            KlineInterval::OneHour => "60",
            KlineInterval::OneDay => "D",
        }
    }

    fn side_str(side: Side) -> &'static str {
        match side {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }

    /// Hedge-mode position index: 1 buy side, 2 sell side.
    fn position_idx(direction: Direction) -> u8 {
        match direction {
            Direction::Long => 1,
            Direction::Short => 2,
        }
    }
}

#[async_trait]
impl ExchangeAdapter for Bybit {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Bybit
    }

    fn capabilities(&self) -> ExchangeCapabilities {
        ExchangeCapabilities::for_exchange(ExchangeId::Bybit)
    }

    fn format_pair(&self, symbol: &ExchangeSymbol) -> String {
        format!("{}{}", symbol.token, symbol.quote)
    }

    async fn server_time(&self) -> Result<DateTime<Utc>, AdapterError> {
        let response = self.client.execute(GetServerTime).await?.into_result()?;
        let seconds: i64 = response
            .time_second
            .parse()
            .map_err(|_| AdapterError::decode("server time"))?;
        Utc.timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| AdapterError::decode("server time out of range"))
    }

    async fn exchange_info(&self) -> Result<Vec<SymbolInfo>, AdapterError> {
        let response = self
            .client
            .execute(GetInstruments {
                params: CategoryParams {
                    category: CATEGORY.to_string(),
                },
            })
            .await?
            .into_result()?;
        model::resolve_symbol_info(response.list)
    }

    async fn mark_price(&self, symbol: &ExchangeSymbol) -> Result<Decimal, AdapterError> {
        let response = self
            .client
            .execute(GetTickers {
                params: CategorySymbolParams {
                    category: CATEGORY.to_string(),
                    symbol: self.format_pair(symbol),
                },
            })
            .await?
            .into_result()?;
        let ticker = response
            .list
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::decode("empty ticker list"))?;
        escada_markets::parse_decimal(&ticker.mark_price)
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
                params: KlineParams {
                    category: CATEGORY.to_string(),
                    symbol: self.format_pair(symbol),
                    interval: Self::interval_str(interval).to_string(),
                    limit,
                },
            })
            .await?
            .into_result()?;
        model::resolve_klines(response.list)
    }

    async fn leverage_brackets(
        &self,
        symbol: &ExchangeSymbol,
    ) -> Result<Vec<LeverageBracket>, AdapterError> {
        let response = self
            .client
            .execute(GetRiskLimits {
                params: CategorySymbolParams {
                    category: CATEGORY.to_string(),
                    symbol: self.format_pair(symbol),
                },
            })
            .await?
            .into_result()?;
        model::resolve_brackets(response.list)
    }

    async fn balance(&self) -> Result<AccountBalance, AdapterError> {
        let response = self
            .client
            .execute(GetWalletBalance {
                params: WalletBalanceParams {
                    account_type: "UNIFIED".to_string(),
                },
            })
            .await?
            .into_result()?;
        model::resolve_balance(response.list)
    }

    async fn positions(&self) -> Result<FnvHashMap<String, ExchangePosition>, AdapterError> {
        let response = self
            .client
            .execute(GetPositions {
                params: PositionListParams {
                    category: CATEGORY.to_string(),
                    settle_coin: self.quote.to_string(),
                },
            })
            .await?
            .into_result()?;
        Ok(model::resolve_positions(response.list)?
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
                params: OrderRealtimeParams {
                    category: CATEGORY.to_string(),
                    symbol: self.format_pair(symbol),
                    order_id: None,
                },
            })
            .await?
            .into_result()?;
        response.list.into_iter().map(model::resolve_order).collect()
    }

    async fn place_order(
        &self,
        symbol: &ExchangeSymbol,
        order: &PlaceOrderRequest,
    ) -> Result<OrderAck, AdapterError> {
        let (order_type, price, trigger_price) = match order.kind {
            OrderKind::Market => ("Market", None, None),
            OrderKind::Limit | OrderKind::ProfitLimit => ("Limit", order.price, None),
            OrderKind::StopMarket => ("Market", None, order.stop_price),
        };
        let response = self
            .client
            .execute(CreateOrder {
                body: CreateOrderBody {
                    category: CATEGORY.to_string(),
                    symbol: self.format_pair(symbol),
                    side: Self::side_str(order.side).to_string(),
                    order_type: order_type.to_string(),
                    qty: order.quantity.to_string(),
                    price: price.map(|price| price.to_string()),
                    trigger_price: trigger_price.map(|price| price.to_string()),
                    time_in_force: matches!(order.kind, OrderKind::Limit | OrderKind::ProfitLimit)
                        .then(|| "GTC".to_string()),
                    reduce_only: order.reduce_only.then_some(true),
                    position_idx: Self::position_idx(order.direction),
                    order_link_id: order.client_order_id.to_string(),
                },
            })
            .await?
            .into_result()?;
        info!(order_id = %response.order_id, kind = %order.kind, "placed order");
        Ok(model::resolve_ack(response))
    }

    async fn cancel_order(
        &self,
        symbol: &ExchangeSymbol,
        order: &OrderRef,
    ) -> Result<OrderAck, AdapterError> {
        let response = self
            .client
            .execute(CancelOrder {
                body: OrderIdBody {
                    category: CATEGORY.to_string(),
                    symbol: self.format_pair(symbol),
                    order_id: order.exchange_order_id.clone(),
                },
            })
            .await?
            .into_result()?;
        let mut ack = model::resolve_ack(response);
        ack.status = crate::model::CanonicalOrderStatus::Cancelled;
        Ok(ack)
    }

    async fn modify_order(
        &self,
        symbol: &ExchangeSymbol,
        order: &OrderRef,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<OrderAck, AdapterError> {
        let response = self
            .client
            .execute(AmendOrder {
                body: AmendOrderBody {
                    category: CATEGORY.to_string(),
                    symbol: self.format_pair(symbol),
                    order_id: order.exchange_order_id.clone(),
                    qty: quantity.to_string(),
                    price: price.to_string(),
                },
            })
            .await?
            .into_result()?;
        Ok(model::resolve_ack(response))
    }

    async fn query_order(
        &self,
        symbol: &ExchangeSymbol,
        order: &OrderRef,
    ) -> Result<OrderSnapshot, AdapterError> {
        let response = self
            .client
            .execute(GetOpenOrders {
                params: OrderRealtimeParams {
                    category: CATEGORY.to_string(),
                    symbol: self.format_pair(symbol),
                    order_id: Some(order.exchange_order_id.clone()),
                },
            })
            .await?
            .into_result()?;
        response
            .list
            .into_iter()
            .next()
            .map(model::resolve_order)
            .transpose()?
            .ok_or(AdapterError::OrderNotFound)
    }

    async fn cancel_all_orders(&self, symbol: &ExchangeSymbol) -> Result<(), AdapterError> {
        self.client
            .execute(CancelAllOrders {
                body: CancelAllBody {
                    category: CATEGORY.to_string(),
                    symbol: self.format_pair(symbol),
                },
            })
            .await?
            .into_result()?;
        Ok(())
    }

    async fn set_leverage(
        &self,
        symbol: &ExchangeSymbol,
        leverage: u32,
    ) -> Result<(), AdapterError> {
        let result = self
            .client
            .execute(SetLeverage {
                body: SetLeverageBody {
                    category: CATEGORY.to_string(),
                    symbol: self.format_pair(symbol),
                    buy_leverage: leverage.to_string(),
                    sell_leverage: leverage.to_string(),
                },
            })
            .await?
            .into_result();
        match result {
            Ok(_) => Ok(()),
            // 110043: leverage not modified
            Err(AdapterError::Venue { code: 110043, .. }) => Ok(()),
            Err(error) => Err(error),
        }
    }

    async fn set_margin_mode(
        &self,
        symbol: &ExchangeSymbol,
        mode: MarginMode,
        leverage: Option<u32>,
    ) -> Result<(), AdapterError> {
        let trade_mode = match mode {
            MarginMode::Isolated => 1,
            MarginMode::Crossed => 0,
        };
        let leverage = leverage.unwrap_or(1).to_string();
        let result = self
            .client
            .execute(SwitchIsolated {
                body: SwitchIsolatedBody {
                    category: CATEGORY.to_string(),
                    symbol: self.format_pair(symbol),
                    trade_mode,
                    buy_leverage: leverage.clone(),
                    sell_leverage: leverage,
                },
            })
            .await?
            .into_result();
        match result {
            Ok(_) => Ok(()),
            // 110026: margin mode unchanged
            Err(AdapterError::Venue { code: 110026, .. }) => Ok(()),
            Err(error) => Err(error),
        }
    }

    async fn trade_history(
        &self,
        symbol: &ExchangeSymbol,
        limit: u32,
    ) -> Result<Vec<TradeFill>, AdapterError> {
        let response = self
            .client
            .execute(GetExecutions {
                params: ExecutionListParams {
                    category: CATEGORY.to_string(),
                    symbol: self.format_pair(symbol),
                    limit,
                },
            })
            .await?
            .into_result()?;
        model::resolve_trades(response.list)
    }
}
