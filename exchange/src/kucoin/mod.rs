//! KuCoin futures adapter.
//!
//! Venue quirks: contracts are named `XBTUSDTM`-style (XBT for BTC, trailing
//! `M` contract marker); leverage travels on each order rather than through a
//! standalone preference endpoint, so `set_leverage` records the value and
//! the adapter applies it to subsequent placements; in-place modify is not
//! supported (`supports_order_modify == false`).

use crate::{
    credentials::ApiCredentials,
    error::AdapterError,
    model::{
        AccountBalance, CanonicalOrderStatus, ExchangeCapabilities, ExchangePosition, Kline,
        KlineInterval, OrderAck, OrderKind, OrderRef, OrderSnapshot, PlaceOrderRequest,
        SymbolInfo, TradeFill,
    },
    ExchangeAdapter,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use escada_integration::{AccountRateLimiter, RestClient, TransportError};
use escada_markets::{Direction, ExchangeId, ExchangeSymbol, LeverageBracket, MarginMode, Side};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use url::Url;

pub mod model;
pub mod request;

use request::*;

/// KuCoin execution adapter for one account.
#[derive(Debug)]
pub struct Kucoin {
    client: RestClient<KucoinRequestSigner>,
    quote: smol_str::SmolStr,
    /// Leverage is per-order on this venue; remembered from `set_leverage`.
    leverage: Mutex<u32>,
}

impl Kucoin {
    pub const DEFAULT_BASE_URL: &'static str = "https://api-futures.kucoin.com";

    pub fn new(
        credentials: ApiCredentials,
        base_url: Option<Url>,
        limiter: Arc<AccountRateLimiter>,
        quote: smol_str::SmolStr,
    ) -> Result<Self, AdapterError> {
        let base_url = match base_url {
            Some(url) => url,
            None => Url::parse(Self::DEFAULT_BASE_URL)
                .map_err(|error| TransportError::BuildRequest(error.to_string()))?,
        };
        let passphrase = credentials.passphrase.clone().unwrap_or_default();
        let signer =
            KucoinRequestSigner::new(credentials.api_key, credentials.api_secret, passphrase);
        Ok(Self {
            client: RestClient::new(base_url, signer).with_limiter(limiter),
            quote,
            leverage: Mutex::new(1),
        })
    }

    fn granularity_minutes(interval: KlineInterval) -> u32 {
        match interval {
            KlineInterval::OneMinute => 1,
            KlineInterval::OneHour => 60,
            KlineInterval::OneDay => 1440,
        }
    }

    /// The venue names bitcoin `XBT`.
    fn venue_token(token: &str) -> &str {
        if token.eq_ignore_ascii_case("BTC") {
            "XBT"
        } else {
            token
        }
    }
}

#[async_trait]
impl ExchangeAdapter for Kucoin {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Kucoin
    }

    fn capabilities(&self) -> ExchangeCapabilities {
        ExchangeCapabilities::for_exchange(ExchangeId::Kucoin)
    }

    fn format_pair(&self, symbol: &ExchangeSymbol) -> String {
        if !symbol.parsed_trading_pair.is_empty() {
            return symbol.parsed_trading_pair.to_string();
        }
        format!("{}{}M", Self::venue_token(&symbol.token), symbol.quote)
    }

    async fn server_time(&self) -> Result<DateTime<Utc>, AdapterError> {
        let millis = self.client.execute(GetServerTime).await?.into_result()?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| AdapterError::decode("server time out of range"))
    }

    async fn exchange_info(&self) -> Result<Vec<SymbolInfo>, AdapterError> {
        let contracts = self
            .client
            .execute(GetActiveContracts)
            .await?
            .into_result()?;
        model::resolve_symbol_info(contracts)
    }

    async fn mark_price(&self, symbol: &ExchangeSymbol) -> Result<Decimal, AdapterError> {
        let response = self
            .client
            .execute(GetMarkPrice {
                symbol: self.format_pair(symbol),
            })
            .await?
            .into_result()?;
        Decimal::try_from(response.value).map_err(|error| AdapterError::decode(error.to_string()))
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
                    symbol: self.format_pair(symbol),
                    granularity: Self::granularity_minutes(interval),
                },
            })
            .await?
            .into_result()?;
        let mut klines = model::resolve_klines(response)?;
        if klines.len() > limit as usize {
            klines = klines.split_off(klines.len() - limit as usize);
        }
        Ok(klines)
    }

    async fn leverage_brackets(
        &self,
        symbol: &ExchangeSymbol,
    ) -> Result<Vec<LeverageBracket>, AdapterError> {
        let contracts = self
            .client
            .execute(GetActiveContracts)
            .await?
            .into_result()?;
        let pair = self.format_pair(symbol);
        let contract = contracts
            .into_iter()
            .find(|contract| contract.symbol == pair)
            .ok_or_else(|| AdapterError::decode(format!("unknown contract {pair}")))?;
        Ok(model::synthesize_bracket(contract.max_leverage))
    }

    async fn balance(&self) -> Result<AccountBalance, AdapterError> {
        let response = self
            .client
            .execute(GetAccountOverview {
                params: CurrencyParams {
                    currency: self.quote.to_string(),
                },
            })
            .await?
            .into_result()?;
        model::resolve_balance(response)
    }

    async fn positions(&self) -> Result<FnvHashMap<String, ExchangePosition>, AdapterError> {
        let response = self.client.execute(GetPositions).await?.into_result()?;
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
            .execute(GetActiveOrders {
                params: ActiveOrdersParams {
                    status: "active".to_string(),
                    symbol: self.format_pair(symbol),
                },
            })
            .await?
            .into_result()?;
        response
            .items
            .into_iter()
            .map(model::resolve_order)
            .collect()
    }

    async fn place_order(
        &self,
        symbol: &ExchangeSymbol,
        order: &PlaceOrderRequest,
    ) -> Result<OrderAck, AdapterError> {
        let (order_type, price, stop, stop_price) = match order.kind {
            OrderKind::Market => ("market", None, None, None),
            OrderKind::Limit | OrderKind::ProfitLimit => ("limit", order.price, None, None),
            OrderKind::StopMarket => {
                // trigger direction: longs stop below, shorts stop above
                let stop = match order.direction {
                    Direction::Long => "down",
                    Direction::Short => "up",
                };
                ("market", None, Some(stop), order.stop_price)
            }
        };
        let leverage = self.leverage.lock().to_string();
        let response = self
            .client
            .execute(PlaceOrder {
                body: PlaceOrderBody {
                    client_oid: order.client_order_id.to_string(),
                    symbol: self.format_pair(symbol),
                    side: match order.side {
                        Side::Buy => "buy".to_string(),
                        Side::Sell => "sell".to_string(),
                    },
                    order_type: order_type.to_string(),
                    leverage,
                    size: order.quantity.to_string(),
                    price: price.map(|price| price.to_string()),
                    stop: stop.map(str::to_string),
                    stop_price: stop_price.map(|price| price.to_string()),
                    stop_price_type: stop.map(|_| "MP".to_string()),
                    reduce_only: order.reduce_only.then_some(true),
                    time_in_force: matches!(order.kind, OrderKind::Limit | OrderKind::ProfitLimit)
                        .then(|| "GTC".to_string()),
                },
            })
            .await?
            .into_result()?;
        info!(order_id = %response.order_id, kind = %order.kind, "placed order");
        Ok(model::resolve_ack(response))
    }

    async fn cancel_order(
        &self,
        _symbol: &ExchangeSymbol,
        order: &OrderRef,
    ) -> Result<OrderAck, AdapterError> {
        let response = self
            .client
            .execute(CancelOrder {
                order_id: order.exchange_order_id.clone(),
            })
            .await?
            .into_result()?;
        let cancelled = response
            .cancelled_order_ids
            .into_iter()
            .next()
            .unwrap_or_else(|| order.exchange_order_id.clone());
        Ok(OrderAck {
            exchange_order_id: cancelled,
            client_order_id: order.client_order_id.clone(),
            status: CanonicalOrderStatus::Cancelled,
        })
    }

    async fn modify_order(
        &self,
        _symbol: &ExchangeSymbol,
        _order: &OrderRef,
        _quantity: Decimal,
        _price: Decimal,
    ) -> Result<OrderAck, AdapterError> {
        Err(AdapterError::UnsupportedOperation(
            "kucoin has no in-place modify; cancel and recreate",
        ))
    }

    async fn query_order(
        &self,
        _symbol: &ExchangeSymbol,
        order: &OrderRef,
    ) -> Result<OrderSnapshot, AdapterError> {
        let response = self
            .client
            .execute(QueryOrder {
                order_id: order.exchange_order_id.clone(),
            })
            .await?
            .into_result()?;
        model::resolve_order(response)
    }

    async fn cancel_all_orders(&self, symbol: &ExchangeSymbol) -> Result<(), AdapterError> {
        self.client
            .execute(CancelAllOrders {
                params: SymbolParams {
                    symbol: self.format_pair(symbol),
                },
            })
            .await?
            .into_result()?;
        Ok(())
    }

    async fn set_leverage(
        &self,
        _symbol: &ExchangeSymbol,
        leverage: u32,
    ) -> Result<(), AdapterError> {
        *self.leverage.lock() = leverage.max(1);
        Ok(())
    }

    async fn set_margin_mode(
        &self,
        symbol: &ExchangeSymbol,
        mode: MarginMode,
        _leverage: Option<u32>,
    ) -> Result<(), AdapterError> {
        self.client
            .execute(ChangeMarginMode {
                body: ChangeMarginModeBody {
                    symbol: self.format_pair(symbol),
                    margin_mode: match mode {
                        MarginMode::Isolated => "ISOLATED".to_string(),
                        MarginMode::Crossed => "CROSS".to_string(),
                    },
                },
            })
            .await?
            .into_result()?;
        Ok(())
    }

    async fn trade_history(
        &self,
        symbol: &ExchangeSymbol,
        limit: u32,
    ) -> Result<Vec<TradeFill>, AdapterError> {
        let response = self
            .client
            .execute(GetFills {
                params: FillsParams {
                    symbol: self.format_pair(symbol),
                },
            })
            .await?
            .into_result()?;
        let mut fills = model::resolve_fills(response.items)?;
        fills.truncate(limit as usize);
        Ok(fills)
    }
}
