//! Kraken futures adapter.
//!
//! Venue quirks: margin mode and leverage share one preference call —
//! setting a `maxLeverage` selects isolated margin, omitting it selects
//! cross, so `set_margin_mode(Crossed, _)` sends no leverage and the engine
//! re-asserts leverage on the next position open. There is no single-order
//! query endpoint; `query_order` scans open orders and falls back to the
//! fills history to recognise completed fills.

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
use chrono::{DateTime, Utc};
use escada_integration::{AccountRateLimiter, RestClient, TransportError};
use escada_markets::{ExchangeId, ExchangeSymbol, LeverageBracket, MarginMode, Side};
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use url::Url;

pub mod model;
pub mod request;

use request::*;

/// Kraken futures execution adapter for one account.
#[derive(Debug)]
pub struct Kraken {
    client: RestClient<KrakenRequestSigner>,
}

impl Kraken {
    pub const DEFAULT_BASE_URL: &'static str = "https://futures.kraken.com";

    pub fn new(
        credentials: ApiCredentials,
        base_url: Option<Url>,
        limiter: Arc<AccountRateLimiter>,
    ) -> Result<Self, AdapterError> {
        let base_url = match base_url {
            Some(url) => url,
            None => Url::parse(Self::DEFAULT_BASE_URL)
                .map_err(|error| TransportError::BuildRequest(error.to_string()))?,
        };
        let signer = KrakenRequestSigner::new(credentials.api_key, credentials.api_secret);
        Ok(Self {
            client: RestClient::new(base_url, signer).with_limiter(limiter),
        })
    }

    fn resolution_str(interval: KlineInterval) -> &'static str {
        match interval {
            KlineInterval::OneMinute => "1m",
            KlineInterval::OneHour => "1h",
            KlineInterval::OneDay => "1d",
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

    async fn find_instrument(
        &self,
        pair: &str,
    ) -> Result<model::KrakenInstrument, AdapterError> {
        let response = self.client.execute(GetInstruments).await?;
        model::ensure_success(&response.result, &response.error)?;
        response
            .instruments
            .into_iter()
            .find(|instrument| instrument.symbol == pair)
            .ok_or_else(|| AdapterError::decode(format!("unknown instrument {pair}")))
    }
}

#[async_trait]
impl ExchangeAdapter for Kraken {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Kraken
    }

    fn capabilities(&self) -> ExchangeCapabilities {
        ExchangeCapabilities::for_exchange(ExchangeId::Kraken)
    }

    fn format_pair(&self, symbol: &ExchangeSymbol) -> String {
        if !symbol.parsed_trading_pair.is_empty() {
            return symbol.parsed_trading_pair.to_string();
        }
        format!("PF_{}{}", Self::venue_token(&symbol.token), symbol.quote)
    }

    async fn server_time(&self) -> Result<DateTime<Utc>, AdapterError> {
        let response = self.client.execute(GetTickers).await?;
        model::ensure_success(&response.result, &response.error)?;
        let raw = response
            .server_time
            .ok_or_else(|| AdapterError::decode("missing serverTime"))?;
        raw.parse()
            .map_err(|_| AdapterError::decode("unparseable serverTime"))
    }

    async fn exchange_info(&self) -> Result<Vec<SymbolInfo>, AdapterError> {
        let response = self.client.execute(GetInstruments).await?;
        model::ensure_success(&response.result, &response.error)?;
        Ok(model::resolve_symbol_info(response.instruments))
    }

    async fn mark_price(&self, symbol: &ExchangeSymbol) -> Result<Decimal, AdapterError> {
        let response = self.client.execute(GetTickers).await?;
        model::ensure_success(&response.result, &response.error)?;
        let pair = self.format_pair(symbol);
        response
            .tickers
            .into_iter()
            .find(|ticker| ticker.symbol == pair)
            .and_then(|ticker| ticker.mark_price)
            .ok_or_else(|| AdapterError::decode(format!("no mark price for {pair}")))
    }

    async fn klines(
        &self,
        symbol: &ExchangeSymbol,
        interval: KlineInterval,
        limit: u32,
    ) -> Result<Vec<Kline>, AdapterError> {
        let response = self
            .client
            .execute(GetCandles {
                symbol: self.format_pair(symbol),
                resolution: Self::resolution_str(interval).to_string(),
            })
            .await?;
        let mut klines = model::resolve_candles(response.candles)?;
        if klines.len() > limit as usize {
            klines = klines.split_off(klines.len() - limit as usize);
        }
        Ok(klines)
    }

    async fn leverage_brackets(
        &self,
        symbol: &ExchangeSymbol,
    ) -> Result<Vec<LeverageBracket>, AdapterError> {
        let instrument = self.find_instrument(&self.format_pair(symbol)).await?;
        Ok(model::synthesize_bracket(instrument.max_position_leverage))
    }

    async fn balance(&self) -> Result<AccountBalance, AdapterError> {
        let response = self.client.execute(GetAccounts).await?;
        model::ensure_success(&response.result, &response.error)?;
        Ok(model::resolve_balance(response))
    }

    async fn positions(&self) -> Result<FnvHashMap<String, ExchangePosition>, AdapterError> {
        let response = self.client.execute(GetOpenPositions).await?;
        model::ensure_success(&response.result, &response.error)?;
        Ok(model::resolve_positions(response.open_positions)
            .into_iter()
            .map(|position| (position.key.clone(), position))
            .collect())
    }

    async fn open_orders(
        &self,
        symbol: &ExchangeSymbol,
    ) -> Result<Vec<OrderSnapshot>, AdapterError> {
        let response = self.client.execute(GetOpenOrders).await?;
        model::ensure_success(&response.result, &response.error)?;
        let pair = self.format_pair(symbol);
        Ok(response
            .open_orders
            .into_iter()
            .filter(|order| order.symbol == pair)
            .map(model::resolve_order)
            .collect())
    }

    async fn place_order(
        &self,
        symbol: &ExchangeSymbol,
        order: &PlaceOrderRequest,
    ) -> Result<OrderAck, AdapterError> {
        let (order_type, limit_price, stop_price) = match order.kind {
            OrderKind::Market => ("mkt", None, None),
            OrderKind::Limit | OrderKind::ProfitLimit => ("lmt", order.price, None),
            OrderKind::StopMarket => ("stp", None, order.stop_price),
        };
        let response = self
            .client
            .execute(SendOrder {
                params: SendOrderParams {
                    order_type: order_type.to_string(),
                    symbol: self.format_pair(symbol),
                    side: match order.side {
                        Side::Buy => "buy".to_string(),
                        Side::Sell => "sell".to_string(),
                    },
                    size: order.quantity.to_string(),
                    limit_price: limit_price.map(|price| price.to_string()),
                    stop_price: stop_price.map(|price| price.to_string()),
                    cli_ord_id: order.client_order_id.to_string(),
                    reduce_only: order.reduce_only.then_some(true),
                },
            })
            .await?;
        model::ensure_success(&response.result, &response.error)?;
        let status = &response.send_status.status;
        if status != "placed" {
            return Err(AdapterError::Venue {
                code: -1,
                message: format!("sendorder status {status}"),
            });
        }
        let order_id = response
            .send_status
            .order_id
            .ok_or_else(|| AdapterError::decode("sendorder returned no order id"))?;
        info!(%order_id, kind = %order.kind, "placed order");
        Ok(OrderAck {
            exchange_order_id: order_id,
            client_order_id: Some(order.client_order_id.clone()),
            status: CanonicalOrderStatus::New,
        })
    }

    async fn cancel_order(
        &self,
        _symbol: &ExchangeSymbol,
        order: &OrderRef,
    ) -> Result<OrderAck, AdapterError> {
        let response = self
            .client
            .execute(CancelOrder {
                params: OrderIdParams {
                    order_id: order.exchange_order_id.clone(),
                },
            })
            .await?;
        model::ensure_success(&response.result, &response.error)?;
        Ok(OrderAck {
            exchange_order_id: order.exchange_order_id.clone(),
            client_order_id: order.client_order_id.clone(),
            status: CanonicalOrderStatus::Cancelled,
        })
    }

    async fn modify_order(
        &self,
        _symbol: &ExchangeSymbol,
        order: &OrderRef,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<OrderAck, AdapterError> {
        let response = self
            .client
            .execute(EditOrder {
                params: EditOrderParams {
                    order_id: order.exchange_order_id.clone(),
                    size: quantity.to_string(),
                    limit_price: price.to_string(),
                },
            })
            .await?;
        model::ensure_success(&response.result, &response.error)?;
        Ok(OrderAck {
            exchange_order_id: response
                .edit_status
                .order_id
                .unwrap_or_else(|| order.exchange_order_id.clone()),
            client_order_id: order.client_order_id.clone(),
            status: CanonicalOrderStatus::New,
        })
    }

    async fn query_order(
        &self,
        _symbol: &ExchangeSymbol,
        order: &OrderRef,
    ) -> Result<OrderSnapshot, AdapterError> {
        let open = self.client.execute(GetOpenOrders).await?;
        model::ensure_success(&open.result, &open.error)?;
        if let Some(resting) = open
            .open_orders
            .into_iter()
            .find(|candidate| candidate.order_id == order.exchange_order_id)
        {
            return Ok(model::resolve_order(resting));
        }

        // not resting: check the fills history before declaring it gone
        let fills = self.client.execute(GetFills).await?;
        model::ensure_success(&fills.result, &fills.error)?;
        let mut filled = Decimal::ZERO;
        let mut weighted = Decimal::ZERO;
        for fill in fills
            .fills
            .iter()
            .filter(|fill| fill.order_id == order.exchange_order_id)
        {
            filled += fill.size;
            weighted += fill.size * fill.price;
        }
        if filled > Decimal::ZERO {
            let average = weighted / filled;
            return Ok(OrderSnapshot {
                exchange_order_id: order.exchange_order_id.clone(),
                client_order_id: order.client_order_id.clone(),
                status: CanonicalOrderStatus::Filled,
                price: average,
                quantity: filled,
                filled_quantity: filled,
                average_price: Some(average),
                is_algo: order.is_algo,
            });
        }
        Ok(OrderSnapshot {
            exchange_order_id: order.exchange_order_id.clone(),
            client_order_id: order.client_order_id.clone(),
            status: CanonicalOrderStatus::NotFound,
            price: Decimal::ZERO,
            quantity: Decimal::ZERO,
            filled_quantity: Decimal::ZERO,
            average_price: None,
            is_algo: order.is_algo,
        })
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
        model::ensure_success(&response.result, &response.error)
    }

    async fn set_leverage(
        &self,
        symbol: &ExchangeSymbol,
        leverage: u32,
    ) -> Result<(), AdapterError> {
        let response = self
            .client
            .execute(SetLeveragePreference {
                params: LeveragePreferenceParams {
                    symbol: self.format_pair(symbol),
                    max_leverage: Some(leverage.to_string()),
                },
            })
            .await?;
        model::ensure_success(&response.result, &response.error)
    }

    /// One combined preference call: isolated margin carries the leverage,
    /// cross margin omits it.
    async fn set_margin_mode(
        &self,
        symbol: &ExchangeSymbol,
        mode: MarginMode,
        leverage: Option<u32>,
    ) -> Result<(), AdapterError> {
        let max_leverage = match mode {
            MarginMode::Isolated => Some(leverage.unwrap_or(1).to_string()),
            MarginMode::Crossed => None,
        };
        let response = self
            .client
            .execute(SetLeveragePreference {
                params: LeveragePreferenceParams {
                    symbol: self.format_pair(symbol),
                    max_leverage,
                },
            })
            .await?;
        model::ensure_success(&response.result, &response.error)
    }

    async fn trade_history(
        &self,
        symbol: &ExchangeSymbol,
        limit: u32,
    ) -> Result<Vec<TradeFill>, AdapterError> {
        let response = self.client.execute(GetFills).await?;
        model::ensure_success(&response.result, &response.error)?;
        let pair = self.format_pair(symbol);
        let mut fills = model::resolve_fills(
            response
                .fills
                .into_iter()
                .filter(|fill| fill.symbol == pair)
                .collect(),
        )?;
        fills.truncate(limit as usize);
        Ok(fills)
    }
}
