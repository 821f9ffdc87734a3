//! BitGet USDT-M futures adapter.
//!
//! Divergences handled here and surfaced as capability flags:
//! - no reliable symbol-level cancel-all: `cancel_all_orders` iterates
//!   individual cancels
//! - TP/SL are position-attached plans with no size; their canonical
//!   snapshots carry zero quantity
//! - plan (trigger) orders cancel and query through the plan endpoints

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
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

pub mod model;
pub mod request;

use request::*;

const PRODUCT_TYPE: &str = "USDT-FUTURES";

/// BitGet execution adapter for one account.
#[derive(Debug)]
pub struct Bitget {
    client: RestClient<BitgetRequestSigner>,
    quote: SmolStr,
    margin_mode: parking_lot::Mutex<MarginMode>,
}

impl Bitget {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.bitget.com";

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
        let passphrase = credentials.passphrase.clone().unwrap_or_default();
        let signer =
            BitgetRequestSigner::new(credentials.api_key, credentials.api_secret, passphrase);
        Ok(Self {
            client: RestClient::new(base_url, signer).with_limiter(limiter),
            quote,
            margin_mode: parking_lot::Mutex::new(MarginMode::Isolated),
        })
    }

    fn granularity_str(interval: KlineInterval) -> &'static str {
        match interval {
            KlineInterval::OneMinute => "1m",
            KlineInterval::OneHour => "1H",
            KlineInterval::OneDay => "1D",
        }
    }

    fn hold_side(direction: Direction) -> &'static str {
        match direction {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

#[async_trait]
impl ExchangeAdapter for Bitget {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Bitget
    }

    fn capabilities(&self) -> ExchangeCapabilities {
        ExchangeCapabilities::for_exchange(ExchangeId::Bitget)
    }

    fn format_pair(&self, symbol: &ExchangeSymbol) -> String {
        format!("{}{}", symbol.token, symbol.quote)
    }

    async fn server_time(&self) -> Result<DateTime<Utc>, AdapterError> {
        let response = self.client.execute(GetServerTime).await?.into_result()?;
        let millis: i64 = response
            .server_time
            .parse()
            .map_err(|_| AdapterError::decode("server time"))?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| AdapterError::decode("server time out of range"))
    }

    async fn exchange_info(&self) -> Result<Vec<SymbolInfo>, AdapterError> {
        let response = self
            .client
            .execute(GetContracts {
                params: ProductParams {
                    product_type: PRODUCT_TYPE.to_string(),
                },
            })
            .await?
            .into_result()?;
        model::resolve_symbol_info(response)
    }

    async fn mark_price(&self, symbol: &ExchangeSymbol) -> Result<Decimal, AdapterError> {
        let response = self
            .client
            .execute(GetTicker {
                params: ProductSymbolParams {
                    symbol: self.format_pair(symbol),
                    product_type: PRODUCT_TYPE.to_string(),
                },
            })
            .await?
            .into_result()?;
        let ticker = response
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::decode("empty ticker response"))?;
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
            .execute(GetCandles {
                params: CandlesParams {
                    symbol: self.format_pair(symbol),
                    product_type: PRODUCT_TYPE.to_string(),
                    granularity: Self::granularity_str(interval).to_string(),
                    limit,
                },
            })
            .await?
            .into_result()?;
        model::resolve_candles(response)
    }

    async fn leverage_brackets(
        &self,
        symbol: &ExchangeSymbol,
    ) -> Result<Vec<LeverageBracket>, AdapterError> {
        let response = self
            .client
            .execute(GetPositionTiers {
                params: ProductSymbolParams {
                    symbol: self.format_pair(symbol),
                    product_type: PRODUCT_TYPE.to_string(),
                },
            })
            .await?
            .into_result()?;
        model::resolve_brackets(response)
    }

    async fn balance(&self) -> Result<AccountBalance, AdapterError> {
        let response = self
            .client
            .execute(GetAccount {
                params: AccountParams {
                    symbol: format!("BTC{}", self.quote),
                    product_type: PRODUCT_TYPE.to_string(),
                    margin_coin: self.quote.to_string(),
                },
            })
            .await?
            .into_result()?;
        model::resolve_balance(response)
    }

    async fn positions(&self) -> Result<FnvHashMap<String, ExchangePosition>, AdapterError> {
        let response = self
            .client
            .execute(GetAllPositions {
                params: AllPositionsParams {
                    product_type: PRODUCT_TYPE.to_string(),
                    margin_coin: self.quote.to_string(),
                },
            })
            .await?
            .into_result()?;
        Ok(model::resolve_positions(response)?
            .into_iter()
            .map(|position| (position.key.clone(), position))
            .collect())
    }

    async fn open_orders(
        &self,
        symbol: &ExchangeSymbol,
    ) -> Result<Vec<OrderSnapshot>, AdapterError> {
        let params = ProductSymbolParams {
            symbol: self.format_pair(symbol),
            product_type: PRODUCT_TYPE.to_string(),
        };
        let pending = self
            .client
            .execute(GetPendingOrders {
                params: params.clone(),
            })
            .await?
            .into_result()?;
        let plans = self
            .client
            .execute(GetPendingPlanOrders { params })
            .await?
            .into_result()?;

        let mut snapshots: Vec<OrderSnapshot> = pending
            .entrusted_list
            .unwrap_or_default()
            .into_iter()
            .map(model::resolve_order)
            .collect::<Result<_, _>>()?;
        for plan in plans.entrusted_list.unwrap_or_default() {
            snapshots.push(model::resolve_plan_order(plan)?);
        }
        Ok(snapshots)
    }

    async fn place_order(
        &self,
        symbol: &ExchangeSymbol,
        order: &PlaceOrderRequest,
    ) -> Result<OrderAck, AdapterError> {
        // TP/SL attach to the position rather than resting as sized orders
        if self.capabilities().is_algo_order(order.kind) {
            let plan_type = match order.kind {
                OrderKind::ProfitLimit => "profit_plan",
                _ => "loss_plan",
            };
            let trigger = order
                .stop_price
                .or(order.price)
                .ok_or_else(|| AdapterError::decode("tpsl order requires a trigger price"))?;
            let response = self
                .client
                .execute(PlaceTpslOrder {
                    body: PlaceTpslBody {
                        symbol: self.format_pair(symbol),
                        product_type: PRODUCT_TYPE.to_string(),
                        margin_coin: self.quote.to_string(),
                        plan_type: plan_type.to_string(),
                        trigger_price: trigger.to_string(),
                        hold_side: Self::hold_side(order.direction).to_string(),
                        client_oid: order.client_order_id.to_string(),
                    },
                })
                .await?
                .into_result()?;
            info!(order_id = %response.order_id, plan_type, "placed position-attached tpsl");
            return Ok(model::resolve_ack(response));
        }

        let margin_mode = match *self.margin_mode.lock() {
            MarginMode::Isolated => "isolated",
            MarginMode::Crossed => "crossed",
        };
        let trade_side = if order.reduce_only { "close" } else { "open" };
        let side = match order.side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };
        let response = self
            .client
            .execute(PlaceOrder {
                body: PlaceOrderBody {
                    symbol: self.format_pair(symbol),
                    product_type: PRODUCT_TYPE.to_string(),
                    margin_mode: margin_mode.to_string(),
                    margin_coin: self.quote.to_string(),
                    size: order.quantity.to_string(),
                    price: order.price.map(|price| price.to_string()),
                    side: side.to_string(),
                    trade_side: trade_side.to_string(),
                    order_type: match order.kind {
                        OrderKind::Market | OrderKind::StopMarket => "market".to_string(),
                        OrderKind::Limit | OrderKind::ProfitLimit => "limit".to_string(),
                    },
                    client_oid: order.client_order_id.to_string(),
                    reduce_only: order.reduce_only.then(|| "YES".to_string()),
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
        let response = if order.is_algo {
            self.client
                .execute(CancelPlanOrder {
                    body: CancelPlanOrderBody {
                        symbol: self.format_pair(symbol),
                        product_type: PRODUCT_TYPE.to_string(),
                        order_id: order.exchange_order_id.clone(),
                        plan_type: "profit_loss".to_string(),
                    },
                })
                .await?
                .into_result()?
        } else {
            self.client
                .execute(CancelOrder {
                    body: OrderIdBody {
                        symbol: self.format_pair(symbol),
                        product_type: PRODUCT_TYPE.to_string(),
                        order_id: order.exchange_order_id.clone(),
                    },
                })
                .await?
                .into_result()?
        };
        let mut ack = model::resolve_ack(response);
        ack.status = CanonicalOrderStatus::Cancelled;
        Ok(ack)
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
                "plan orders cannot be modified in place; cancel and recreate",
            ));
        }
        let response = self
            .client
            .execute(ModifyOrder {
                body: ModifyOrderBody {
                    symbol: self.format_pair(symbol),
                    product_type: PRODUCT_TYPE.to_string(),
                    order_id: order.exchange_order_id.clone(),
                    new_size: quantity.to_string(),
                    new_price: price.to_string(),
                    new_client_oid: format!("{}-m", order.exchange_order_id),
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
        if order.is_algo {
            // plan orders have no detail endpoint; scan the pending plans
            let plans = self
                .client
                .execute(GetPendingPlanOrders {
                    params: ProductSymbolParams {
                        symbol: self.format_pair(symbol),
                        product_type: PRODUCT_TYPE.to_string(),
                    },
                })
                .await?
                .into_result()?;
            return plans
                .entrusted_list
                .unwrap_or_default()
                .into_iter()
                .find(|plan| plan.order_id == order.exchange_order_id)
                .map(model::resolve_plan_order)
                .transpose()?
                .ok_or(AdapterError::OrderNotFound);
        }
        let response = self
            .client
            .execute(GetOrderDetail {
                params: OrderDetailParams {
                    symbol: self.format_pair(symbol),
                    product_type: PRODUCT_TYPE.to_string(),
                    order_id: order.exchange_order_id.clone(),
                },
            })
            .await?
            .into_result()?;
        model::resolve_order(response)
    }

    /// The venue's batch cancel is unreliable for mixed order sets, so this
    /// lists the pending orders and cancels them one by one.
    async fn cancel_all_orders(&self, symbol: &ExchangeSymbol) -> Result<(), AdapterError> {
        let pending = self
            .client
            .execute(GetPendingOrders {
                params: ProductSymbolParams {
                    symbol: self.format_pair(symbol),
                    product_type: PRODUCT_TYPE.to_string(),
                },
            })
            .await?
            .into_result()?;
        for order in pending.entrusted_list.unwrap_or_default() {
            let reference = OrderRef {
                exchange_order_id: order.order_id.clone(),
                client_order_id: order.client_oid.clone().map(SmolStr::new),
                is_algo: false,
            };
            if let Err(error) = self.cancel_order(symbol, &reference).await {
                warn!(order_id = %order.order_id, %error, "individual cancel failed");
            }
        }
        Ok(())
    }

    async fn set_leverage(
        &self,
        symbol: &ExchangeSymbol,
        leverage: u32,
    ) -> Result<(), AdapterError> {
        self.client
            .execute(SetLeverage {
                body: SetLeverageBody {
                    symbol: self.format_pair(symbol),
                    product_type: PRODUCT_TYPE.to_string(),
                    margin_coin: self.quote.to_string(),
                    leverage: leverage.to_string(),
                },
            })
            .await?
            .into_result()?;
        Ok(())
    }

    async fn set_margin_mode(
        &self,
        symbol: &ExchangeSymbol,
        mode: MarginMode,
        _leverage: Option<u32>,
    ) -> Result<(), AdapterError> {
        self.client
            .execute(SetMarginMode {
                body: SetMarginModeBody {
                    symbol: self.format_pair(symbol),
                    product_type: PRODUCT_TYPE.to_string(),
                    margin_coin: self.quote.to_string(),
                    margin_mode: match mode {
                        MarginMode::Isolated => "isolated".to_string(),
                        MarginMode::Crossed => "crossed".to_string(),
                    },
                },
            })
            .await?
            .into_result()?;
        *self.margin_mode.lock() = mode;
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
                    product_type: PRODUCT_TYPE.to_string(),
                    limit,
                },
            })
            .await?
            .into_result()?;
        model::resolve_fills(response.fill_list.unwrap_or_default())
    }
}
