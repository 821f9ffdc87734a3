//! In-process mock venue.
//!
//! Implements [`ExchangeAdapter`] against an in-memory book of orders and
//! positions, with hooks to script the venue-side events the engine must
//! react to: fills, external modifications, cancellations, residual amounts
//! after a close, and mark-price moves. Market orders fill immediately at
//! the current mark price.

use crate::{
    error::AdapterError,
    model::{
        position_key, AccountBalance, CanonicalOrderStatus, ExchangeCapabilities,
        ExchangePosition, Kline, KlineInterval, OrderAck, OrderKind, OrderRef, OrderSnapshot,
        PlaceOrderRequest, SymbolInfo, TradeFill,
    },
    ExchangeAdapter,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use escada_markets::{Direction, ExchangeId, ExchangeSymbol, LeverageBracket, MarginMode, Side};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::collections::VecDeque;

/// The canonical test symbol used across the workspace's scenario tests:
/// mark 100, tick 0.01, lot 0.001, gaps 2%, four rungs doubling.
pub fn test_symbol(exchange: ExchangeId) -> ExchangeSymbol {
    use rust_decimal::prelude::FromPrimitive;
    let dec = |value: f64| Decimal::from_f64(value).unwrap_or_default();
    ExchangeSymbol {
        exchange,
        token: SmolStr::new("BTC"),
        quote: SmolStr::new("USDT"),
        parsed_trading_pair: SmolStr::new("BTCUSDT"),
        price_precision: 2,
        quantity_precision: 3,
        tick_size: dec(0.01),
        lot_step: dec(0.001),
        min_notional: dec(5.0),
        min_price: dec(0.01),
        max_price: dec(1_000_000.0),
        leverage_brackets: vec![
            LeverageBracket {
                bracket: 1,
                initial_leverage: 75,
                notional_floor: Decimal::ZERO,
                notional_cap: dec(10_000.0),
                maint_margin_ratio: dec(0.005),
            },
            LeverageBracket {
                bracket: 2,
                initial_leverage: 50,
                notional_floor: dec(10_000.0),
                notional_cap: dec(50_000.0),
                maint_margin_ratio: dec(0.01),
            },
        ],
        limit_quantity_multipliers: ExchangeSymbol::default_multipliers(),
        percentage_gap_long: dec(2.0),
        percentage_gap_short: dec(2.0),
        disable_on_price_spike_percentage: dec(10.0),
        price_spike_cooldown_hours: 12,
        tradeable_at: None,
        mark_price: Some(dec(100.0)),
        mark_price_synced_at: None,
        has_stale_price: false,
        total_limit_orders: 4,
    }
}

#[derive(Debug, Clone)]
struct MockOrder {
    exchange_order_id: String,
    client_order_id: SmolStr,
    pair: String,
    kind: OrderKind,
    side: Side,
    direction: Direction,
    price: Decimal,
    quantity: Decimal,
    filled_quantity: Decimal,
    average_price: Option<Decimal>,
    status: CanonicalOrderStatus,
    is_algo: bool,
    reduce_only: bool,
}

impl MockOrder {
    fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            exchange_order_id: self.exchange_order_id.clone(),
            client_order_id: Some(self.client_order_id.clone()),
            status: self.status,
            price: self.price,
            quantity: self.quantity,
            filled_quantity: self.filled_quantity,
            average_price: self.average_price,
            is_algo: self.is_algo,
        }
    }
}

#[derive(Debug)]
struct MockState {
    next_id: u64,
    orders: Vec<MockOrder>,
    positions: FnvHashMap<String, ExchangePosition>,
    balance: AccountBalance,
    mark_price: Decimal,
    daily_close: Decimal,
    brackets: Vec<LeverageBracket>,
    leverage: Option<u32>,
    margin_mode: Option<MarginMode>,
    trades: Vec<TradeFill>,
    /// Amount deliberately left on the venue after a reduce-close.
    residual: Decimal,
    scripted_failures: VecDeque<AdapterError>,
}

/// Scriptable in-memory venue.
#[derive(Debug)]
pub struct MockExchange {
    exchange: ExchangeId,
    state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new(exchange: ExchangeId) -> Self {
        Self {
            exchange,
            state: Mutex::new(MockState {
                next_id: 1,
                orders: Vec::new(),
                positions: FnvHashMap::default(),
                balance: AccountBalance {
                    wallet: Decimal::new(1000, 0),
                    available: Decimal::new(1000, 0),
                    cross_wallet: Decimal::new(1000, 0),
                    cross_unrealised_pnl: Decimal::ZERO,
                },
                mark_price: Decimal::new(100, 0),
                daily_close: Decimal::new(100, 0),
                brackets: test_symbol(exchange).leverage_brackets,
                leverage: None,
                margin_mode: None,
                trades: Vec::new(),
                residual: Decimal::ZERO,
                scripted_failures: VecDeque::new(),
            }),
        }
    }

    fn take_failure(&self) -> Option<AdapterError> {
        self.state.lock().scripted_failures.pop_front()
    }

    // -- scripting hooks -----------------------------------------------------

    pub fn set_mark_price(&self, price: Decimal) {
        self.state.lock().mark_price = price;
    }

    pub fn set_daily_close(&self, price: Decimal) {
        self.state.lock().daily_close = price;
    }

    pub fn set_balance(&self, balance: AccountBalance) {
        self.state.lock().balance = balance;
    }

    pub fn set_residual(&self, residual: Decimal) {
        self.state.lock().residual = residual;
    }

    /// Queue an error returned by the next adapter call.
    pub fn push_failure(&self, error: AdapterError) {
        self.state.lock().scripted_failures.push_back(error);
    }

    /// Venue-side fill of a resting order at `price` (defaults to the
    /// resting price), updating the position the way the venue would.
    pub fn fill_order(&self, exchange_order_id: &str, price: Option<Decimal>) {
        let mut state = self.state.lock();
        let mark = state.mark_price;
        let Some(index) = state
            .orders
            .iter()
            .position(|order| order.exchange_order_id == exchange_order_id)
        else {
            return;
        };
        let hedge = self.capabilities().hedge_mode;
        let (pair, direction, kind, side, fill_price, quantity, reduce_only) = {
            let order = &mut state.orders[index];
            let fill_price = price.unwrap_or(if order.price.is_zero() {
                mark
            } else {
                order.price
            });
            order.status = CanonicalOrderStatus::Filled;
            order.filled_quantity = order.quantity;
            order.average_price = Some(fill_price);
            (
                order.pair.clone(),
                order.direction,
                order.kind,
                order.side,
                fill_price,
                order.quantity,
                order.reduce_only,
            )
        };
        Self::apply_fill(
            &mut state,
            hedge,
            &pair,
            direction,
            kind,
            side,
            fill_price,
            quantity,
            reduce_only,
        );
    }

    /// External actor modifies a resting order's price and/or quantity.
    pub fn externally_modify(
        &self,
        exchange_order_id: &str,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
    ) {
        let mut state = self.state.lock();
        if let Some(order) = state
            .orders
            .iter_mut()
            .find(|order| order.exchange_order_id == exchange_order_id)
        {
            if let Some(price) = price {
                order.price = price;
            }
            if let Some(quantity) = quantity {
                order.quantity = quantity;
            }
        }
    }

    /// External actor cancels a resting order.
    pub fn externally_cancel(&self, exchange_order_id: &str) {
        let mut state = self.state.lock();
        if let Some(order) = state
            .orders
            .iter_mut()
            .find(|order| order.exchange_order_id == exchange_order_id)
        {
            order.status = CanonicalOrderStatus::Cancelled;
        }
    }

    /// Remove the venue-side position entirely (liquidation, manual close).
    pub fn remove_position(&self, key: &str) {
        self.state.lock().positions.remove(key);
    }

    pub fn position_amount(&self, key: &str) -> Decimal {
        self.state
            .lock()
            .positions
            .get(key)
            .map(|position| position.amount)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn working_order_count(&self) -> usize {
        self.state
            .lock()
            .orders
            .iter()
            .filter(|order| order.status.is_working())
            .count()
    }

    pub fn order_snapshot(&self, exchange_order_id: &str) -> Option<OrderSnapshot> {
        self.state
            .lock()
            .orders
            .iter()
            .find(|order| order.exchange_order_id == exchange_order_id)
            .map(MockOrder::snapshot)
    }

    fn apply_fill(
        state: &mut MockState,
        hedge: bool,
        pair: &str,
        direction: Direction,
        kind: OrderKind,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        reduce_only: bool,
    ) {
        let key = position_key(pair, direction, hedge);
        let signed = match direction {
            Direction::Long => quantity,
            Direction::Short => -quantity,
        };
        let reduces = reduce_only || kind.is_trigger() || side == direction.exit_side();
        let entry = state.positions.entry(key.clone()).or_insert(ExchangePosition {
            key,
            amount: Decimal::ZERO,
            entry_price: price,
            leverage: state.leverage,
            unrealised_pnl: None,
        });
        if reduces {
            entry.amount = state.residual;
        } else {
            // weighted entry as the venue would report it
            let previous_notional = entry.entry_price * entry.amount.abs();
            let new_abs = (entry.amount + signed).abs();
            if !new_abs.is_zero() {
                entry.entry_price =
                    (previous_notional + price * quantity) / new_abs;
            }
            entry.amount += signed;
        }
        if entry.amount.is_zero() {
            let key = entry.key.clone();
            state.positions.remove(&key);
        }
        state.trades.push(TradeFill {
            exchange_order_id: None,
            side,
            price,
            quantity,
            time: Utc::now(),
        });
    }
}

#[async_trait]
impl ExchangeAdapter for MockExchange {
    fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    fn capabilities(&self) -> ExchangeCapabilities {
        ExchangeCapabilities::for_exchange(self.exchange)
    }

    fn format_pair(&self, symbol: &ExchangeSymbol) -> String {
        if !symbol.parsed_trading_pair.is_empty() {
            return symbol.parsed_trading_pair.to_string();
        }
        format!("{}{}", symbol.token, symbol.quote)
    }

    async fn server_time(&self) -> Result<DateTime<Utc>, AdapterError> {
        Ok(Utc::now())
    }

    async fn exchange_info(&self) -> Result<Vec<SymbolInfo>, AdapterError> {
        Ok(Vec::new())
    }

    async fn mark_price(&self, _symbol: &ExchangeSymbol) -> Result<Decimal, AdapterError> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        Ok(self.state.lock().mark_price)
    }

    async fn klines(
        &self,
        _symbol: &ExchangeSymbol,
        _interval: KlineInterval,
        limit: u32,
    ) -> Result<Vec<Kline>, AdapterError> {
        let state = self.state.lock();
        let yesterday = Kline {
            open_time: Utc::now() - Duration::days(1),
            open: state.daily_close,
            high: state.daily_close,
            low: state.daily_close,
            close: state.daily_close,
            volume: Decimal::ZERO,
        };
        let today = Kline {
            open_time: Utc::now(),
            open: state.daily_close,
            high: state.mark_price,
            low: state.mark_price,
            close: state.mark_price,
            volume: Decimal::ZERO,
        };
        Ok([yesterday, today]
            .into_iter()
            .take(limit as usize)
            .collect())
    }

    async fn leverage_brackets(
        &self,
        _symbol: &ExchangeSymbol,
    ) -> Result<Vec<LeverageBracket>, AdapterError> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        Ok(self.state.lock().brackets.clone())
    }

    async fn balance(&self) -> Result<AccountBalance, AdapterError> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        Ok(self.state.lock().balance.clone())
    }

    async fn positions(&self) -> Result<FnvHashMap<String, ExchangePosition>, AdapterError> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        Ok(self.state.lock().positions.clone())
    }

    async fn open_orders(
        &self,
        symbol: &ExchangeSymbol,
    ) -> Result<Vec<OrderSnapshot>, AdapterError> {
        let pair = self.format_pair(symbol);
        Ok(self
            .state
            .lock()
            .orders
            .iter()
            .filter(|order| order.pair == pair && order.status.is_working())
            .map(MockOrder::snapshot)
            .collect())
    }

    async fn place_order(
        &self,
        symbol: &ExchangeSymbol,
        request: &PlaceOrderRequest,
    ) -> Result<OrderAck, AdapterError> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        let pair = self.format_pair(symbol);
        let is_algo = self.capabilities().is_algo_order(request.kind);
        let mut state = self.state.lock();
        let id = format!("mock-{}", state.next_id);
        state.next_id += 1;

        let price = request
            .price
            .or(request.stop_price)
            .unwrap_or(Decimal::ZERO);
        let mut order = MockOrder {
            exchange_order_id: id.clone(),
            client_order_id: request.client_order_id.clone(),
            pair: pair.clone(),
            kind: request.kind,
            side: request.side,
            direction: request.direction,
            price,
            quantity: request.quantity,
            filled_quantity: Decimal::ZERO,
            average_price: None,
            status: CanonicalOrderStatus::New,
            is_algo,
            reduce_only: request.reduce_only,
        };

        if request.kind == OrderKind::Market {
            let mark = state.mark_price;
            order.status = CanonicalOrderStatus::Filled;
            order.filled_quantity = order.quantity;
            order.average_price = Some(mark);
            order.price = mark;
            Self::apply_fill(
                &mut state,
                self.capabilities().hedge_mode,
                &pair,
                request.direction,
                request.kind,
                request.side,
                mark,
                request.quantity,
                request.reduce_only,
            );
        }

        let status = order.status;
        state.orders.push(order);
        Ok(OrderAck {
            exchange_order_id: id,
            client_order_id: Some(request.client_order_id.clone()),
            status,
        })
    }

    async fn cancel_order(
        &self,
        _symbol: &ExchangeSymbol,
        order: &OrderRef,
    ) -> Result<OrderAck, AdapterError> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        let mut state = self.state.lock();
        let resting = state
            .orders
            .iter_mut()
            .find(|candidate| candidate.exchange_order_id == order.exchange_order_id)
            .ok_or(AdapterError::OrderNotFound)?;
        resting.status = CanonicalOrderStatus::Cancelled;
        Ok(OrderAck {
            exchange_order_id: order.exchange_order_id.clone(),
            client_order_id: Some(resting.client_order_id.clone()),
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
        if order.is_algo {
            return Err(AdapterError::UnsupportedOperation(
                "algo orders cannot be modified in place",
            ));
        }
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        let mut state = self.state.lock();
        let resting = state
            .orders
            .iter_mut()
            .find(|candidate| candidate.exchange_order_id == order.exchange_order_id)
            .ok_or(AdapterError::OrderNotFound)?;
        if !resting.status.is_working() {
            return Err(AdapterError::Venue {
                code: -2011,
                message: "order is not modifiable".into(),
            });
        }
        resting.quantity = quantity;
        resting.price = price;
        Ok(OrderAck {
            exchange_order_id: order.exchange_order_id.clone(),
            client_order_id: Some(resting.client_order_id.clone()),
            status: resting.status,
        })
    }

    async fn query_order(
        &self,
        _symbol: &ExchangeSymbol,
        order: &OrderRef,
    ) -> Result<OrderSnapshot, AdapterError> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        self.state
            .lock()
            .orders
            .iter()
            .find(|candidate| candidate.exchange_order_id == order.exchange_order_id)
            .map(MockOrder::snapshot)
            .ok_or(AdapterError::OrderNotFound)
    }

    async fn cancel_all_orders(&self, symbol: &ExchangeSymbol) -> Result<(), AdapterError> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        let pair = self.format_pair(symbol);
        let mut state = self.state.lock();
        for order in state
            .orders
            .iter_mut()
            .filter(|order| order.pair == pair && !order.is_algo && order.status.is_working())
        {
            order.status = CanonicalOrderStatus::Cancelled;
        }
        Ok(())
    }

    async fn set_leverage(
        &self,
        _symbol: &ExchangeSymbol,
        leverage: u32,
    ) -> Result<(), AdapterError> {
        self.state.lock().leverage = Some(leverage);
        Ok(())
    }

    async fn set_margin_mode(
        &self,
        _symbol: &ExchangeSymbol,
        mode: MarginMode,
        _leverage: Option<u32>,
    ) -> Result<(), AdapterError> {
        self.state.lock().margin_mode = Some(mode);
        Ok(())
    }

    async fn trade_history(
        &self,
        _symbol: &ExchangeSymbol,
        limit: u32,
    ) -> Result<Vec<TradeFill>, AdapterError> {
        let state = self.state.lock();
        let skip = state.trades.len().saturating_sub(limit as usize);
        Ok(state.trades[skip..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn symbol() -> ExchangeSymbol {
        test_symbol(ExchangeId::BinanceFutures)
    }

    fn limit_request(price: Decimal, quantity: Decimal) -> PlaceOrderRequest {
        PlaceOrderRequest {
            side: Side::Buy,
            direction: Direction::Long,
            kind: OrderKind::Limit,
            quantity,
            price: Some(price),
            stop_price: None,
            client_order_id: SmolStr::new("cid"),
            reduce_only: false,
        }
    }

    #[tokio::test]
    async fn market_orders_fill_immediately_at_mark() {
        let venue = MockExchange::new(ExchangeId::BinanceFutures);
        let ack = venue
            .place_order(
                &symbol(),
                &PlaceOrderRequest {
                    side: Side::Buy,
                    direction: Direction::Long,
                    kind: OrderKind::Market,
                    quantity: dec!(0.156),
                    price: None,
                    stop_price: None,
                    client_order_id: SmolStr::new("m1"),
                    reduce_only: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(ack.status, CanonicalOrderStatus::Filled);
        assert_eq!(venue.position_amount("BTCUSDT:LONG"), dec!(0.156));
    }

    #[tokio::test]
    async fn limit_fill_grows_the_position() {
        let venue = MockExchange::new(ExchangeId::BinanceFutures);
        let ack = venue
            .place_order(&symbol(), &limit_request(dec!(98), dec!(0.312)))
            .await
            .unwrap();
        assert_eq!(ack.status, CanonicalOrderStatus::New);
        venue.fill_order(&ack.exchange_order_id, None);
        assert_eq!(venue.position_amount("BTCUSDT:LONG"), dec!(0.312));
        let snapshot = venue.order_snapshot(&ack.exchange_order_id).unwrap();
        assert_eq!(snapshot.status, CanonicalOrderStatus::Filled);
        assert_eq!(snapshot.average_price, Some(dec!(98)));
    }

    #[tokio::test]
    async fn reduce_only_market_leaves_configured_residual() {
        let venue = MockExchange::new(ExchangeId::BinanceFutures);
        venue
            .place_order(
                &symbol(),
                &PlaceOrderRequest {
                    side: Side::Buy,
                    direction: Direction::Long,
                    kind: OrderKind::Market,
                    quantity: dec!(0.468),
                    price: None,
                    stop_price: None,
                    client_order_id: SmolStr::new("m1"),
                    reduce_only: false,
                },
            )
            .await
            .unwrap();
        venue.set_residual(dec!(0.001));
        venue
            .place_order(
                &symbol(),
                &PlaceOrderRequest {
                    side: Side::Sell,
                    direction: Direction::Long,
                    kind: OrderKind::Market,
                    quantity: dec!(0.468),
                    price: None,
                    stop_price: None,
                    client_order_id: SmolStr::new("m2"),
                    reduce_only: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(venue.position_amount("BTCUSDT:LONG"), dec!(0.001));
    }
}
