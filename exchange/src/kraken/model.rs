//! Kraken futures wire models and canonical resolvers.

use crate::{
    error::AdapterError,
    model::{
        position_key, AccountBalance, CanonicalOrderStatus, ExchangePosition, Kline,
        OrderSnapshot, SymbolInfo, TradeFill,
    },
};
use chrono::{DateTime, TimeZone, Utc};
use escada_markets::{Direction, LeverageBracket, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Every derivatives endpoint reports `result: "success"` or an error field.
pub fn ensure_success(
    result: &Option<String>,
    error: &Option<String>,
) -> Result<(), AdapterError> {
    match result.as_deref() {
        Some("success") | None => Ok(()),
        Some(other) => Err(AdapterError::Venue {
            code: -1,
            message: error.clone().unwrap_or_else(|| other.to_string()),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenResult {
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenInstruments {
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub instruments: Vec<KrakenInstrument>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenInstrument {
    pub symbol: String,
    #[serde(rename = "type")]
    pub instrument_type: String,
    pub tradeable: bool,
    #[serde(rename = "tickSize")]
    pub tick_size: Decimal,
    #[serde(rename = "contractValueTradePrecision", default)]
    pub trade_precision: Option<i32>,
    #[serde(rename = "maxPositionLeverage", default)]
    pub max_position_leverage: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenTickers {
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(rename = "serverTime", default)]
    pub server_time: Option<String>,
    #[serde(default)]
    pub tickers: Vec<KrakenTicker>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenTicker {
    pub symbol: String,
    #[serde(rename = "markPrice", default)]
    pub mark_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenAccounts {
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub accounts: KrakenAccountMap,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenAccountMap {
    pub flex: KrakenFlexAccount,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenFlexAccount {
    #[serde(rename = "balanceValue")]
    pub balance_value: Decimal,
    #[serde(rename = "availableMargin")]
    pub available_margin: Decimal,
    #[serde(rename = "totalUnrealized", default)]
    pub total_unrealized: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenOpenPositions {
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(rename = "openPositions", default)]
    pub open_positions: Vec<KrakenPosition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenPosition {
    pub symbol: String,
    pub side: String,
    pub size: Decimal,
    pub price: Decimal,
    #[serde(rename = "unrealizedFunding", default)]
    pub unrealized_funding: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenOpenOrders {
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(rename = "openOrders", default)]
    pub open_orders: Vec<KrakenOrder>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenOrder {
    pub order_id: String,
    #[serde(rename = "cliOrdId", default)]
    pub cli_ord_id: Option<String>,
    pub symbol: String,
    pub side: String,
    #[serde(rename = "orderType")]
    pub order_type: String,
    #[serde(rename = "limitPrice", default)]
    pub limit_price: Option<Decimal>,
    #[serde(rename = "stopPrice", default)]
    pub stop_price: Option<Decimal>,
    #[serde(rename = "unfilledSize")]
    pub unfilled_size: Decimal,
    #[serde(rename = "filledSize", default)]
    pub filled_size: Decimal,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenSendOrder {
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(rename = "sendStatus")]
    pub send_status: KrakenSendStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenSendStatus {
    pub order_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenCancelOrder {
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(rename = "cancelStatus")]
    pub cancel_status: KrakenCancelStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenCancelStatus {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenEditOrder {
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(rename = "editStatus")]
    pub edit_status: KrakenEditStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenEditStatus {
    pub status: String,
    #[serde(rename = "orderId", default)]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenCancelAll {
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenFills {
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub fills: Vec<KrakenFill>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenFill {
    pub order_id: String,
    pub symbol: String,
    pub side: String,
    pub size: Decimal,
    pub price: Decimal,
    #[serde(rename = "fillTime")]
    pub fill_time: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenCandles {
    #[serde(default)]
    pub candles: Vec<KrakenCandle>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KrakenCandle {
    pub time: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

pub fn resolve_order(order: KrakenOrder) -> OrderSnapshot {
    let is_trigger = order.order_type.eq_ignore_ascii_case("stp");
    OrderSnapshot {
        exchange_order_id: order.order_id,
        client_order_id: order.cli_ord_id.map(SmolStr::new),
        status: CanonicalOrderStatus::normalize(&order.status),
        price: order
            .limit_price
            .or(order.stop_price)
            .unwrap_or(Decimal::ZERO),
        quantity: order.unfilled_size + order.filled_size,
        filled_quantity: order.filled_size,
        average_price: None,
        is_algo: is_trigger,
    }
}

pub fn resolve_balance(accounts: KrakenAccounts) -> AccountBalance {
    let flex = accounts.accounts.flex;
    AccountBalance {
        wallet: flex.balance_value,
        available: flex.available_margin,
        cross_wallet: flex.balance_value,
        cross_unrealised_pnl: flex.total_unrealized.unwrap_or(Decimal::ZERO),
    }
}

pub fn resolve_positions(positions: Vec<KrakenPosition>) -> Vec<ExchangePosition> {
    positions
        .into_iter()
        .filter(|position| !position.size.is_zero())
        .map(|position| {
            let direction = if position.side.eq_ignore_ascii_case("long") {
                Direction::Long
            } else {
                Direction::Short
            };
            let amount = match direction {
                Direction::Long => position.size,
                Direction::Short => -position.size,
            };
            // no hedge mode: keyed by symbol alone
            ExchangePosition {
                key: position_key(&position.symbol, direction, false),
                amount,
                entry_price: position.price,
                leverage: None,
                unrealised_pnl: None,
            }
        })
        .collect()
}

/// Kraken has no bracket table; synthesize one unbounded bracket from the
/// instrument's maximum position leverage.
pub fn synthesize_bracket(max_leverage: Option<Decimal>) -> Vec<LeverageBracket> {
    use rust_decimal::prelude::ToPrimitive;
    let initial_leverage = max_leverage
        .and_then(|leverage| leverage.floor().to_u32())
        .unwrap_or(50);
    vec![LeverageBracket {
        bracket: 1,
        initial_leverage,
        notional_floor: Decimal::ZERO,
        notional_cap: Decimal::MAX,
        maint_margin_ratio: Decimal::ZERO,
    }]
}

pub fn resolve_candles(candles: Vec<KrakenCandle>) -> Result<Vec<Kline>, AdapterError> {
    candles
        .into_iter()
        .map(|candle| {
            let parse = |raw: &str| {
                escada_markets::parse_decimal(raw)
                    .map_err(|error| AdapterError::decode(error.to_string()))
            };
            Ok(Kline {
                open_time: Utc
                    .timestamp_millis_opt(candle.time)
                    .single()
                    .ok_or_else(|| AdapterError::decode("candle time out of range"))?,
                open: parse(&candle.open)?,
                high: parse(&candle.high)?,
                low: parse(&candle.low)?,
                close: parse(&candle.close)?,
                volume: parse(&candle.volume)?,
            })
        })
        .collect()
}

pub fn resolve_symbol_info(instruments: Vec<KrakenInstrument>) -> Vec<SymbolInfo> {
    instruments
        .into_iter()
        .filter(|instrument| instrument.tradeable && instrument.instrument_type.contains("perpetual"))
        .filter_map(|instrument| {
            // perpetuals are named PF_<TOKEN><QUOTE>
            let stripped = instrument.symbol.strip_prefix("PF_")?.to_string();
            let (token, quote) = escada_markets::decode_pair(&stripped).ok()?;
            let quantity_precision = instrument.trade_precision.unwrap_or(0).max(0) as u32;
            Some(SymbolInfo {
                pair: instrument.symbol,
                token,
                quote,
                price_precision: instrument.tick_size.normalize().scale(),
                quantity_precision,
                tick_size: instrument.tick_size,
                lot_step: Decimal::new(1, quantity_precision),
                min_notional: Decimal::ZERO,
                min_price: Decimal::ZERO,
                max_price: Decimal::MAX,
            })
        })
        .collect()
}

pub fn resolve_fills(fills: Vec<KrakenFill>) -> Result<Vec<TradeFill>, AdapterError> {
    fills
        .into_iter()
        .map(|fill| {
            let time: DateTime<Utc> = fill
                .fill_time
                .parse()
                .map_err(|_| AdapterError::decode("fill time"))?;
            Ok(TradeFill {
                exchange_order_id: Some(fill.order_id),
                side: if fill.side.eq_ignore_ascii_case("buy") {
                    Side::Buy
                } else {
                    Side::Sell
                },
                price: fill.price,
                quantity: fill.size,
                time,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn untouched_order_is_new() {
        let order = KrakenOrder {
            order_id: "k1".into(),
            cli_ord_id: None,
            symbol: "PF_XBTUSDT".into(),
            side: "buy".into(),
            order_type: "lmt".into(),
            limit_price: Some(dec!(98)),
            stop_price: None,
            unfilled_size: dec!(0.312),
            filled_size: dec!(0),
            status: "untouched".into(),
        };
        let snapshot = resolve_order(order);
        assert_eq!(snapshot.status, CanonicalOrderStatus::New);
        assert_eq!(snapshot.quantity, dec!(0.312));
        assert!(!snapshot.is_algo);
    }

    #[test]
    fn stop_order_is_algo_with_trigger_price() {
        let order = KrakenOrder {
            order_id: "k2".into(),
            cli_ord_id: None,
            symbol: "PF_XBTUSDT".into(),
            side: "sell".into(),
            order_type: "stp".into(),
            limit_price: None,
            stop_price: Some(dec!(84.64)),
            unfilled_size: dec!(0.468),
            filled_size: dec!(0),
            status: "untouched".into(),
        };
        let snapshot = resolve_order(order);
        assert!(snapshot.is_algo);
        assert_eq!(snapshot.price, dec!(84.64));
    }

    #[test]
    fn success_result_passes_and_error_surfaces() {
        assert!(ensure_success(&Some("success".into()), &None).is_ok());
        assert!(ensure_success(&None, &None).is_ok());
        assert!(matches!(
            ensure_success(&Some("error".into()), &Some("nonce below threshold".into())),
            Err(AdapterError::Venue { .. })
        ));
    }
}
