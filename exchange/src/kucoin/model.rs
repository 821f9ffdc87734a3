//! KuCoin futures wire models and canonical resolvers.

use crate::{
    error::AdapterError,
    model::{
        position_key, AccountBalance, CanonicalOrderStatus, ExchangePosition, Kline, OrderAck,
        OrderSnapshot, SymbolInfo, TradeFill,
    },
};
use chrono::{TimeZone, Utc};
use escada_markets::{parse_decimal, Direction, LeverageBracket, Side};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use smol_str::SmolStr;

/// Envelope every endpoint responds with; `"200000"` is success.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KucoinResponse<T> {
    pub code: String,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

impl<T> KucoinResponse<T>
where
    T: DeserializeOwned,
{
    pub fn into_result(self) -> Result<T, AdapterError> {
        if self.code != "200000" {
            let code = self.code.parse().unwrap_or(-1);
            return Err(AdapterError::Venue {
                code,
                message: self.msg.unwrap_or_default(),
            });
        }
        self.data
            .ok_or_else(|| AdapterError::decode("missing data payload"))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KucoinPage<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KucoinContract {
    pub symbol: String,
    pub status: String,
    #[serde(rename = "baseCurrency")]
    pub base_currency: String,
    #[serde(rename = "quoteCurrency")]
    pub quote_currency: String,
    #[serde(rename = "tickSize")]
    pub tick_size: f64,
    #[serde(rename = "lotSize")]
    pub lot_size: f64,
    #[serde(rename = "maxPrice")]
    pub max_price: f64,
    #[serde(rename = "maxLeverage")]
    pub max_leverage: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KucoinMarkPrice {
    pub symbol: String,
    pub value: f64,
}

/// Kline tuple: ts(ms), open, high, low, close, volume.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KucoinKline(pub i64, pub f64, pub f64, pub f64, pub f64, pub f64);

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KucoinAccountOverview {
    #[serde(rename = "accountEquity")]
    pub account_equity: f64,
    #[serde(rename = "availableBalance")]
    pub available_balance: f64,
    #[serde(rename = "marginBalance")]
    pub margin_balance: f64,
    #[serde(rename = "unrealisedPNL")]
    pub unrealised_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KucoinPosition {
    pub symbol: String,
    #[serde(rename = "currentQty")]
    pub current_qty: f64,
    #[serde(rename = "avgEntryPrice")]
    pub avg_entry_price: f64,
    #[serde(rename = "realLeverage")]
    pub real_leverage: f64,
    #[serde(rename = "unrealisedPnl")]
    pub unrealised_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KucoinOrder {
    pub id: String,
    #[serde(rename = "clientOid")]
    pub client_oid: Option<String>,
    pub status: String,
    #[serde(rename = "isActive", default)]
    pub is_active: Option<bool>,
    #[serde(rename = "cancelExist", default)]
    pub cancel_exist: bool,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(rename = "stopPrice", default)]
    pub stop_price: Option<String>,
    pub size: f64,
    #[serde(rename = "dealSize", default)]
    pub deal_size: f64,
    #[serde(rename = "stop", default)]
    pub stop: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KucoinOrderAck {
    #[serde(rename = "orderId")]
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KucoinCancelledIds {
    #[serde(rename = "cancelledOrderIds", default)]
    pub cancelled_order_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KucoinFill {
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub side: String,
    pub price: String,
    pub size: f64,
    #[serde(rename = "tradeTime")]
    pub trade_time: i64,
}

fn decimal(raw: &str) -> Result<Decimal, AdapterError> {
    parse_decimal(raw).map_err(|error| AdapterError::decode(error.to_string()))
}

fn decimal_from_f64(value: f64) -> Result<Decimal, AdapterError> {
    Decimal::try_from(value).map_err(|error| AdapterError::decode(error.to_string()))
}

pub fn resolve_order(order: KucoinOrder) -> Result<OrderSnapshot, AdapterError> {
    let size = decimal_from_f64(order.size)?;
    let filled = decimal_from_f64(order.deal_size)?;
    let status = match order.status.as_str() {
        "open" if filled > Decimal::ZERO => CanonicalOrderStatus::PartiallyFilled,
        "open" => CanonicalOrderStatus::New,
        "done" if order.cancel_exist => CanonicalOrderStatus::Cancelled,
        "done" if filled >= size && size > Decimal::ZERO => CanonicalOrderStatus::Filled,
        "done" => CanonicalOrderStatus::Cancelled,
        other => CanonicalOrderStatus::normalize(other),
    };
    let is_stop = order.stop.as_deref().is_some_and(|stop| !stop.is_empty());
    let price = match (&order.price, &order.stop_price) {
        (Some(price), _) if !price.is_empty() => decimal(price)?,
        (_, Some(stop)) if !stop.is_empty() => decimal(stop)?,
        _ => Decimal::ZERO,
    };
    Ok(OrderSnapshot {
        exchange_order_id: order.id,
        client_order_id: order.client_oid.map(SmolStr::new),
        status,
        price,
        quantity: size,
        filled_quantity: filled,
        average_price: None,
        is_algo: is_stop,
    })
}

pub fn resolve_ack(ack: KucoinOrderAck) -> OrderAck {
    OrderAck {
        exchange_order_id: ack.order_id,
        client_order_id: None,
        status: CanonicalOrderStatus::New,
    }
}

pub fn resolve_balance(overview: KucoinAccountOverview) -> Result<AccountBalance, AdapterError> {
    Ok(AccountBalance {
        wallet: decimal_from_f64(overview.account_equity)?,
        available: decimal_from_f64(overview.available_balance)?,
        cross_wallet: decimal_from_f64(overview.margin_balance)?,
        cross_unrealised_pnl: decimal_from_f64(overview.unrealised_pnl)?,
    })
}

pub fn resolve_positions(
    positions: Vec<KucoinPosition>,
) -> Result<Vec<ExchangePosition>, AdapterError> {
    positions
        .into_iter()
        .filter(|position| position.current_qty != 0.0)
        .map(|position| {
            let amount = decimal_from_f64(position.current_qty)?;
            let direction = if amount > Decimal::ZERO {
                Direction::Long
            } else {
                Direction::Short
            };
            // no hedge mode: keyed by symbol alone
            Ok(ExchangePosition {
                key: position_key(&position.symbol, direction, false),
                amount,
                entry_price: decimal_from_f64(position.avg_entry_price)?,
                leverage: decimal_from_f64(position.real_leverage)?.to_u32(),
                unrealised_pnl: Some(decimal_from_f64(position.unrealised_pnl)?),
            })
        })
        .collect()
}

/// KuCoin exposes one max-leverage figure per contract; synthesize a single
/// unbounded bracket from it.
pub fn synthesize_bracket(max_leverage: u32) -> Vec<LeverageBracket> {
    vec![LeverageBracket {
        bracket: 1,
        initial_leverage: max_leverage,
        notional_floor: Decimal::ZERO,
        notional_cap: Decimal::MAX,
        maint_margin_ratio: Decimal::ZERO,
    }]
}

pub fn resolve_klines(klines: Vec<KucoinKline>) -> Result<Vec<Kline>, AdapterError> {
    klines
        .into_iter()
        .map(|kline| {
            Ok(Kline {
                open_time: Utc
                    .timestamp_millis_opt(kline.0)
                    .single()
                    .ok_or_else(|| AdapterError::decode("kline time out of range"))?,
                open: decimal_from_f64(kline.1)?,
                high: decimal_from_f64(kline.2)?,
                low: decimal_from_f64(kline.3)?,
                close: decimal_from_f64(kline.4)?,
                volume: decimal_from_f64(kline.5)?,
            })
        })
        .collect()
}

pub fn resolve_symbol_info(
    contracts: Vec<KucoinContract>,
) -> Result<Vec<SymbolInfo>, AdapterError> {
    contracts
        .into_iter()
        .filter(|contract| contract.status == "Open")
        .map(|contract| {
            let tick_size = decimal_from_f64(contract.tick_size)?;
            let lot_step = decimal_from_f64(contract.lot_size)?;
            Ok(SymbolInfo {
                pair: contract.symbol,
                token: SmolStr::new(&contract.base_currency),
                quote: SmolStr::new(&contract.quote_currency),
                price_precision: tick_size.normalize().scale(),
                quantity_precision: lot_step.normalize().scale(),
                tick_size,
                lot_step,
                min_notional: Decimal::ZERO,
                min_price: Decimal::ZERO,
                max_price: decimal_from_f64(contract.max_price)?,
            })
        })
        .collect()
}

pub fn resolve_fills(fills: Vec<KucoinFill>) -> Result<Vec<TradeFill>, AdapterError> {
    fills
        .into_iter()
        .map(|fill| {
            Ok(TradeFill {
                exchange_order_id: Some(fill.order_id),
                side: if fill.side == "buy" {
                    Side::Buy
                } else {
                    Side::Sell
                },
                price: decimal(&fill.price)?,
                quantity: decimal_from_f64(fill.size)?,
                time: Utc
                    .timestamp_millis_opt(fill.trade_time)
                    .single()
                    .ok_or_else(|| AdapterError::decode("fill time out of range"))?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn open_order_with_partial_fill_is_partially_filled() {
        let order = KucoinOrder {
            id: "o1".into(),
            client_oid: None,
            status: "open".into(),
            is_active: Some(true),
            cancel_exist: false,
            price: Some("98.0".into()),
            stop_price: None,
            size: 10.0,
            deal_size: 4.0,
            stop: None,
        };
        let snapshot = resolve_order(order).unwrap();
        assert_eq!(snapshot.status, CanonicalOrderStatus::PartiallyFilled);
        assert_eq!(snapshot.filled_quantity, dec!(4));
    }

    #[test]
    fn done_with_cancel_exist_is_cancelled() {
        let order = KucoinOrder {
            id: "o2".into(),
            client_oid: None,
            status: "done".into(),
            is_active: Some(false),
            cancel_exist: true,
            price: Some("98.0".into()),
            stop_price: None,
            size: 10.0,
            deal_size: 0.0,
            stop: None,
        };
        assert_eq!(
            resolve_order(order).unwrap().status,
            CanonicalOrderStatus::Cancelled
        );
    }

    #[test]
    fn stop_orders_resolve_as_algo_with_trigger_price() {
        let order = KucoinOrder {
            id: "o3".into(),
            client_oid: None,
            status: "open".into(),
            is_active: Some(true),
            cancel_exist: false,
            price: None,
            stop_price: Some("84.64".into()),
            size: 1.0,
            deal_size: 0.0,
            stop: Some("down".into()),
        };
        let snapshot = resolve_order(order).unwrap();
        assert!(snapshot.is_algo);
        assert_eq!(snapshot.price, dec!(84.64));
    }
}
