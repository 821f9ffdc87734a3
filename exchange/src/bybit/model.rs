//! Bybit v5 wire models and canonical resolvers.

use crate::{
    error::AdapterError,
    model::{
        position_key, AccountBalance, CanonicalOrderStatus, ExchangePosition, Kline, OrderAck,
        OrderSnapshot, SymbolInfo, TradeFill,
    },
};
use chrono::{TimeZone, Utc};
use escada_markets::{decode_pair, parse_decimal, Direction, LeverageBracket, Side};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use smol_str::SmolStr;

/// Envelope every v5 endpoint responds with.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BybitResponse<T> {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg")]
    pub ret_msg: String,
    pub result: Option<T>,
}

impl<T> BybitResponse<T>
where
    T: DeserializeOwned,
{
    /// Unwrap the envelope, mapping non-zero return codes to venue errors.
    pub fn into_result(self) -> Result<T, AdapterError> {
        if self.ret_code != 0 {
            return Err(AdapterError::Venue {
                code: self.ret_code,
                message: self.ret_msg,
            });
        }
        self.result
            .ok_or_else(|| AdapterError::decode("missing result payload"))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BybitList<T> {
    pub list: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BybitServerTime {
    #[serde(rename = "timeSecond")]
    pub time_second: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BybitInstrument {
    pub symbol: String,
    pub status: String,
    #[serde(rename = "priceFilter")]
    pub price_filter: BybitPriceFilter,
    #[serde(rename = "lotSizeFilter")]
    pub lot_size_filter: BybitLotSizeFilter,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BybitPriceFilter {
    #[serde(rename = "tickSize")]
    pub tick_size: String,
    #[serde(rename = "minPrice")]
    pub min_price: String,
    #[serde(rename = "maxPrice")]
    pub max_price: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BybitLotSizeFilter {
    #[serde(rename = "qtyStep")]
    pub qty_step: String,
    #[serde(rename = "minNotionalValue", default)]
    pub min_notional_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BybitTicker {
    pub symbol: String,
    #[serde(rename = "markPrice")]
    pub mark_price: String,
}

/// Kline tuple: start, open, high, low, close, volume, turnover.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BybitKline(
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BybitRiskLimit {
    pub id: u32,
    #[serde(rename = "riskLimitValue")]
    pub risk_limit_value: String,
    #[serde(rename = "maintenanceMargin")]
    pub maintenance_margin: String,
    #[serde(rename = "maxLeverage")]
    pub max_leverage: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BybitWallet {
    #[serde(rename = "totalWalletBalance")]
    pub total_wallet_balance: String,
    #[serde(rename = "totalAvailableBalance")]
    pub total_available_balance: String,
    #[serde(rename = "totalPerpUPL", default)]
    pub total_perp_upl: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BybitPosition {
    pub symbol: String,
    pub side: String,
    pub size: String,
    #[serde(rename = "avgPrice")]
    pub avg_price: String,
    pub leverage: String,
    #[serde(rename = "unrealisedPnl")]
    pub unrealised_pnl: String,
    #[serde(rename = "positionIdx")]
    pub position_idx: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BybitOrder {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "orderLinkId")]
    pub order_link_id: Option<String>,
    #[serde(rename = "orderStatus")]
    pub order_status: String,
    pub price: String,
    pub qty: String,
    #[serde(rename = "cumExecQty")]
    pub cum_exec_qty: String,
    #[serde(rename = "avgPrice", default)]
    pub avg_price: Option<String>,
    #[serde(rename = "triggerPrice", default)]
    pub trigger_price: Option<String>,
    #[serde(rename = "stopOrderType", default)]
    pub stop_order_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BybitOrderAck {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "orderLinkId")]
    pub order_link_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BybitExecution {
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub side: String,
    #[serde(rename = "execPrice")]
    pub exec_price: String,
    #[serde(rename = "execQty")]
    pub exec_qty: String,
    #[serde(rename = "execTime")]
    pub exec_time: String,
}

fn decimal(raw: &str) -> Result<Decimal, AdapterError> {
    parse_decimal(raw).map_err(|error| AdapterError::decode(error.to_string()))
}

pub fn resolve_order(order: BybitOrder) -> Result<OrderSnapshot, AdapterError> {
    let is_trigger = order
        .stop_order_type
        .as_deref()
        .is_some_and(|kind| !kind.is_empty() && kind != "UNKNOWN");
    let price = if order.price.is_empty() || order.price == "0" {
        order
            .trigger_price
            .as_deref()
            .map(decimal)
            .transpose()?
            .unwrap_or(Decimal::ZERO)
    } else {
        decimal(&order.price)?
    };
    Ok(OrderSnapshot {
        exchange_order_id: order.order_id,
        client_order_id: order.order_link_id.map(SmolStr::new),
        status: CanonicalOrderStatus::normalize(&order.order_status),
        price,
        quantity: decimal(&order.qty)?,
        filled_quantity: decimal(&order.cum_exec_qty)?,
        average_price: order
            .avg_price
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(decimal)
            .transpose()?
            .filter(|price| !price.is_zero()),
        is_algo: is_trigger,
    })
}

pub fn resolve_ack(ack: BybitOrderAck) -> OrderAck {
    OrderAck {
        exchange_order_id: ack.order_id,
        client_order_id: ack.order_link_id.map(SmolStr::new),
        status: CanonicalOrderStatus::New,
    }
}

pub fn resolve_balance(mut wallets: Vec<BybitWallet>) -> Result<AccountBalance, AdapterError> {
    let wallet = wallets
        .drain(..)
        .next()
        .ok_or_else(|| AdapterError::decode("empty wallet-balance response"))?;
    let total = decimal(&wallet.total_wallet_balance)?;
    Ok(AccountBalance {
        wallet: total,
        available: decimal(&wallet.total_available_balance)?,
        cross_wallet: total,
        cross_unrealised_pnl: wallet
            .total_perp_upl
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(decimal)
            .transpose()?
            .unwrap_or(Decimal::ZERO),
    })
}

pub fn resolve_positions(
    positions: Vec<BybitPosition>,
) -> Result<Vec<ExchangePosition>, AdapterError> {
    positions
        .into_iter()
        .filter(|position| !position.size.is_empty() && position.size != "0")
        .map(|position| {
            let size = decimal(&position.size)?;
            let direction = match position.side.as_str() {
                "Buy" => Direction::Long,
                _ => Direction::Short,
            };
            let amount = match direction {
                Direction::Long => size,
                Direction::Short => -size,
            };
            Ok(ExchangePosition {
                key: position_key(&position.symbol, direction, true),
                amount,
                entry_price: decimal(&position.avg_price)?,
                leverage: decimal(&position.leverage)?.to_u32(),
                unrealised_pnl: Some(decimal(&position.unrealised_pnl)?),
            })
        })
        .collect()
}

/// Map the risk-limit table onto canonical leverage brackets: each tier's
/// floor is the previous tier's risk-limit value.
pub fn resolve_brackets(tiers: Vec<BybitRiskLimit>) -> Result<Vec<LeverageBracket>, AdapterError> {
    let mut brackets = Vec::with_capacity(tiers.len());
    let mut floor = Decimal::ZERO;
    for (index, tier) in tiers.into_iter().enumerate() {
        let cap = decimal(&tier.risk_limit_value)?;
        let initial_leverage = decimal(&tier.max_leverage)?
            .floor()
            .to_u32()
            .ok_or_else(|| AdapterError::decode("maxLeverage out of range"))?;
        brackets.push(LeverageBracket {
            bracket: (index + 1) as u32,
            initial_leverage,
            notional_floor: floor,
            notional_cap: cap,
            maint_margin_ratio: decimal(&tier.maintenance_margin)?,
        });
        floor = cap;
    }
    Ok(brackets)
}

pub fn resolve_klines(mut klines: Vec<BybitKline>) -> Result<Vec<Kline>, AdapterError> {
    // v5 returns newest first; canonical order is oldest first
    klines.reverse();
    klines
        .into_iter()
        .map(|kline| {
            let start: i64 = kline
                .0
                .parse()
                .map_err(|_| AdapterError::decode("kline start time"))?;
            Ok(Kline {
                open_time: Utc
                    .timestamp_millis_opt(start)
                    .single()
                    .ok_or_else(|| AdapterError::decode("kline start out of range"))?,
                open: decimal(&kline.1)?,
                high: decimal(&kline.2)?,
                low: decimal(&kline.3)?,
                close: decimal(&kline.4)?,
                volume: decimal(&kline.5)?,
            })
        })
        .collect()
}

pub fn resolve_symbol_info(
    instruments: Vec<BybitInstrument>,
) -> Result<Vec<SymbolInfo>, AdapterError> {
    instruments
        .into_iter()
        .filter(|instrument| instrument.status == "Trading")
        .filter_map(|instrument| {
            let (token, quote) = decode_pair(&instrument.symbol).ok()?;
            Some((instrument, token, quote))
        })
        .map(|(instrument, token, quote)| {
            let tick_size = decimal(&instrument.price_filter.tick_size)?;
            let lot_step = decimal(&instrument.lot_size_filter.qty_step)?;
            Ok(SymbolInfo {
                pair: instrument.symbol,
                token,
                quote,
                price_precision: tick_size.scale(),
                quantity_precision: lot_step.scale(),
                tick_size,
                lot_step,
                min_notional: instrument
                    .lot_size_filter
                    .min_notional_value
                    .as_deref()
                    .map(decimal)
                    .transpose()?
                    .unwrap_or(Decimal::ZERO),
                min_price: decimal(&instrument.price_filter.min_price)?,
                max_price: decimal(&instrument.price_filter.max_price)?,
            })
        })
        .collect()
}

pub fn resolve_trades(executions: Vec<BybitExecution>) -> Result<Vec<TradeFill>, AdapterError> {
    executions
        .into_iter()
        .map(|execution| {
            let time: i64 = execution
                .exec_time
                .parse()
                .map_err(|_| AdapterError::decode("execution time"))?;
            Ok(TradeFill {
                exchange_order_id: Some(execution.order_id),
                side: if execution.side == "Buy" {
                    Side::Buy
                } else {
                    Side::Sell
                },
                price: decimal(&execution.exec_price)?,
                quantity: decimal(&execution.exec_qty)?,
                time: Utc
                    .timestamp_millis_opt(time)
                    .single()
                    .ok_or_else(|| AdapterError::decode("execution time out of range"))?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn envelope_surfaces_venue_errors() {
        let response: BybitResponse<BybitServerTime> = BybitResponse {
            ret_code: 10001,
            ret_msg: "params error".into(),
            result: None,
        };
        assert!(matches!(
            response.into_result(),
            Err(AdapterError::Venue { code: 10001, .. })
        ));
    }

    #[test]
    fn untriggered_stop_normalizes_to_new_and_algo() {
        let order = BybitOrder {
            order_id: "abc".into(),
            order_link_id: None,
            order_status: "Untriggered".into(),
            price: "0".into(),
            qty: "0.468".into(),
            cum_exec_qty: "0".into(),
            avg_price: None,
            trigger_price: Some("84.64".into()),
            stop_order_type: Some("StopLoss".into()),
        };
        let snapshot = resolve_order(order).unwrap();
        assert_eq!(snapshot.status, CanonicalOrderStatus::New);
        assert_eq!(snapshot.price, dec!(84.64));
        assert!(snapshot.is_algo);
    }

    #[test]
    fn risk_limit_tiers_chain_floors() {
        let tiers = vec![
            BybitRiskLimit {
                id: 1,
                risk_limit_value: "200000".into(),
                maintenance_margin: "0.01".into(),
                max_leverage: "10.00".into(),
            },
            BybitRiskLimit {
                id: 2,
                risk_limit_value: "400000".into(),
                maintenance_margin: "0.02".into(),
                max_leverage: "5.00".into(),
            },
        ];
        let brackets = resolve_brackets(tiers).unwrap();
        assert_eq!(brackets[0].notional_floor, dec!(0));
        assert_eq!(brackets[0].notional_cap, dec!(200000));
        assert_eq!(brackets[0].initial_leverage, 10);
        assert_eq!(brackets[1].notional_floor, dec!(200000));
        assert_eq!(brackets[1].initial_leverage, 5);
    }
}
