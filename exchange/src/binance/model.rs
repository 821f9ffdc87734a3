//! Binance USD-M futures wire models and canonical resolvers.

use crate::{
    error::AdapterError,
    model::{
        AccountBalance, CanonicalOrderStatus, ExchangePosition, Kline, OrderAck, OrderSnapshot,
        SymbolInfo, TradeFill, position_key,
    },
};
use chrono::{DateTime, TimeZone, Utc};
use escada_markets::{decode_pair, parse_decimal, Direction, LeverageBracket, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BinanceServerTime {
    #[serde(rename = "serverTime")]
    pub server_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BinanceExchangeInfo {
    pub symbols: Vec<BinanceSymbol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BinanceSymbol {
    pub symbol: String,
    pub status: String,
    #[serde(rename = "pricePrecision")]
    pub price_precision: u32,
    #[serde(rename = "quantityPrecision")]
    pub quantity_precision: u32,
    pub filters: Vec<BinanceFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "filterType")]
pub enum BinanceFilter {
    #[serde(rename = "PRICE_FILTER")]
    Price {
        #[serde(rename = "tickSize")]
        tick_size: String,
        #[serde(rename = "minPrice")]
        min_price: String,
        #[serde(rename = "maxPrice")]
        max_price: String,
    },
    #[serde(rename = "LOT_SIZE")]
    LotSize {
        #[serde(rename = "stepSize")]
        step_size: String,
    },
    #[serde(rename = "MIN_NOTIONAL")]
    MinNotional {
        notional: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BinancePremiumIndex {
    pub symbol: String,
    #[serde(rename = "markPrice")]
    pub mark_price: String,
}

/// Raw kline tuple: open time, O, H, L, C, V, ... (trailing fields ignored).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BinanceKline(
    pub i64,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    #[serde(default)] pub serde_json::Value,
    #[serde(default)] pub serde_json::Value,
    #[serde(default)] pub serde_json::Value,
    #[serde(default)] pub serde_json::Value,
    #[serde(default)] pub serde_json::Value,
    #[serde(default)] pub serde_json::Value,
);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BinanceSymbolBrackets {
    pub symbol: String,
    pub brackets: Vec<BinanceBracket>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BinanceBracket {
    pub bracket: u32,
    #[serde(rename = "initialLeverage")]
    pub initial_leverage: u32,
    #[serde(rename = "notionalFloor")]
    pub notional_floor: Decimal,
    #[serde(rename = "notionalCap")]
    pub notional_cap: Decimal,
    #[serde(rename = "maintMarginRatio")]
    pub maint_margin_ratio: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BinanceBalanceEntry {
    pub asset: String,
    pub balance: String,
    #[serde(rename = "availableBalance")]
    pub available_balance: String,
    #[serde(rename = "crossWalletBalance")]
    pub cross_wallet_balance: String,
    #[serde(rename = "crossUnPnl")]
    pub cross_un_pnl: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BinancePositionRisk {
    pub symbol: String,
    #[serde(rename = "positionAmt")]
    pub position_amt: String,
    #[serde(rename = "entryPrice")]
    pub entry_price: String,
    pub leverage: String,
    #[serde(rename = "unRealizedProfit")]
    pub unrealized_profit: String,
    #[serde(rename = "positionSide")]
    pub position_side: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BinanceOrder {
    #[serde(rename = "orderId")]
    pub order_id: i64,
    #[serde(rename = "clientOrderId")]
    pub client_order_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub side: Option<String>,
    pub price: String,
    #[serde(rename = "origQty")]
    pub orig_qty: String,
    #[serde(rename = "executedQty")]
    pub executed_qty: String,
    #[serde(rename = "avgPrice", default)]
    pub avg_price: Option<String>,
}

/// Algo orders come back from the dedicated endpoints with their own id
/// field and vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BinanceAlgoOrder {
    #[serde(rename = "algoId")]
    pub algo_id: i64,
    #[serde(rename = "clientAlgoId")]
    pub client_algo_id: Option<String>,
    #[serde(rename = "algoStatus")]
    pub algo_status: String,
    #[serde(rename = "stopPrice", default)]
    pub stop_price: Option<String>,
    #[serde(rename = "origQty", default)]
    pub orig_qty: Option<String>,
    #[serde(rename = "executedQty", default)]
    pub executed_qty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BinanceCodeMessage {
    pub code: i64,
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BinanceLeverageAck {
    pub symbol: String,
    pub leverage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BinanceUserTrade {
    #[serde(rename = "orderId")]
    pub order_id: i64,
    pub side: String,
    pub price: String,
    pub qty: String,
    pub time: i64,
}

fn decimal(raw: &str) -> Result<Decimal, AdapterError> {
    parse_decimal(raw).map_err(|error| AdapterError::decode(error.to_string()))
}

pub fn resolve_server_time(response: BinanceServerTime) -> Result<DateTime<Utc>, AdapterError> {
    Utc.timestamp_millis_opt(response.server_time)
        .single()
        .ok_or_else(|| AdapterError::decode("server time out of range"))
}

pub fn resolve_order(order: BinanceOrder) -> Result<OrderSnapshot, AdapterError> {
    Ok(OrderSnapshot {
        exchange_order_id: order.order_id.to_string(),
        client_order_id: order.client_order_id.map(SmolStr::new),
        status: CanonicalOrderStatus::normalize(&order.status),
        price: decimal(&order.price)?,
        quantity: decimal(&order.orig_qty)?,
        filled_quantity: decimal(&order.executed_qty)?,
        average_price: order
            .avg_price
            .as_deref()
            .map(decimal)
            .transpose()?
            .filter(|price| !price.is_zero()),
        is_algo: false,
    })
}

pub fn resolve_order_ack(order: BinanceOrder) -> OrderAck {
    OrderAck {
        exchange_order_id: order.order_id.to_string(),
        client_order_id: order.client_order_id.map(SmolStr::new),
        status: CanonicalOrderStatus::normalize(&order.status),
    }
}

pub fn resolve_algo_order(order: BinanceAlgoOrder) -> Result<OrderSnapshot, AdapterError> {
    Ok(OrderSnapshot {
        exchange_order_id: order.algo_id.to_string(),
        client_order_id: order.client_algo_id.map(SmolStr::new),
        status: CanonicalOrderStatus::normalize(&order.algo_status),
        price: order
            .stop_price
            .as_deref()
            .map(decimal)
            .transpose()?
            .unwrap_or(Decimal::ZERO),
        quantity: order
            .orig_qty
            .as_deref()
            .map(decimal)
            .transpose()?
            .unwrap_or(Decimal::ZERO),
        filled_quantity: order
            .executed_qty
            .as_deref()
            .map(decimal)
            .transpose()?
            .unwrap_or(Decimal::ZERO),
        average_price: None,
        is_algo: true,
    })
}

pub fn resolve_algo_ack(order: BinanceAlgoOrder) -> OrderAck {
    OrderAck {
        exchange_order_id: order.algo_id.to_string(),
        client_order_id: order.client_algo_id.map(SmolStr::new),
        status: CanonicalOrderStatus::normalize(&order.algo_status),
    }
}

pub fn resolve_balance(
    entries: Vec<BinanceBalanceEntry>,
    quote: &str,
) -> Result<AccountBalance, AdapterError> {
    let entry = entries
        .into_iter()
        .find(|entry| entry.asset.eq_ignore_ascii_case(quote))
        .ok_or_else(|| AdapterError::decode(format!("no balance entry for {quote}")))?;
    Ok(AccountBalance {
        wallet: decimal(&entry.balance)?,
        available: decimal(&entry.available_balance)?,
        cross_wallet: decimal(&entry.cross_wallet_balance)?,
        cross_unrealised_pnl: decimal(&entry.cross_un_pnl)?,
    })
}

pub fn resolve_positions(
    positions: Vec<BinancePositionRisk>,
) -> Result<Vec<ExchangePosition>, AdapterError> {
    positions
        .into_iter()
        .filter(|position| position.position_amt != "0" && !position.position_amt.is_empty())
        .map(|position| {
            let amount = decimal(&position.position_amt)?;
            if amount.is_zero() {
                return Ok(None);
            }
            let direction = match position.position_side.as_str() {
                "LONG" => Direction::Long,
                "SHORT" => Direction::Short,
                // one-way mode: derive from the sign
                _ if amount > Decimal::ZERO => Direction::Long,
                _ => Direction::Short,
            };
            Ok(Some(ExchangePosition {
                key: position_key(&position.symbol, direction, true),
                amount,
                entry_price: decimal(&position.entry_price)?,
                leverage: position.leverage.parse().ok(),
                unrealised_pnl: Some(decimal(&position.unrealized_profit)?),
            }))
        })
        .filter_map(Result::transpose)
        .collect()
}

pub fn resolve_brackets(
    mut response: Vec<BinanceSymbolBrackets>,
) -> Result<Vec<LeverageBracket>, AdapterError> {
    let entry = response
        .pop()
        .ok_or_else(|| AdapterError::decode("empty leverage bracket response"))?;
    let mut brackets: Vec<LeverageBracket> = entry
        .brackets
        .into_iter()
        .map(|bracket| LeverageBracket {
            bracket: bracket.bracket,
            initial_leverage: bracket.initial_leverage,
            notional_floor: bracket.notional_floor,
            notional_cap: bracket.notional_cap,
            maint_margin_ratio: bracket.maint_margin_ratio,
        })
        .collect();
    brackets.sort_by_key(|bracket| bracket.bracket);
    Ok(brackets)
}

pub fn resolve_klines(klines: Vec<BinanceKline>) -> Result<Vec<Kline>, AdapterError> {
    klines
        .into_iter()
        .map(|kline| {
            Ok(Kline {
                open_time: Utc
                    .timestamp_millis_opt(kline.0)
                    .single()
                    .ok_or_else(|| AdapterError::decode("kline open time out of range"))?,
                open: decimal(&kline.1)?,
                high: decimal(&kline.2)?,
                low: decimal(&kline.3)?,
                close: decimal(&kline.4)?,
                volume: decimal(&kline.5)?,
            })
        })
        .collect()
}

pub fn resolve_symbol_info(info: BinanceExchangeInfo) -> Result<Vec<SymbolInfo>, AdapterError> {
    info.symbols
        .into_iter()
        .filter(|symbol| symbol.status == "TRADING")
        .filter_map(|symbol| {
            let (token, quote) = decode_pair(&symbol.symbol).ok()?;
            Some((symbol, token, quote))
        })
        .map(|(symbol, token, quote)| {
            let mut tick_size = Decimal::ZERO;
            let mut min_price = Decimal::ZERO;
            let mut max_price = Decimal::MAX;
            let mut lot_step = Decimal::ZERO;
            let mut min_notional = Decimal::ZERO;
            for filter in &symbol.filters {
                match filter {
                    BinanceFilter::Price {
                        tick_size: tick,
                        min_price: min,
                        max_price: max,
                    } => {
                        tick_size = decimal(tick)?;
                        min_price = decimal(min)?;
                        max_price = decimal(max)?;
                    }
                    BinanceFilter::LotSize { step_size } => lot_step = decimal(step_size)?,
                    BinanceFilter::MinNotional { notional } => min_notional = decimal(notional)?,
                    BinanceFilter::Other => {}
                }
            }
            Ok(SymbolInfo {
                pair: symbol.symbol,
                token,
                quote,
                price_precision: symbol.price_precision,
                quantity_precision: symbol.quantity_precision,
                tick_size,
                lot_step,
                min_notional,
                min_price,
                max_price,
            })
        })
        .collect()
}

pub fn resolve_trades(trades: Vec<BinanceUserTrade>) -> Result<Vec<TradeFill>, AdapterError> {
    trades
        .into_iter()
        .map(|trade| {
            Ok(TradeFill {
                exchange_order_id: Some(trade.order_id.to_string()),
                side: if trade.side.eq_ignore_ascii_case("BUY") {
                    Side::Buy
                } else {
                    Side::Sell
                },
                price: decimal(&trade.price)?,
                quantity: decimal(&trade.qty)?,
                time: Utc
                    .timestamp_millis_opt(trade.time)
                    .single()
                    .ok_or_else(|| AdapterError::decode("trade time out of range"))?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn resolves_an_open_limit_order() {
        let order = BinanceOrder {
            order_id: 42,
            client_order_id: Some("escada-1".into()),
            status: "NEW".into(),
            side: Some("BUY".into()),
            price: "98.00".into(),
            orig_qty: "0.312".into(),
            executed_qty: "0".into(),
            avg_price: Some("0".into()),
        };
        let snapshot = resolve_order(order).unwrap();
        assert_eq!(snapshot.exchange_order_id, "42");
        assert_eq!(snapshot.status, CanonicalOrderStatus::New);
        assert_eq!(snapshot.price, dec!(98.00));
        assert_eq!(snapshot.quantity, dec!(0.312));
        assert_eq!(snapshot.average_price, None);
        assert!(!snapshot.is_algo);
    }

    #[test]
    fn resolves_positions_keyed_by_pair_and_direction() {
        let positions = vec![
            BinancePositionRisk {
                symbol: "BTCUSDT".into(),
                position_amt: "0.468".into(),
                entry_price: "98.667".into(),
                leverage: "10".into(),
                unrealized_profit: "0.62".into(),
                position_side: "LONG".into(),
            },
            BinancePositionRisk {
                symbol: "ETHUSDT".into(),
                position_amt: "0".into(),
                entry_price: "0".into(),
                leverage: "10".into(),
                unrealized_profit: "0".into(),
                position_side: "BOTH".into(),
            },
        ];
        let resolved = resolve_positions(positions).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].key, "BTCUSDT:LONG");
        assert_eq!(resolved[0].amount, dec!(0.468));
    }

    #[test]
    fn brackets_come_back_ordered() {
        let response = vec![BinanceSymbolBrackets {
            symbol: "BTCUSDT".into(),
            brackets: vec![
                BinanceBracket {
                    bracket: 2,
                    initial_leverage: 50,
                    notional_floor: dec!(10000),
                    notional_cap: dec!(50000),
                    maint_margin_ratio: dec!(0.01),
                },
                BinanceBracket {
                    bracket: 1,
                    initial_leverage: 75,
                    notional_floor: dec!(0),
                    notional_cap: dec!(10000),
                    maint_margin_ratio: dec!(0.005),
                },
            ],
        }];
        let brackets = resolve_brackets(response).unwrap();
        assert_eq!(brackets[0].bracket, 1);
        assert_eq!(brackets[1].bracket, 2);
    }
}
