//! BitGet v2 mix wire models and canonical resolvers.

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

/// Envelope every v2 endpoint responds with; `"00000"` is success.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BitgetResponse<T> {
    pub code: String,
    pub msg: String,
    pub data: Option<T>,
}

impl<T> BitgetResponse<T>
where
    T: DeserializeOwned,
{
    pub fn into_result(self) -> Result<T, AdapterError> {
        if self.code != "00000" {
            let code = self.code.parse().unwrap_or(-1);
            return Err(AdapterError::Venue {
                code,
                message: self.msg,
            });
        }
        self.data
            .ok_or_else(|| AdapterError::decode("missing data payload"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitgetServerTime {
    #[serde(rename = "serverTime")]
    pub server_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitgetContract {
    pub symbol: String,
    #[serde(rename = "symbolStatus")]
    pub symbol_status: String,
    #[serde(rename = "pricePlace")]
    pub price_place: String,
    #[serde(rename = "volumePlace")]
    pub volume_place: String,
    #[serde(rename = "priceEndStep")]
    pub price_end_step: String,
    #[serde(rename = "sizeMultiplier")]
    pub size_multiplier: String,
    #[serde(rename = "minTradeUSDT", default)]
    pub min_trade_usdt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitgetTicker {
    pub symbol: String,
    #[serde(rename = "markPrice")]
    pub mark_price: String,
}

/// Candle tuple: ts, open, high, low, close, base volume, quote volume.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitgetCandle(
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitgetPositionTier {
    pub level: String,
    #[serde(rename = "startUnit")]
    pub start_unit: String,
    #[serde(rename = "endUnit")]
    pub end_unit: String,
    pub leverage: String,
    #[serde(rename = "keepMarginRate")]
    pub keep_margin_rate: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitgetAccount {
    #[serde(rename = "marginCoin")]
    pub margin_coin: String,
    pub available: String,
    #[serde(rename = "accountEquity")]
    pub account_equity: String,
    #[serde(rename = "crossedMaxAvailable", default)]
    pub crossed_max_available: Option<String>,
    #[serde(rename = "unrealizedPL")]
    pub unrealized_pl: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitgetPosition {
    pub symbol: String,
    #[serde(rename = "holdSide")]
    pub hold_side: String,
    pub total: String,
    #[serde(rename = "openPriceAvg")]
    pub open_price_avg: String,
    pub leverage: String,
    #[serde(rename = "unrealizedPL")]
    pub unrealized_pl: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitgetPendingOrders {
    #[serde(rename = "entrustedList", default)]
    pub entrusted_list: Option<Vec<BitgetOrder>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitgetPendingPlanOrders {
    #[serde(rename = "entrustedList", default)]
    pub entrusted_list: Option<Vec<BitgetPlanOrder>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitgetOrder {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "clientOid")]
    pub client_oid: Option<String>,
    pub status: String,
    #[serde(rename = "price", default)]
    pub price: Option<String>,
    pub size: String,
    #[serde(rename = "baseVolume", default)]
    pub base_volume: Option<String>,
    #[serde(rename = "priceAvg", default)]
    pub price_avg: Option<String>,
}

/// Plan (trigger) orders come back from the plan endpoints; TP/SL plans are
/// position-attached and carry no size.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitgetPlanOrder {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "clientOid")]
    pub client_oid: Option<String>,
    #[serde(rename = "planStatus")]
    pub plan_status: String,
    #[serde(rename = "triggerPrice")]
    pub trigger_price: String,
    #[serde(rename = "size", default)]
    pub size: Option<String>,
    #[serde(rename = "planType")]
    pub plan_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitgetOrderAck {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "clientOid")]
    pub client_oid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitgetFills {
    #[serde(rename = "fillList", default)]
    pub fill_list: Option<Vec<BitgetFill>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BitgetFill {
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub side: String,
    pub price: String,
    #[serde(rename = "baseVolume")]
    pub base_volume: String,
    #[serde(rename = "cTime")]
    pub c_time: String,
}

fn decimal(raw: &str) -> Result<Decimal, AdapterError> {
    parse_decimal(raw).map_err(|error| AdapterError::decode(error.to_string()))
}

pub fn resolve_order(order: BitgetOrder) -> Result<OrderSnapshot, AdapterError> {
    Ok(OrderSnapshot {
        exchange_order_id: order.order_id,
        client_order_id: order.client_oid.map(SmolStr::new),
        status: CanonicalOrderStatus::normalize(&order.status),
        price: order
            .price
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(decimal)
            .transpose()?
            .unwrap_or(Decimal::ZERO),
        quantity: decimal(&order.size)?,
        filled_quantity: order
            .base_volume
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(decimal)
            .transpose()?
            .unwrap_or(Decimal::ZERO),
        average_price: order
            .price_avg
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(decimal)
            .transpose()?
            .filter(|price| !price.is_zero()),
        is_algo: false,
    })
}

/// Plan orders resolve with zero quantity when position-attached.
pub fn resolve_plan_order(order: BitgetPlanOrder) -> Result<OrderSnapshot, AdapterError> {
    Ok(OrderSnapshot {
        exchange_order_id: order.order_id,
        client_order_id: order.client_oid.map(SmolStr::new),
        status: CanonicalOrderStatus::normalize(&order.plan_status),
        price: decimal(&order.trigger_price)?,
        quantity: order
            .size
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(decimal)
            .transpose()?
            .unwrap_or(Decimal::ZERO),
        filled_quantity: Decimal::ZERO,
        average_price: None,
        is_algo: true,
    })
}

pub fn resolve_ack(ack: BitgetOrderAck) -> OrderAck {
    OrderAck {
        exchange_order_id: ack.order_id,
        client_order_id: ack.client_oid.map(SmolStr::new),
        status: CanonicalOrderStatus::New,
    }
}

pub fn resolve_balance(account: BitgetAccount) -> Result<AccountBalance, AdapterError> {
    let equity = decimal(&account.account_equity)?;
    Ok(AccountBalance {
        wallet: equity,
        available: decimal(&account.available)?,
        cross_wallet: account
            .crossed_max_available
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(decimal)
            .transpose()?
            .unwrap_or(equity),
        cross_unrealised_pnl: decimal(&account.unrealized_pl)?,
    })
}

pub fn resolve_positions(
    positions: Vec<BitgetPosition>,
) -> Result<Vec<ExchangePosition>, AdapterError> {
    positions
        .into_iter()
        .filter(|position| !position.total.is_empty() && position.total != "0")
        .map(|position| {
            let size = decimal(&position.total)?;
            let direction = match position.hold_side.as_str() {
                "long" => Direction::Long,
                _ => Direction::Short,
            };
            let amount = match direction {
                Direction::Long => size,
                Direction::Short => -size,
            };
            Ok(ExchangePosition {
                key: position_key(&position.symbol, direction, true),
                amount,
                entry_price: decimal(&position.open_price_avg)?,
                leverage: decimal(&position.leverage)?.to_u32(),
                unrealised_pnl: Some(decimal(&position.unrealized_pl)?),
            })
        })
        .collect()
}

pub fn resolve_brackets(
    tiers: Vec<BitgetPositionTier>,
) -> Result<Vec<LeverageBracket>, AdapterError> {
    let mut brackets: Vec<LeverageBracket> = tiers
        .into_iter()
        .map(|tier| {
            Ok(LeverageBracket {
                bracket: tier
                    .level
                    .parse()
                    .map_err(|_| AdapterError::decode("tier level"))?,
                initial_leverage: decimal(&tier.leverage)?
                    .floor()
                    .to_u32()
                    .ok_or_else(|| AdapterError::decode("tier leverage out of range"))?,
                notional_floor: decimal(&tier.start_unit)?,
                notional_cap: decimal(&tier.end_unit)?,
                maint_margin_ratio: decimal(&tier.keep_margin_rate)?,
            })
        })
        .collect::<Result<_, AdapterError>>()?;
    brackets.sort_by_key(|bracket| bracket.bracket);
    Ok(brackets)
}

pub fn resolve_candles(mut candles: Vec<BitgetCandle>) -> Result<Vec<Kline>, AdapterError> {
    candles.sort_by(|a, b| a.0.cmp(&b.0));
    candles
        .into_iter()
        .map(|candle| {
            let ts: i64 = candle
                .0
                .parse()
                .map_err(|_| AdapterError::decode("candle timestamp"))?;
            Ok(Kline {
                open_time: Utc
                    .timestamp_millis_opt(ts)
                    .single()
                    .ok_or_else(|| AdapterError::decode("candle timestamp out of range"))?,
                open: decimal(&candle.1)?,
                high: decimal(&candle.2)?,
                low: decimal(&candle.3)?,
                close: decimal(&candle.4)?,
                volume: decimal(&candle.5)?,
            })
        })
        .collect()
}

pub fn resolve_symbol_info(
    contracts: Vec<BitgetContract>,
) -> Result<Vec<SymbolInfo>, AdapterError> {
    contracts
        .into_iter()
        .filter(|contract| contract.symbol_status == "normal")
        .filter_map(|contract| {
            let (token, quote) = decode_pair(&contract.symbol).ok()?;
            Some((contract, token, quote))
        })
        .map(|(contract, token, quote)| {
            let price_precision: u32 = contract
                .price_place
                .parse()
                .map_err(|_| AdapterError::decode("pricePlace"))?;
            let quantity_precision: u32 = contract
                .volume_place
                .parse()
                .map_err(|_| AdapterError::decode("volumePlace"))?;
            // tick = priceEndStep scaled into the price precision
            let end_step = decimal(&contract.price_end_step)?;
            let tick_size = end_step
                * Decimal::new(1, price_precision);
            Ok(SymbolInfo {
                pair: contract.symbol,
                token,
                quote,
                price_precision,
                quantity_precision,
                tick_size,
                lot_step: decimal(&contract.size_multiplier)?,
                min_notional: contract
                    .min_trade_usdt
                    .as_deref()
                    .filter(|raw| !raw.is_empty())
                    .map(decimal)
                    .transpose()?
                    .unwrap_or(Decimal::ZERO),
                min_price: Decimal::ZERO,
                max_price: Decimal::MAX,
            })
        })
        .collect()
}

pub fn resolve_fills(fills: Vec<BitgetFill>) -> Result<Vec<TradeFill>, AdapterError> {
    fills
        .into_iter()
        .map(|fill| {
            let ts: i64 = fill
                .c_time
                .parse()
                .map_err(|_| AdapterError::decode("fill time"))?;
            Ok(TradeFill {
                exchange_order_id: Some(fill.order_id),
                side: if fill.side == "buy" {
                    Side::Buy
                } else {
                    Side::Sell
                },
                price: decimal(&fill.price)?,
                quantity: decimal(&fill.base_volume)?,
                time: Utc
                    .timestamp_millis_opt(ts)
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
    fn error_codes_surface_as_venue_errors() {
        let response: BitgetResponse<BitgetServerTime> = BitgetResponse {
            code: "40034".into(),
            msg: "param error".into(),
            data: None,
        };
        assert!(matches!(
            response.into_result(),
            Err(AdapterError::Venue { code: 40034, .. })
        ));
    }

    #[test]
    fn position_attached_plan_resolves_with_zero_quantity() {
        let plan = BitgetPlanOrder {
            order_id: "777".into(),
            client_oid: None,
            plan_status: "live".into(),
            trigger_price: "84.64".into(),
            size: None,
            plan_type: "loss_plan".into(),
        };
        let snapshot = resolve_plan_order(plan).unwrap();
        assert_eq!(snapshot.status, CanonicalOrderStatus::New);
        assert_eq!(snapshot.quantity, dec!(0));
        assert_eq!(snapshot.price, dec!(84.64));
        assert!(snapshot.is_algo);
    }
}
