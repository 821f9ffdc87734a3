//! Canonical request/response shapes shared by every venue variant.
//!
//! The engine depends only on these types; adapters translate to and from
//! venue wire formats at the boundary.

use chrono::{DateTime, Utc};
use escada_markets::{Direction, ExchangeId, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// Canonical order type vocabulary.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum OrderKind {
    Market,
    Limit,
    /// Take-profit placed as a limit order on the exit side.
    ProfitLimit,
    /// Stop-loss placed as a trigger order on the exit side.
    StopMarket,
}

impl OrderKind {
    /// True for order types routed through a venue's algo/conditional
    /// endpoints when the venue has them.
    pub fn is_trigger(&self) -> bool {
        matches!(self, OrderKind::StopMarket)
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderKind::Market => "MARKET",
            OrderKind::Limit => "LIMIT",
            OrderKind::ProfitLimit => "PROFIT-LIMIT",
            OrderKind::StopMarket => "STOP-MARKET",
        };
        write!(f, "{name}")
    }
}

/// Canonical order status vocabulary.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum CanonicalOrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
    Rejected,
    NotFound,
}

impl CanonicalOrderStatus {
    /// Normalize the union of venue status vocabularies.
    pub fn normalize(raw: &str) -> Self {
        match raw.to_uppercase().as_str() {
            "NEW" | "UNTRIGGERED" | "TRIGGERED" | "NOT_TRIGGER" | "LIVE" | "OPEN" | "ACTIVE"
            | "PLACED" | "UNTOUCHED" => CanonicalOrderStatus::New,
            "PARTIALLYFILLED" | "PARTIALLY_FILLED" | "PARTIAL_FILL" | "PARTIALLY-FILLED" => {
                CanonicalOrderStatus::PartiallyFilled
            }
            "FILLED" | "FULLY_EXECUTED" | "DONE" | "CLOSED" => CanonicalOrderStatus::Filled,
            "CANCELLED" | "CANCELED" | "DEACTIVATED" | "PENDING_CANCEL" => {
                CanonicalOrderStatus::Cancelled
            }
            "EXPIRED" => CanonicalOrderStatus::Expired,
            "REJECTED" | "FAILED" => CanonicalOrderStatus::Rejected,
            "NOT_FOUND" | "NOTFOUND" => CanonicalOrderStatus::NotFound,
            _ => CanonicalOrderStatus::NotFound,
        }
    }

    /// Still resting on the venue.
    pub fn is_working(&self) -> bool {
        matches!(
            self,
            CanonicalOrderStatus::New | CanonicalOrderStatus::PartiallyFilled
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CanonicalOrderStatus::Filled
                | CanonicalOrderStatus::Cancelled
                | CanonicalOrderStatus::Expired
                | CanonicalOrderStatus::Rejected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalOrderStatus::New => "NEW",
            CanonicalOrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            CanonicalOrderStatus::Filled => "FILLED",
            CanonicalOrderStatus::Cancelled => "CANCELLED",
            CanonicalOrderStatus::Expired => "EXPIRED",
            CanonicalOrderStatus::Rejected => "REJECTED",
            CanonicalOrderStatus::NotFound => "NOT_FOUND",
        }
    }
}

impl fmt::Display for CanonicalOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical order placement request.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct PlaceOrderRequest {
    pub side: Side,
    pub direction: Direction,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub client_order_id: SmolStr,
    pub reduce_only: bool,
}

/// Acknowledgement of a placement, cancel or modify.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct OrderAck {
    pub exchange_order_id: String,
    pub client_order_id: Option<SmolStr>,
    pub status: CanonicalOrderStatus,
}

/// Canonical view of one order as the venue reports it.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct OrderSnapshot {
    pub exchange_order_id: String,
    pub client_order_id: Option<SmolStr>,
    pub status: CanonicalOrderStatus,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub average_price: Option<Decimal>,
    /// True when the order lives behind the venue's algo endpoints.
    pub is_algo: bool,
}

/// Reference to an existing venue order, with the routing flag for venues
/// whose trigger orders live behind separate endpoints.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct OrderRef {
    pub exchange_order_id: String,
    pub client_order_id: Option<SmolStr>,
    pub is_algo: bool,
}

/// One open position as the venue reports it. `amount` is signed: positive
/// long, negative short.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct ExchangePosition {
    pub key: String,
    pub amount: Decimal,
    pub entry_price: Decimal,
    pub leverage: Option<u32>,
    pub unrealised_pnl: Option<Decimal>,
}

/// Position key: `"<PARSED_PAIR>:<DIRECTION>"` on hedge-mode venues, the
/// pair alone elsewhere.
pub fn position_key(pair: &str, direction: Direction, hedge_mode: bool) -> String {
    if hedge_mode {
        format!("{pair}:{direction}")
    } else {
        pair.to_string()
    }
}

/// Canonical account balance.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct AccountBalance {
    pub wallet: Decimal,
    pub available: Decimal,
    pub cross_wallet: Decimal,
    pub cross_unrealised_pnl: Decimal,
}

/// Canonical candle.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum KlineInterval {
    OneMinute,
    OneHour,
    OneDay,
}

/// One account fill.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct TradeFill {
    pub exchange_order_id: Option<String>,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub time: DateTime<Utc>,
}

/// Symbol metadata as delivered by a venue's exchange-info endpoint.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct SymbolInfo {
    pub pair: String,
    pub token: SmolStr,
    pub quote: SmolStr,
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub tick_size: Decimal,
    pub lot_step: Decimal,
    pub min_notional: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
}

/// Static venue capability flags consumed by workflows.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
pub struct ExchangeCapabilities {
    /// In-place modify of resting non-algo orders.
    pub supports_order_modify: bool,
    /// One cancel-all call per symbol; false forces iterated cancels.
    pub supports_cancel_all_by_symbol: bool,
    /// TP/SL attach to the position (no size on the order).
    pub position_attached_tpsl: bool,
    /// Trigger orders live behind dedicated algo endpoints.
    pub separate_algo_endpoint: bool,
    /// Simultaneous long and short positions per symbol.
    pub hedge_mode: bool,
}

impl ExchangeCapabilities {
    pub fn for_exchange(exchange: ExchangeId) -> Self {
        match exchange {
            ExchangeId::BinanceFutures => Self {
                supports_order_modify: true,
                supports_cancel_all_by_symbol: true,
                position_attached_tpsl: false,
                separate_algo_endpoint: true,
                hedge_mode: true,
            },
            ExchangeId::Bybit => Self {
                supports_order_modify: true,
                supports_cancel_all_by_symbol: true,
                position_attached_tpsl: false,
                separate_algo_endpoint: false,
                hedge_mode: true,
            },
            ExchangeId::Bitget => Self {
                supports_order_modify: true,
                supports_cancel_all_by_symbol: false,
                position_attached_tpsl: true,
                separate_algo_endpoint: true,
                hedge_mode: true,
            },
            ExchangeId::Kucoin => Self {
                supports_order_modify: false,
                supports_cancel_all_by_symbol: true,
                position_attached_tpsl: false,
                separate_algo_endpoint: false,
                hedge_mode: false,
            },
            ExchangeId::Kraken => Self {
                supports_order_modify: true,
                supports_cancel_all_by_symbol: true,
                position_attached_tpsl: false,
                separate_algo_endpoint: false,
                hedge_mode: false,
            },
        }
    }

    /// Whether an order of `kind` is an algo order on this venue.
    pub fn is_algo_order(&self, kind: OrderKind) -> bool {
        match kind {
            OrderKind::StopMarket => self.separate_algo_endpoint || self.position_attached_tpsl,
            OrderKind::ProfitLimit => self.position_attached_tpsl,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_the_full_status_union() {
        for (raw, expected) in [
            ("New", CanonicalOrderStatus::New),
            ("Untriggered", CanonicalOrderStatus::New),
            ("Triggered", CanonicalOrderStatus::New),
            ("PartiallyFilled", CanonicalOrderStatus::PartiallyFilled),
            ("PARTIALLY_FILLED", CanonicalOrderStatus::PartiallyFilled),
            ("Filled", CanonicalOrderStatus::Filled),
            ("Cancelled", CanonicalOrderStatus::Cancelled),
            ("Canceled", CanonicalOrderStatus::Cancelled),
            ("Deactivated", CanonicalOrderStatus::Cancelled),
            ("Rejected", CanonicalOrderStatus::Rejected),
            ("Expired", CanonicalOrderStatus::Expired),
            ("NOT_FOUND", CanonicalOrderStatus::NotFound),
        ] {
            assert_eq!(CanonicalOrderStatus::normalize(raw), expected, "{raw}");
        }
    }

    #[test]
    fn position_keys_follow_hedge_mode() {
        assert_eq!(
            position_key("BTCUSDT", Direction::Long, true),
            "BTCUSDT:LONG"
        );
        assert_eq!(position_key("PF_XBTUSD", Direction::Short, false), "PF_XBTUSD");
    }

    #[test]
    fn bitget_capabilities_reflect_the_divergences() {
        let caps = ExchangeCapabilities::for_exchange(ExchangeId::Bitget);
        assert!(!caps.supports_cancel_all_by_symbol);
        assert!(caps.position_attached_tpsl);
        assert!(caps.is_algo_order(OrderKind::StopMarket));
        assert!(caps.is_algo_order(OrderKind::ProfitLimit));
        assert!(!caps.is_algo_order(OrderKind::Limit));
    }

    #[test]
    fn binance_stop_market_is_algo_profit_limit_is_not() {
        let caps = ExchangeCapabilities::for_exchange(ExchangeId::BinanceFutures);
        assert!(caps.is_algo_order(OrderKind::StopMarket));
        assert!(!caps.is_algo_order(OrderKind::ProfitLimit));
    }
}
