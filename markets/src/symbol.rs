//! Tradable symbol metadata and the symbol-aware decimal formatter.
//!
//! An [`ExchangeSymbol`] describes one perpetual contract on one venue:
//! precision and step constraints, price bounds, ordered leverage brackets,
//! the ladder step multipliers, and the pump-cooldown tunables.
//!
//! Formatting rules:
//! - prices round half-away-from-zero to `tick_size`, then truncate to
//!   `price_precision`
//! - quantities truncate toward zero to `lot_step` and `quantity_precision`
//!   (a position is never over-sized by rounding)

use crate::{error::MarketError, exchange::ExchangeId};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// One rung of a venue's leverage bracket table, ordered by `bracket`.
///
/// Floors are inclusive, caps exclusive except the final bracket's: a
/// notional sitting exactly on a shared edge resolves to the higher-numbered
/// bracket and therefore books at the lower leverage. See
/// [`bracket_for_notional`].
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct LeverageBracket {
    pub bracket: u32,
    pub initial_leverage: u32,
    pub notional_floor: Decimal,
    pub notional_cap: Decimal,
    pub maint_margin_ratio: Decimal,
}

/// Resolve the bracket a notional belongs to.
///
/// Floors are inclusive and caps exclusive, except for the final bracket
/// whose cap is inclusive; a notional exactly on a shared edge lands in the
/// higher-numbered (lower-leverage) bracket. Returns `None` for an empty
/// table or a notional beyond the final cap.
pub fn bracket_for_notional(
    brackets: &[LeverageBracket],
    notional: Decimal,
) -> Option<&LeverageBracket> {
    let last = brackets.len().checked_sub(1)?;
    brackets.iter().enumerate().find_map(|(index, bracket)| {
        let below_cap = notional < bracket.notional_cap
            || (index == last && notional == bracket.notional_cap);
        (notional >= bracket.notional_floor && below_cap).then_some(bracket)
    })
}

/// Stable identity of a tradable contract: venue plus canonical (token, quote).
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct SymbolKey {
    pub exchange: ExchangeId,
    pub token: SmolStr,
    pub quote: SmolStr,
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}", self.exchange, self.token, self.quote)
    }
}

/// A tradable perpetual contract on one venue.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExchangeSymbol {
    pub exchange: ExchangeId,
    /// Base token, canonical upper-case (eg/ "BTC").
    pub token: SmolStr,
    /// Quote asset, canonical upper-case (eg/ "USDT").
    pub quote: SmolStr,
    /// Exchange-specific wire encoding of the pair (eg/ "BTCUSDT", "XBTUSDTM").
    pub parsed_trading_pair: SmolStr,
    /// Fractional digits kept on formatted prices.
    pub price_precision: u32,
    /// Fractional digits kept on formatted quantities.
    pub quantity_precision: u32,
    /// Minimum price increment.
    pub tick_size: Decimal,
    /// Minimum quantity increment (lot step).
    pub lot_step: Decimal,
    /// Minimum order notional accepted by the venue.
    pub min_notional: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    /// Ordered leverage bracket table, lowest bracket first.
    pub leverage_brackets: Vec<LeverageBracket>,
    /// Ladder step ratios; the last multiplier repeats past the end.
    pub limit_quantity_multipliers: Vec<Decimal>,
    pub percentage_gap_long: Decimal,
    pub percentage_gap_short: Decimal,
    /// Daily price change (percent) above which the symbol is cooled down.
    pub disable_on_price_spike_percentage: Decimal,
    pub price_spike_cooldown_hours: i64,
    /// Advisory re-entry gate; opening a position re-checks it atomically.
    pub tradeable_at: Option<DateTime<Utc>>,
    pub mark_price: Option<Decimal>,
    pub mark_price_synced_at: Option<DateTime<Utc>>,
    pub has_stale_price: bool,
    /// Number of ladder rungs placed per position.
    pub total_limit_orders: u32,
}

impl ExchangeSymbol {
    /// Default ladder step ratios.
    pub fn default_multipliers() -> Vec<Decimal> {
        vec![
            Decimal::TWO,
            Decimal::TWO,
            Decimal::TWO,
            Decimal::TWO,
        ]
    }

    pub fn key(&self) -> SymbolKey {
        SymbolKey {
            exchange: self.exchange,
            token: self.token.clone(),
            quote: self.quote.clone(),
        }
    }

    /// True once `tradeable_at` has passed (or was never set).
    pub fn is_tradeable(&self, now: DateTime<Utc>) -> bool {
        self.tradeable_at.map(|at| at <= now).unwrap_or(true)
    }

    /// Clamp a raw price into `[min_price, max_price]`, reporting whether
    /// clamping occurred.
    pub fn clamp_price(&self, raw: Decimal) -> (Decimal, bool) {
        if raw < self.min_price {
            (self.min_price, true)
        } else if raw > self.max_price {
            (self.max_price, true)
        } else {
            (raw, false)
        }
    }
}

/// Round `raw` to the symbol's tick size (half-away-from-zero), then truncate
/// to its price precision.
pub fn format_price(symbol: &ExchangeSymbol, raw: Decimal) -> Result<Decimal, MarketError> {
    if raw <= Decimal::ZERO {
        return Err(MarketError::NonPositivePrice(raw));
    }
    let ticked = if symbol.tick_size > Decimal::ZERO {
        let steps = (raw / symbol.tick_size)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        steps * symbol.tick_size
    } else {
        raw
    };
    Ok(ticked.trunc_with_scale(symbol.price_precision).normalize())
}

/// Truncate `raw` toward zero to the symbol's lot step and quantity precision.
///
/// Unlike prices, quantities are never rounded up: over-sizing a position is
/// worse than leaving residual balance unused.
pub fn format_quantity(symbol: &ExchangeSymbol, raw: Decimal) -> Result<Decimal, MarketError> {
    if raw < Decimal::ZERO {
        return Err(MarketError::NonPositiveQuantity(raw));
    }
    let stepped = if symbol.lot_step > Decimal::ZERO {
        let steps = (raw / symbol.lot_step).trunc();
        steps * symbol.lot_step
    } else {
        raw
    };
    Ok(stepped
        .trunc_with_scale(symbol.quantity_precision)
        .normalize())
}

/// Quote assets recognised when decoding venue pair encodings.
const KNOWN_QUOTES: [&str; 7] = ["USDT", "USDC", "BUSD", "USD", "BTC", "ETH", "EUR"];

/// Decode a venue pair encoding such as `"BTCUSDT"` into `(token, quote)`.
///
/// A trailing `M` contract marker (KuCoin style, eg/ `"XBTUSDTM"`) is ignored.
pub fn decode_pair(pair: &str) -> Result<(SmolStr, SmolStr), MarketError> {
    let upper = pair.to_uppercase();
    let trimmed = upper.strip_suffix('M').filter(|rest| {
        KNOWN_QUOTES
            .iter()
            .any(|quote| rest.ends_with(quote))
    });
    let candidate = trimmed.unwrap_or(&upper);

    for quote in KNOWN_QUOTES {
        if let Some(token) = candidate.strip_suffix(quote) {
            if !token.is_empty() {
                return Ok((SmolStr::new(token), SmolStr::new(quote)));
            }
        }
    }
    Err(MarketError::UnknownPair(pair.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn symbol() -> ExchangeSymbol {
        ExchangeSymbol {
            exchange: ExchangeId::BinanceFutures,
            token: SmolStr::new("BTC"),
            quote: SmolStr::new("USDT"),
            parsed_trading_pair: SmolStr::new("BTCUSDT"),
            price_precision: 2,
            quantity_precision: 3,
            tick_size: dec!(0.01),
            lot_step: dec!(0.001),
            min_notional: dec!(5),
            min_price: dec!(0.01),
            max_price: dec!(1000000),
            leverage_brackets: Vec::new(),
            limit_quantity_multipliers: ExchangeSymbol::default_multipliers(),
            percentage_gap_long: dec!(2),
            percentage_gap_short: dec!(2),
            disable_on_price_spike_percentage: dec!(10),
            price_spike_cooldown_hours: 12,
            tradeable_at: None,
            mark_price: Some(dec!(100)),
            mark_price_synced_at: None,
            has_stale_price: false,
            total_limit_orders: 4,
        }
    }

    #[test]
    fn price_rounds_half_away_from_zero_to_tick() {
        let symbol = symbol();
        assert_eq!(format_price(&symbol, dec!(98.005)).unwrap(), dec!(98.01));
        assert_eq!(format_price(&symbol, dec!(98.004)).unwrap(), dec!(98));
        assert_eq!(format_price(&symbol, dec!(92)).unwrap(), dec!(92));
    }

    #[test]
    fn quantity_truncates_toward_zero() {
        let symbol = symbol();
        assert_eq!(format_quantity(&symbol, dec!(0.15625)).unwrap(), dec!(0.156));
        assert_eq!(format_quantity(&symbol, dec!(0.0009)).unwrap(), dec!(0));
        assert_eq!(format_quantity(&symbol, dec!(2.4969)).unwrap(), dec!(2.496));
    }

    #[test]
    fn non_positive_price_is_rejected() {
        let symbol = symbol();
        assert!(format_price(&symbol, dec!(0)).is_err());
        assert!(format_price(&symbol, dec!(-1)).is_err());
    }

    #[test]
    fn clamp_reports_when_bounds_hit() {
        let symbol = symbol();
        assert_eq!(symbol.clamp_price(dec!(50)), (dec!(50), false));
        assert_eq!(symbol.clamp_price(dec!(0.001)), (dec!(0.01), true));
        assert_eq!(symbol.clamp_price(dec!(2000000)), (dec!(1000000), true));
    }

    #[test]
    fn decodes_wire_pairs() {
        assert_eq!(
            decode_pair("BTCUSDT").unwrap(),
            (SmolStr::new("BTC"), SmolStr::new("USDT"))
        );
        assert_eq!(
            decode_pair("XBTUSDTM").unwrap(),
            (SmolStr::new("XBT"), SmolStr::new("USDT"))
        );
        assert_eq!(
            decode_pair("ETHBTC").unwrap(),
            (SmolStr::new("ETH"), SmolStr::new("BTC"))
        );
        assert!(decode_pair("USDT").is_err());
        assert!(decode_pair("???").is_err());
    }

    #[test]
    fn bracket_edges_resolve_to_the_lower_leverage_bracket() {
        let brackets = vec![
            LeverageBracket {
                bracket: 1,
                initial_leverage: 75,
                notional_floor: dec!(0),
                notional_cap: dec!(10000),
                maint_margin_ratio: dec!(0.005),
            },
            LeverageBracket {
                bracket: 2,
                initial_leverage: 50,
                notional_floor: dec!(10000),
                notional_cap: dec!(50000),
                maint_margin_ratio: dec!(0.01),
            },
        ];
        assert_eq!(
            bracket_for_notional(&brackets, dec!(9999.99)).unwrap().bracket,
            1
        );
        // exactly on the shared edge: the lower-leverage bracket owns it
        assert_eq!(
            bracket_for_notional(&brackets, dec!(10000)).unwrap().bracket,
            2
        );
        // the final cap is inclusive; beyond it nothing matches
        assert_eq!(
            bracket_for_notional(&brackets, dec!(50000)).unwrap().bracket,
            2
        );
        assert!(bracket_for_notional(&brackets, dec!(50000.01)).is_none());
        assert!(bracket_for_notional(&[], dec!(1)).is_none());
    }

    #[test]
    fn tradeable_gate_honours_cooldown() {
        let mut symbol = symbol();
        let now = Utc::now();
        assert!(symbol.is_tradeable(now));
        symbol.tradeable_at = Some(now + chrono::Duration::hours(6));
        assert!(!symbol.is_tradeable(now));
        assert!(symbol.is_tradeable(now + chrono::Duration::hours(7)));
    }
}
