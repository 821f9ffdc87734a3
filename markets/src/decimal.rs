//! Decimal helpers used on every money path.
//!
//! Prices, quantities and ratios arrive at the system boundary as decimal
//! strings; [`parse_decimal`] is the single entry point that converts them.
//! Division is always performed at an explicit scale via [`div_scaled`] so
//! that weighted averages and ratios are deterministic across call sites.

use crate::error::MarketError;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Default scale applied to divisions when no explicit scale is requested.
pub const DEFAULT_SCALE: u32 = 16;

/// Parse a decimal string, failing with [`MarketError::InvalidDecimal`] on
/// non-numeric input.
pub fn parse_decimal(input: &str) -> Result<Decimal, MarketError> {
    Decimal::from_str(input.trim()).map_err(|_| MarketError::InvalidDecimal(input.to_string()))
}

/// Divide `numerator / denominator` rounded half-away-from-zero at `scale`
/// fractional digits.
pub fn div_scaled(
    numerator: Decimal,
    denominator: Decimal,
    scale: u32,
) -> Result<Decimal, MarketError> {
    numerator
        .checked_div(denominator)
        .map(|quotient| {
            quotient.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
        })
        .ok_or(MarketError::DivisionByZero(numerator))
}

/// Quote-currency value of an order leg: `price * quantity`.
pub fn notional(price: Decimal, quantity: Decimal) -> Decimal {
    price * quantity
}

/// `value * percentage / 100`, at the default scale.
pub fn percent_of(value: Decimal, percentage: Decimal) -> Result<Decimal, MarketError> {
    div_scaled(value * percentage, Decimal::ONE_HUNDRED, DEFAULT_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_plain_and_scientific_free_strings() {
        assert_eq!(parse_decimal("100.36").unwrap(), dec!(100.36));
        assert_eq!(parse_decimal(" 0.001 ").unwrap(), dec!(0.001));
        assert_eq!(parse_decimal("-42").unwrap(), dec!(-42));
    }

    #[test]
    fn rejects_non_numeric_input() {
        assert!(matches!(
            parse_decimal("12,5"),
            Err(MarketError::InvalidDecimal(_))
        ));
        assert!(parse_decimal("").is_err());
        assert!(parse_decimal("abc").is_err());
    }

    #[test]
    fn div_scaled_rounds_half_away_from_zero() {
        // 1 / 3 at scale 4
        assert_eq!(div_scaled(dec!(1), dec!(3), 4).unwrap(), dec!(0.3333));
        // exact midpoint rounds away from zero
        assert_eq!(div_scaled(dec!(1), dec!(8), 2).unwrap(), dec!(0.13));
    }

    #[test]
    fn div_by_zero_is_an_error() {
        assert!(matches!(
            div_scaled(dec!(1), Decimal::ZERO, 2),
            Err(MarketError::DivisionByZero(_))
        ));
    }

    #[test]
    fn percent_of_scales_by_hundred() {
        assert_eq!(
            percent_of(dec!(1000), dec!(5)).unwrap().normalize(),
            dec!(50)
        );
    }
}
