//! Take-profit and stop-loss price computation.

use crate::error::PlannerError;
use escada_markets::{format_price, Direction, ExchangeSymbol};
use rust_decimal::Decimal;

/// Take-profit price from the weighted average entry.
///
/// LONG: `wap * (1 + p)`; SHORT: `wap * (1 - p)` with `p` the profit
/// percentage over 100. When `mark` is provided and the computed target lies
/// on the wrong side of it (it would fill immediately), the target is
/// re-anchored to the mark instead. The result is clamped to the symbol's
/// price bounds and tick-formatted.
pub fn profit_price(
    direction: Direction,
    wap: Decimal,
    profit_percentage: Decimal,
    mark: Option<Decimal>,
    symbol: &ExchangeSymbol,
) -> Result<Decimal, PlannerError> {
    if wap <= Decimal::ZERO {
        return Err(PlannerError::InvalidInput(format!(
            "weighted average price must be positive, got {wap}"
        )));
    }
    if profit_percentage <= Decimal::ZERO {
        return Err(PlannerError::InvalidInput(format!(
            "profit percentage must be positive, got {profit_percentage}"
        )));
    }

    let p = profit_percentage / Decimal::ONE_HUNDRED;
    let from = |anchor: Decimal| match direction {
        Direction::Long => anchor * (Decimal::ONE + p),
        Direction::Short => anchor * (Decimal::ONE - p),
    };

    let mut target = from(wap);
    if let Some(mark) = mark {
        let wrong_side = match direction {
            Direction::Long => target <= mark,
            Direction::Short => target >= mark,
        };
        if wrong_side {
            target = from(mark);
        }
    }

    let (clamped, _) = symbol.clamp_price(target);
    Ok(format_price(symbol, clamped)?)
}

/// Stop-loss price from the ladder anchor (the furthest rung's price).
///
/// LONG: `anchor * (1 - s)`; SHORT: `anchor * (1 + s)` with `s` the stop
/// percentage over 100. Clamped and tick-formatted.
pub fn stop_loss_price(
    direction: Direction,
    anchor: Decimal,
    stop_percentage: Decimal,
    symbol: &ExchangeSymbol,
) -> Result<Decimal, PlannerError> {
    if anchor <= Decimal::ZERO {
        return Err(PlannerError::InvalidInput(format!(
            "stop anchor must be positive, got {anchor}"
        )));
    }
    if stop_percentage <= Decimal::ZERO {
        return Err(PlannerError::InvalidInput(format!(
            "stop percentage must be positive, got {stop_percentage}"
        )));
    }

    let s = stop_percentage / Decimal::ONE_HUNDRED;
    let raw = match direction {
        Direction::Long => anchor * (Decimal::ONE - s),
        Direction::Short => anchor * (Decimal::ONE + s),
    };
    let (clamped, _) = symbol.clamp_price(raw);
    Ok(format_price(symbol, clamped)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leverage::tests::test_symbol;
    use rust_decimal_macros::dec;

    #[test]
    fn long_profit_price_from_opening() {
        let symbol = test_symbol();
        let tp = profit_price(Direction::Long, dec!(100), dec!(0.36), None, &symbol).unwrap();
        assert_eq!(tp, dec!(100.36));
    }

    #[test]
    fn short_profit_price_walks_down() {
        let symbol = test_symbol();
        let tp = profit_price(Direction::Short, dec!(100), dec!(0.36), None, &symbol).unwrap();
        assert_eq!(tp, dec!(99.64));
    }

    #[test]
    fn reanchors_to_mark_when_target_would_fill_immediately() {
        let symbol = test_symbol();
        // LONG target 100.36 but mark already ran to 105: re-anchor
        let tp = profit_price(
            Direction::Long,
            dec!(100),
            dec!(0.36),
            Some(dec!(105)),
            &symbol,
        )
        .unwrap();
        // 105 * 1.0036 = 105.378, ticked to 105.38
        assert_eq!(tp, dec!(105.38));
    }

    #[test]
    fn mark_on_the_right_side_leaves_target_untouched() {
        let symbol = test_symbol();
        let tp = profit_price(
            Direction::Long,
            dec!(100),
            dec!(0.36),
            Some(dec!(99)),
            &symbol,
        )
        .unwrap();
        assert_eq!(tp, dec!(100.36));
    }

    #[test]
    fn stop_loss_anchored_to_last_rung() {
        let symbol = test_symbol();
        let sl = stop_loss_price(Direction::Long, dec!(92), dec!(8), &symbol).unwrap();
        assert_eq!(sl, dec!(84.64));
        let sl = stop_loss_price(Direction::Short, dec!(108), dec!(8), &symbol).unwrap();
        assert_eq!(sl, dec!(116.64));
    }

    #[test]
    fn rejects_non_positive_inputs() {
        let symbol = test_symbol();
        assert!(profit_price(Direction::Long, dec!(0), dec!(0.36), None, &symbol).is_err());
        assert!(profit_price(Direction::Long, dec!(100), dec!(0), None, &symbol).is_err());
        assert!(stop_loss_price(Direction::Long, dec!(0), dec!(8), &symbol).is_err());
    }
}
