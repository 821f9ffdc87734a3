//! Limit ladder construction.
//!
//! Rung `i` of an `N`-rung ladder sits `i * gap` away from the basis price on
//! the adverse side of the position, with a quantity chained geometrically
//! from the market leg. Prices are clamped to the symbol's bounds, quantities
//! truncated to the symbol's lot constraints; a rung whose formatted quantity
//! truncates to zero is dropped rather than sent to the venue.

use crate::error::PlannerError;
use escada_markets::{
    decimal::notional, format_price, format_quantity, Direction, ExchangeSymbol,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One planned limit order of the ladder, indexed 1..=N.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Rung {
    pub index: u32,
    pub price: Decimal,
    pub quantity: Decimal,
    /// Raw (clamped, unformatted) price times formatted quantity, so rounding
    /// is applied once rather than compounded.
    pub notional: Decimal,
}

/// Non-fatal conditions recorded while constructing a ladder.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub enum PlannerWarning {
    /// The raw rung price fell outside `[min_price, max_price]`.
    PriceClamped { rung: u32 },
    /// The formatted rung quantity truncated to zero; the rung was dropped.
    RungDroppedZeroQty { rung: u32 },
}

/// A constructed ladder plus any warnings produced along the way.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Ladder {
    pub rungs: Vec<Rung>,
    pub warnings: Vec<PlannerWarning>,
}

impl Ladder {
    /// Price of the furthest rung: the stop-loss anchor.
    pub fn anchor_price(&self) -> Option<Decimal> {
        self.rungs.last().map(|rung| rung.price)
    }
}

/// Construct the limit ladder for a position.
///
/// `multipliers_override` and `gap_percent_override` replace the symbol's
/// configured step ratios and gap when present. The last multiplier repeats
/// for rungs past the end of the list.
pub fn calculate_limit_orders_data(
    n: u32,
    direction: Direction,
    reference_price: Decimal,
    market_order_qty: Decimal,
    symbol: &ExchangeSymbol,
    multipliers_override: Option<&[Decimal]>,
    gap_percent_override: Option<Decimal>,
) -> Result<Ladder, PlannerError> {
    if n == 0 {
        return Err(PlannerError::InvalidInput("ladder size must be >= 1".into()));
    }
    if reference_price <= Decimal::ZERO {
        return Err(PlannerError::InvalidInput(format!(
            "reference price must be positive, got {reference_price}"
        )));
    }
    if market_order_qty <= Decimal::ZERO {
        return Err(PlannerError::InvalidInput(format!(
            "market order quantity must be positive, got {market_order_qty}"
        )));
    }

    let multipliers = multipliers_override.unwrap_or(&symbol.limit_quantity_multipliers);
    if multipliers.is_empty() {
        return Err(PlannerError::InvalidInput("multipliers must not be empty".into()));
    }
    if multipliers.iter().any(|multiplier| *multiplier <= Decimal::ZERO) {
        return Err(PlannerError::InvalidInput(
            "multipliers must be strictly positive".into(),
        ));
    }

    let gap_percent = gap_percent_override.unwrap_or(match direction {
        Direction::Long => symbol.percentage_gap_long,
        Direction::Short => symbol.percentage_gap_short,
    });
    let gap = gap_percent / Decimal::ONE_HUNDRED;

    let mut rungs = Vec::with_capacity(n as usize);
    let mut warnings = Vec::new();
    let mut chained_qty = market_order_qty;

    for index in 1..=n {
        let offset = gap * Decimal::from(index);
        let raw_price = match direction {
            Direction::Long => reference_price * (Decimal::ONE - offset),
            Direction::Short => reference_price * (Decimal::ONE + offset),
        };
        let (clamped, was_clamped) = symbol.clamp_price(raw_price);
        if was_clamped {
            warn!(%symbol.parsed_trading_pair, rung = index, %raw_price, "rung price clamped to symbol bounds");
            warnings.push(PlannerWarning::PriceClamped { rung: index });
        }
        let price = format_price(symbol, clamped)?;

        chained_qty *= multiplier_at(multipliers, index - 1);
        let quantity = format_quantity(symbol, chained_qty)?;
        if quantity <= Decimal::ZERO {
            warn!(%symbol.parsed_trading_pair, rung = index, "rung quantity truncated to zero, dropping rung");
            warnings.push(PlannerWarning::RungDroppedZeroQty { rung: index });
            continue;
        }

        rungs.push(Rung {
            index,
            price,
            quantity,
            notional: notional(clamped, quantity),
        });
    }

    Ok(Ladder { rungs, warnings })
}

/// The `i`-th (0-based) step multiplier; the last entry repeats past the end.
pub(crate) fn multiplier_at(multipliers: &[Decimal], index: u32) -> Decimal {
    multipliers
        .get(index as usize)
        .or_else(|| multipliers.last())
        .copied()
        .unwrap_or(Decimal::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leverage::tests::test_symbol;
    use rust_decimal_macros::dec;

    #[test]
    fn builds_the_reference_long_ladder() {
        let symbol = test_symbol();
        let ladder = calculate_limit_orders_data(
            4,
            Direction::Long,
            dec!(100),
            dec!(0.156),
            &symbol,
            None,
            None,
        )
        .unwrap();

        let expected: Vec<(Decimal, Decimal)> = vec![
            (dec!(98), dec!(0.312)),
            (dec!(96), dec!(0.624)),
            (dec!(94), dec!(1.248)),
            (dec!(92), dec!(2.496)),
        ];
        assert_eq!(ladder.rungs.len(), 4);
        for (rung, (price, quantity)) in ladder.rungs.iter().zip(expected) {
            assert_eq!(rung.price, price);
            assert_eq!(rung.quantity, quantity);
        }
        assert!(ladder.warnings.is_empty());
        assert_eq!(ladder.anchor_price(), Some(dec!(92)));
    }

    #[test]
    fn short_ladder_walks_up() {
        let symbol = test_symbol();
        let ladder = calculate_limit_orders_data(
            2,
            Direction::Short,
            dec!(100),
            dec!(0.1),
            &symbol,
            None,
            None,
        )
        .unwrap();
        assert_eq!(ladder.rungs[0].price, dec!(102));
        assert_eq!(ladder.rungs[1].price, dec!(104));
    }

    #[test]
    fn ladder_is_deterministic() {
        let symbol = test_symbol();
        let build = || {
            calculate_limit_orders_data(
                4,
                Direction::Long,
                dec!(123.4567),
                dec!(0.777),
                &symbol,
                None,
                None,
            )
            .unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn short_multiplier_list_repeats_last() {
        let symbol = test_symbol();
        let multipliers = [dec!(2), dec!(3)];
        let ladder = calculate_limit_orders_data(
            4,
            Direction::Long,
            dec!(100),
            dec!(0.1),
            &symbol,
            Some(&multipliers),
            None,
        )
        .unwrap();
        // 0.2, 0.6, 1.8, 5.4
        assert_eq!(ladder.rungs[0].quantity, dec!(0.2));
        assert_eq!(ladder.rungs[1].quantity, dec!(0.6));
        assert_eq!(ladder.rungs[2].quantity, dec!(1.8));
        assert_eq!(ladder.rungs[3].quantity, dec!(5.4));
    }

    #[test]
    fn single_rung_ladder() {
        let symbol = test_symbol();
        let ladder = calculate_limit_orders_data(
            1,
            Direction::Long,
            dec!(100),
            dec!(0.156),
            &symbol,
            None,
            None,
        )
        .unwrap();
        assert_eq!(ladder.rungs.len(), 1);
        assert_eq!(ladder.rungs[0].price, dec!(98));
        assert_eq!(ladder.rungs[0].quantity, dec!(0.312));
    }

    #[test]
    fn clamps_prices_outside_bounds_and_warns() {
        let mut symbol = test_symbol();
        symbol.min_price = dec!(95);
        let ladder = calculate_limit_orders_data(
            4,
            Direction::Long,
            dec!(100),
            dec!(0.156),
            &symbol,
            None,
            None,
        )
        .unwrap();
        // rungs 3 and 4 raw prices 94 and 92 clamp to 95
        assert_eq!(ladder.rungs[2].price, dec!(95));
        assert_eq!(ladder.rungs[3].price, dec!(95));
        assert_eq!(
            ladder.warnings,
            vec![
                PlannerWarning::PriceClamped { rung: 3 },
                PlannerWarning::PriceClamped { rung: 4 },
            ]
        );
        // clamp soundness: every rung inside bounds with positive quantity
        for rung in &ladder.rungs {
            assert!(rung.price >= symbol.min_price && rung.price <= symbol.max_price);
            assert!(rung.quantity > Decimal::ZERO);
        }
    }

    #[test]
    fn drops_rungs_whose_quantity_truncates_to_zero() {
        let mut symbol = test_symbol();
        symbol.quantity_precision = 0;
        symbol.lot_step = dec!(1);
        let ladder = calculate_limit_orders_data(
            3,
            Direction::Long,
            dec!(100),
            dec!(0.3),
            &symbol,
            None,
            None,
        )
        .unwrap();
        // chained raw quantities 0.6, 1.2, 2.4 truncate to 0, 1, 2
        assert_eq!(ladder.rungs.len(), 2);
        assert_eq!(
            ladder.warnings,
            vec![PlannerWarning::RungDroppedZeroQty { rung: 1 }]
        );
        assert_eq!(ladder.rungs[0].quantity, dec!(1));
        assert_eq!(ladder.rungs[1].quantity, dec!(2));
    }

    #[test]
    fn rejects_non_positive_inputs() {
        let symbol = test_symbol();
        assert!(calculate_limit_orders_data(
            4,
            Direction::Long,
            dec!(0),
            dec!(1),
            &symbol,
            None,
            None
        )
        .is_err());
        assert!(calculate_limit_orders_data(
            4,
            Direction::Long,
            dec!(100),
            dec!(0),
            &symbol,
            None,
            None
        )
        .is_err());
        let bad = [dec!(2), dec!(0)];
        assert!(calculate_limit_orders_data(
            4,
            Direction::Long,
            dec!(100),
            dec!(1),
            &symbol,
            Some(&bad),
            None
        )
        .is_err());
    }
}
