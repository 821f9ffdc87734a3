//! Weighted average price over filled legs and PnL projection.

use crate::error::PlannerError;
use escada_markets::decimal::{div_scaled, DEFAULT_SCALE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One filled leg of a position: the market entry or a filled rung.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
pub struct Leg {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl Leg {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Cumulative weighted average price: `Σ(price * qty) / Σ(qty)`.
pub fn weighted_average_price(legs: &[Leg]) -> Result<Decimal, PlannerError> {
    if legs.is_empty() {
        return Err(PlannerError::InvalidInput("no filled legs".into()));
    }
    let mut weighted = Decimal::ZERO;
    let mut quantity = Decimal::ZERO;
    for leg in legs {
        if leg.price <= Decimal::ZERO || leg.quantity <= Decimal::ZERO {
            return Err(PlannerError::InvalidInput(format!(
                "leg must have positive price and quantity, got {} @ {}",
                leg.quantity, leg.price
            )));
        }
        weighted += leg.price * leg.quantity;
        quantity += leg.quantity;
    }
    Ok(div_scaled(weighted, quantity, DEFAULT_SCALE)?)
}

/// PnL of the position at mark `m`: LONG `(m - wap) * Σqty`, SHORT
/// `(wap - m) * Σqty`.
pub fn unrealised_pnl(
    direction: escada_markets::Direction,
    wap: Decimal,
    mark: Decimal,
    quantity: Decimal,
) -> Decimal {
    match direction {
        escada_markets::Direction::Long => (mark - wap) * quantity,
        escada_markets::Direction::Short => (wap - mark) * quantity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escada_markets::Direction;
    use rust_decimal_macros::dec;

    #[test]
    fn wap_after_first_rung_fill() {
        // market 0.156 @ 100, rung 1 fills 0.312 @ 98
        let wap = weighted_average_price(&[
            Leg::new(dec!(100), dec!(0.156)),
            Leg::new(dec!(98), dec!(0.312)),
        ])
        .unwrap();
        // 46.176 / 0.468 = 98.6666...
        assert_eq!(wap.round_dp(3), dec!(98.667));
    }

    #[test]
    fn wap_of_single_leg_is_its_price() {
        let wap = weighted_average_price(&[Leg::new(dec!(100), dec!(0.156))]).unwrap();
        assert_eq!(wap.normalize(), dec!(100));
    }

    #[test]
    fn empty_or_degenerate_legs_are_rejected() {
        assert!(weighted_average_price(&[]).is_err());
        assert!(weighted_average_price(&[Leg::new(dec!(0), dec!(1))]).is_err());
        assert!(weighted_average_price(&[Leg::new(dec!(1), dec!(0))]).is_err());
    }

    #[test]
    fn pnl_signs_follow_direction() {
        assert_eq!(
            unrealised_pnl(Direction::Long, dec!(98.667), dec!(100), dec!(0.468)),
            dec!(0.623844)
        );
        assert_eq!(
            unrealised_pnl(Direction::Short, dec!(98.667), dec!(100), dec!(0.468)),
            dec!(-0.623844)
        );
    }
}
