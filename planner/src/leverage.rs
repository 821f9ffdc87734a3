//! Feasible-leverage selection and full position planning.
//!
//! The planner sizes a position so that the venue would still accept it if
//! every rung of the ladder filled: the bracket search runs against the
//! worst-case full-fill notional (scaled by a configurable headroom), not the
//! market leg alone.

use crate::{
    error::PlannerError,
    ladder::{calculate_limit_orders_data, multiplier_at, Ladder},
};
use escada_markets::{
    bracket_for_notional,
    decimal::{div_scaled, percent_of, DEFAULT_SCALE},
    format_quantity, Direction, ExchangeSymbol,
};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default worst-case headroom: 0.3%.
pub const DEFAULT_HEADROOM: Decimal = Decimal::from_parts(3, 0, 0, false, 3);

/// Why the selection fell back rather than picking a bracket leverage.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
pub enum SelectionReason {
    /// No bracket admitted any leverage; fell back to 1x.
    NoFeasible,
}

/// Outcome of the bracket search.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
pub struct LeverageSelection {
    pub leverage: u32,
    pub reason: Option<SelectionReason>,
}

/// The market entry leg of a planned position.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct MarketLeg {
    pub price: Decimal,
    pub quantity: Decimal,
    pub notional: Decimal,
}

/// A fully planned position: feasible leverage, market leg and limit ladder.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct PositionPlan {
    pub direction: Direction,
    pub reference_price: Decimal,
    pub margin: Decimal,
    pub leverage: u32,
    pub notional: Decimal,
    pub market: MarketLeg,
    pub ladder: Ladder,
    pub leverage_reason: Option<SelectionReason>,
}

/// Worst-case unit-leverage notional `K`: the quote value of margin deployed
/// across the market leg and every rung at 1x, priced at each leg's own
/// (clamped) price.
fn unit_leverage_exposure(
    margin: Decimal,
    direction: Direction,
    reference_price: Decimal,
    symbol: &ExchangeSymbol,
) -> Result<Decimal, PlannerError> {
    let divider = ladder_divider(&symbol.limit_quantity_multipliers, symbol.total_limit_orders);
    let market_notional = div_scaled(margin, divider, DEFAULT_SCALE)?;
    let market_qty = div_scaled(market_notional, reference_price, DEFAULT_SCALE)?;

    let gap = match direction {
        Direction::Long => symbol.percentage_gap_long,
        Direction::Short => symbol.percentage_gap_short,
    } / Decimal::ONE_HUNDRED;

    let mut exposure = market_notional;
    let mut chained_qty = market_qty;
    for index in 1..=symbol.total_limit_orders {
        let offset = gap * Decimal::from(index);
        let raw_price = match direction {
            Direction::Long => reference_price * (Decimal::ONE - offset),
            Direction::Short => reference_price * (Decimal::ONE + offset),
        };
        let (price, _) = symbol.clamp_price(raw_price);
        chained_qty *= multiplier_at(&symbol.limit_quantity_multipliers, index - 1);
        exposure += price * chained_qty;
    }
    Ok(exposure)
}

/// Select the highest leverage any bracket admits for the worst-case
/// full-fill notional, falling back to 1x when no bracket is feasible.
///
/// Bracket edges follow [`bracket_for_notional`]: an implied notional that
/// lands exactly on a shared cap belongs to the next (lower-leverage)
/// bracket, so each candidate leverage steps down until its implied notional
/// actually resolves inside the bracket under consideration.
pub fn select_feasible_leverage(
    margin: Decimal,
    direction: Direction,
    reference_price: Decimal,
    symbol: &ExchangeSymbol,
    requested_cap: u32,
    headroom: Decimal,
) -> Result<LeverageSelection, PlannerError> {
    if margin <= Decimal::ZERO {
        return Err(PlannerError::InvalidInput(format!(
            "margin must be positive, got {margin}"
        )));
    }
    if requested_cap == 0 {
        return Err(PlannerError::InvalidInput("requested leverage cap must be >= 1".into()));
    }

    let exposure = unit_leverage_exposure(margin, direction, reference_price, symbol)?
        * (Decimal::ONE + headroom);

    let mut best: Option<u32> = None;
    for bracket in &symbol.leverage_brackets {
        let min_leverage = div_scaled(bracket.notional_floor, exposure, DEFAULT_SCALE)?
            .ceil()
            .to_u32()
            .unwrap_or(u32::MAX)
            .max(1);
        let mut max_leverage = div_scaled(bracket.notional_cap, exposure, DEFAULT_SCALE)?
            .floor()
            .to_u32()
            .unwrap_or(u32::MAX)
            .min(bracket.initial_leverage)
            .min(requested_cap);

        // a shared cap edge belongs to the next bracket: step down until the
        // implied notional resolves inside this one
        while max_leverage >= min_leverage {
            let implied = Decimal::from(max_leverage) * exposure;
            let owner = bracket_for_notional(&symbol.leverage_brackets, implied);
            if owner.is_some_and(|owner| owner.bracket == bracket.bracket) {
                break;
            }
            max_leverage -= 1;
        }

        if max_leverage >= min_leverage {
            best = Some(best.map_or(max_leverage, |current| current.max(max_leverage)));
        }
    }

    match best {
        Some(leverage) => Ok(LeverageSelection {
            leverage,
            reason: None,
        }),
        None => {
            debug!(%exposure, "no feasible leverage bracket, falling back to 1x");
            Ok(LeverageSelection {
                leverage: 1,
                reason: Some(SelectionReason::NoFeasible),
            })
        }
    }
}

/// Plan a complete position: margin from the account's allocation, feasible
/// leverage from the bracket table, then the market leg and limit ladder.
///
/// `reference_price` falls back to the symbol's mark price; with neither
/// available the plan fails with [`PlannerError::NoBasisPrice`].
pub fn plan_unbounded_position(
    balance: Decimal,
    max_position_percentage: Decimal,
    direction: Direction,
    reference_price: Option<Decimal>,
    symbol: &ExchangeSymbol,
    requested_cap: u32,
    headroom: Decimal,
) -> Result<PositionPlan, PlannerError> {
    let basis = reference_price
        .or(symbol.mark_price)
        .ok_or(PlannerError::NoBasisPrice)?;
    if basis <= Decimal::ZERO {
        return Err(PlannerError::InvalidInput(format!(
            "basis price must be positive, got {basis}"
        )));
    }
    if balance <= Decimal::ZERO {
        return Err(PlannerError::InvalidInput(format!(
            "balance must be positive, got {balance}"
        )));
    }

    let margin = percent_of(balance, max_position_percentage)?;
    let selection =
        select_feasible_leverage(margin, direction, basis, symbol, requested_cap, headroom)?;

    let notional = margin * Decimal::from(selection.leverage);
    let divider = ladder_divider(&symbol.limit_quantity_multipliers, symbol.total_limit_orders);
    let market_notional = div_scaled(notional, divider, DEFAULT_SCALE)?;
    let market_qty = format_quantity(symbol, div_scaled(market_notional, basis, DEFAULT_SCALE)?)?;
    if market_qty <= Decimal::ZERO {
        return Err(PlannerError::InvalidInput(
            "market quantity truncates to zero at this balance".into(),
        ));
    }

    let ladder = calculate_limit_orders_data(
        symbol.total_limit_orders,
        direction,
        basis,
        market_qty,
        symbol,
        None,
        None,
    )?;

    Ok(PositionPlan {
        direction,
        reference_price: basis,
        margin,
        leverage: selection.leverage,
        notional,
        market: MarketLeg {
            price: basis,
            quantity: market_qty,
            notional: basis * market_qty,
        },
        ladder,
        leverage_reason: selection.reason,
    })
}

/// Ratio between the total allocation and the market leg's notional: the
/// market unit, the chained rung weights, and one reserve unit left
/// unallocated so rounding can never push the deployed notional past the
/// allocation. 32 for the default `[2,2,2,2]` ladder (1 + 1 + 2 + 4 + 8 +
/// 16).
pub fn ladder_divider(multipliers: &[Decimal], n: u32) -> Decimal {
    let mut total = Decimal::TWO;
    let mut cumulative = Decimal::ONE;
    for index in 0..n {
        cumulative *= multiplier_at(multipliers, index);
        total += cumulative;
    }
    total
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use escada_markets::{ExchangeId, LeverageBracket};
    use rust_decimal_macros::dec;
    use smol_str::SmolStr;

    pub(crate) fn test_symbol() -> ExchangeSymbol {
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
            leverage_brackets: vec![
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
                LeverageBracket {
                    bracket: 3,
                    initial_leverage: 20,
                    notional_floor: dec!(50000),
                    notional_cap: dec!(1000000),
                    maint_margin_ratio: dec!(0.025),
                },
            ],
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
    fn divider_counts_market_reserve_and_rung_weights() {
        assert_eq!(
            ladder_divider(&ExchangeSymbol::default_multipliers(), 4),
            dec!(32)
        );
        // market + reserve + one doubled rung
        assert_eq!(ladder_divider(&[dec!(2)], 1), dec!(4));
    }

    #[test]
    fn plans_the_reference_long_position() {
        let symbol = test_symbol();
        let plan = plan_unbounded_position(
            dec!(1000),
            dec!(5),
            Direction::Long,
            Some(dec!(100)),
            &symbol,
            10,
            DEFAULT_HEADROOM,
        )
        .unwrap();

        assert_eq!(plan.margin.normalize(), dec!(50));
        assert_eq!(plan.leverage, 10);
        assert_eq!(plan.notional.normalize(), dec!(500));
        assert_eq!(plan.market.quantity, dec!(0.156));
        assert_eq!(plan.ladder.rungs.len(), 4);
        assert_eq!(plan.ladder.rungs[3].price, dec!(92));
        assert_eq!(plan.ladder.rungs[3].quantity, dec!(2.496));
        assert!(plan.leverage_reason.is_none());
    }

    #[test]
    fn falls_back_to_mark_price_basis() {
        let symbol = test_symbol();
        let plan = plan_unbounded_position(
            dec!(1000),
            dec!(5),
            Direction::Long,
            None,
            &symbol,
            10,
            DEFAULT_HEADROOM,
        )
        .unwrap();
        assert_eq!(plan.reference_price, dec!(100));
    }

    #[test]
    fn no_basis_price_is_surfaced() {
        let mut symbol = test_symbol();
        symbol.mark_price = None;
        assert!(matches!(
            plan_unbounded_position(
                dec!(1000),
                dec!(5),
                Direction::Long,
                None,
                &symbol,
                10,
                DEFAULT_HEADROOM,
            ),
            Err(PlannerError::NoBasisPrice)
        ));
    }

    #[test]
    fn bracket_cap_limits_leverage() {
        let mut symbol = test_symbol();
        // worst-case exposure for margin 50 is just under 50; cap 400 admits
        // only 8x before the bracket ceiling bites
        symbol.leverage_brackets = vec![LeverageBracket {
            bracket: 1,
            initial_leverage: 75,
            notional_floor: dec!(0),
            notional_cap: dec!(400),
            maint_margin_ratio: dec!(0.005),
        }];
        let selection = select_feasible_leverage(
            dec!(50),
            Direction::Long,
            dec!(100),
            &symbol,
            75,
            DEFAULT_HEADROOM,
        )
        .unwrap();
        assert_eq!(selection.leverage, 8);
        assert!(selection.reason.is_none());
    }

    #[test]
    fn infeasible_brackets_fall_back_to_1x() {
        let mut symbol = test_symbol();
        // floor far above anything 50 margin can reach at its own cap
        symbol.leverage_brackets = vec![LeverageBracket {
            bracket: 1,
            initial_leverage: 2,
            notional_floor: dec!(1000000),
            notional_cap: dec!(2000000),
            maint_margin_ratio: dec!(0.005),
        }];
        let selection = select_feasible_leverage(
            dec!(50),
            Direction::Long,
            dec!(100),
            &symbol,
            10,
            DEFAULT_HEADROOM,
        )
        .unwrap();
        assert_eq!(selection.leverage, 1);
        assert_eq!(selection.reason, Some(SelectionReason::NoFeasible));
    }

    #[test]
    fn exposure_exactly_on_a_bracket_edge_books_in_the_lower_leverage_bracket() {
        let mut symbol = test_symbol();
        // gap zero and headroom zero make the worst-case exposure exact:
        // margin 3200 over divider 32 deploys 3100 across the legs
        symbol.percentage_gap_long = dec!(0);
        symbol.leverage_brackets = vec![
            LeverageBracket {
                bracket: 1,
                initial_leverage: 75,
                notional_floor: dec!(0),
                notional_cap: dec!(3100),
                maint_margin_ratio: dec!(0.005),
            },
            LeverageBracket {
                bracket: 2,
                initial_leverage: 50,
                notional_floor: dec!(3100),
                notional_cap: dec!(15500),
                maint_margin_ratio: dec!(0.01),
            },
        ];
        let selection = select_feasible_leverage(
            dec!(3200),
            Direction::Long,
            dec!(100),
            &symbol,
            75,
            Decimal::ZERO,
        )
        .unwrap();
        // 1x lands exactly on bracket one's cap: the edge belongs to bracket
        // two, which admits 5x (its own cap is final, hence inclusive)
        assert_eq!(selection.leverage, 5);
        assert!(selection.reason.is_none());
    }

    #[test]
    fn final_bracket_cap_is_inclusive_at_the_edge() {
        let mut symbol = test_symbol();
        symbol.percentage_gap_long = dec!(0);
        symbol.leverage_brackets = vec![LeverageBracket {
            bracket: 1,
            initial_leverage: 75,
            notional_floor: dec!(0),
            notional_cap: dec!(3100),
            maint_margin_ratio: dec!(0.005),
        }];
        let selection = select_feasible_leverage(
            dec!(3200),
            Direction::Long,
            dec!(100),
            &symbol,
            75,
            Decimal::ZERO,
        )
        .unwrap();
        assert_eq!(selection.leverage, 1);
        assert!(selection.reason.is_none());
    }

    #[test]
    fn requested_cap_wins_over_bracket_leverage() {
        let symbol = test_symbol();
        let selection = select_feasible_leverage(
            dec!(50),
            Direction::Long,
            dec!(100),
            &symbol,
            3,
            DEFAULT_HEADROOM,
        )
        .unwrap();
        assert_eq!(selection.leverage, 3);
    }
}
