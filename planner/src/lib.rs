#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # Planner - Martingale Ladder Numerics
//!
//! The numeric core of the Escada engine. Given an account's balance, a
//! direction, a basis price and a symbol's constraints, the planner computes:
//!
//! - the **limit ladder**: N rungs at progressively worse prices with
//!   geometrically growing quantities ([`calculate_limit_orders_data`])
//! - the **feasible leverage** given the venue's bracket table and a
//!   worst-case full-fill notional ([`plan_unbounded_position`])
//! - the **take-profit price** from the weighted average entry
//!   ([`profit_price`]) and the **stop-loss price** from the last-rung
//!   anchor ([`stop_loss_price`])
//! - the **weighted average price** over filled legs and the PnL projection
//!   at a mark ([`weighted_average_price`], [`unrealised_pnl`])
//!
//! Every function is deterministic: identical inputs produce byte-identical
//! formatted outputs, which the reconciliation layer relies on when comparing
//! intended values against venue state.

/// Defines all possible errors in Planner.
pub mod error;

/// Limit ladder construction.
pub mod ladder;

/// Feasible-leverage selection and full position planning.
pub mod leverage;

/// Take-profit and stop-loss price computation.
pub mod profit;

/// Weighted average price and PnL projection.
pub mod wap;

pub use error::PlannerError;
pub use ladder::{calculate_limit_orders_data, Ladder, PlannerWarning, Rung};
pub use leverage::{
    ladder_divider, plan_unbounded_position, select_feasible_leverage, LeverageSelection,
    MarketLeg, PositionPlan, SelectionReason, DEFAULT_HEADROOM,
};
pub use profit::{profit_price, stop_loss_price};
pub use wap::{unrealised_pnl, weighted_average_price, Leg};
