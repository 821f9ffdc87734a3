//! Trading accounts.

use crate::domain::AccountId;
use escada_exchange::ApiCredentials;
use escada_markets::{Direction, ExchangeId, MarginMode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// One trading account, bound to one venue. Created by an operator;
/// immutable after first use except for the tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub exchange: ExchangeId,
    pub credentials: ApiCredentials,
    /// Quote asset every position on this account trades against.
    pub trading_quote: SmolStr,
    /// Share of the wallet allocated per position, percent.
    pub max_position_percentage: Decimal,
    pub position_leverage_long: u32,
    pub position_leverage_short: u32,
    pub margin_mode: MarginMode,
    /// Stop-loss distance from the ladder anchor, percent.
    pub stop_market_initial_percentage: Decimal,
    /// Take-profit distance from the weighted average entry, percent.
    pub profit_percentage: Decimal,
    /// Filled-rung count at which the high-profit notification fires.
    pub total_limit_orders_filled_to_notify: u32,
    pub can_trade: bool,
}

impl Account {
    /// Requested leverage cap for a direction.
    pub fn leverage_cap(&self, direction: Direction) -> u32 {
        match direction {
            Direction::Long => self.position_leverage_long,
            Direction::Short => self.position_leverage_short,
        }
        .max(1)
    }
}
