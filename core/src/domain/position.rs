//! Positions and the lifecycle state machine.
//!
//! The transition methods below are the only permitted mutators of
//! `Position::status`. Each checks the source state and records timestamps
//! where appropriate; terminal states (`Closed`, `Cancelled`, `Failed`) are
//! never left.
//!
//! ```text
//! new -> opening -> active <-> syncing
//!                    |           |
//!                  waping  ->  active
//!                    |
//!                 watching ->  active
//! active|waping|watching|replacing -> closing -> closed
//! any non-terminal                 -> cancelling -> cancelled
//! any non-terminal                 -> failed
//! ```

use crate::domain::{AccountId, PositionId};
use chrono::{DateTime, Utc};
use escada_markets::{Direction, SymbolKey};
use escada_planner::PositionPlan;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    New,
    Opening,
    Active,
    Syncing,
    Waping,
    Watching,
    Replacing,
    Closing,
    Closed,
    Cancelling,
    Cancelled,
    Failed,
}

impl PositionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PositionStatus::Closed | PositionStatus::Cancelled | PositionStatus::Failed
        )
    }

    /// Orders may be placed or modified.
    pub fn allows_order_mutation(&self) -> bool {
        matches!(
            self,
            PositionStatus::Opening
                | PositionStatus::Active
                | PositionStatus::Syncing
                | PositionStatus::Waping
                | PositionStatus::Watching
                | PositionStatus::Replacing
        )
    }

    /// Sync workflows may run.
    pub fn is_opened(&self) -> bool {
        matches!(
            self,
            PositionStatus::Active
                | PositionStatus::Syncing
                | PositionStatus::Waping
                | PositionStatus::Watching
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::New => "new",
            PositionStatus::Opening => "opening",
            PositionStatus::Active => "active",
            PositionStatus::Syncing => "syncing",
            PositionStatus::Waping => "waping",
            PositionStatus::Watching => "watching",
            PositionStatus::Replacing => "replacing",
            PositionStatus::Closing => "closing",
            PositionStatus::Closed => "closed",
            PositionStatus::Cancelling => "cancelling",
            PositionStatus::Cancelled => "cancelled",
            PositionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected status transition.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize, Error)]
#[error("illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub from: PositionStatus,
    pub to: PositionStatus,
}

/// One leveraged perpetual-futures position.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Position {
    pub id: PositionId,
    pub account_id: AccountId,
    pub symbol: SymbolKey,
    pub direction: Direction,
    pub status: PositionStatus,
    pub margin: Decimal,
    pub leverage: u32,
    pub quantity: Decimal,
    pub opening_price: Option<Decimal>,
    pub closing_price: Option<Decimal>,
    pub profit_percentage: Decimal,
    pub total_limit_orders: u32,
    pub first_profit_price: Option<Decimal>,
    pub opened_at: Option<DateTime<Utc>>,
    pub waped_at: Option<DateTime<Utc>>,
    pub was_waped: bool,
    pub was_fast_traded: bool,
    pub error_message: Option<String>,
    /// The planner's output, persisted at determine-leverage time so later
    /// steps replay deterministically.
    pub plan: Option<PositionPlan>,
    pub created_at: DateTime<Utc>,
}

impl Position {
    pub fn new(
        id: PositionId,
        account_id: AccountId,
        symbol: SymbolKey,
        direction: Direction,
        profit_percentage: Decimal,
        total_limit_orders: u32,
    ) -> Self {
        Self {
            id,
            account_id,
            symbol,
            direction,
            status: PositionStatus::New,
            margin: Decimal::ZERO,
            leverage: 1,
            quantity: Decimal::ZERO,
            opening_price: None,
            closing_price: None,
            profit_percentage,
            total_limit_orders,
            first_profit_price: None,
            opened_at: None,
            waped_at: None,
            was_waped: false,
            was_fast_traded: false,
            error_message: None,
            plan: None,
            created_at: Utc::now(),
        }
    }

    fn transition(
        &mut self,
        allowed: &[PositionStatus],
        to: PositionStatus,
    ) -> Result<(), TransitionError> {
        if allowed.contains(&self.status) {
            self.status = to;
            Ok(())
        } else {
            Err(TransitionError {
                from: self.status,
                to,
            })
        }
    }

    pub fn mark_opening(&mut self) -> Result<(), TransitionError> {
        self.transition(&[PositionStatus::New], PositionStatus::Opening)
    }

    pub fn mark_active(&mut self) -> Result<(), TransitionError> {
        self.transition(
            &[
                PositionStatus::Opening,
                PositionStatus::Syncing,
                PositionStatus::Waping,
                PositionStatus::Watching,
                PositionStatus::Replacing,
            ],
            PositionStatus::Active,
        )?;
        if self.opened_at.is_none() {
            self.opened_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn mark_syncing(&mut self) -> Result<(), TransitionError> {
        self.transition(&[PositionStatus::Active], PositionStatus::Syncing)
    }

    pub fn mark_waping(&mut self) -> Result<(), TransitionError> {
        self.transition(
            &[
                PositionStatus::Active,
                PositionStatus::Syncing,
                PositionStatus::Watching,
            ],
            PositionStatus::Waping,
        )
    }

    pub fn mark_watching(&mut self) -> Result<(), TransitionError> {
        self.transition(
            &[
                PositionStatus::Active,
                PositionStatus::Syncing,
                PositionStatus::Waping,
            ],
            PositionStatus::Watching,
        )
    }

    pub fn mark_replacing(&mut self) -> Result<(), TransitionError> {
        self.transition(
            &[
                PositionStatus::Active,
                PositionStatus::Syncing,
                PositionStatus::Waping,
                PositionStatus::Watching,
            ],
            PositionStatus::Replacing,
        )
    }

    pub fn mark_closing(&mut self) -> Result<(), TransitionError> {
        self.transition(
            &[
                PositionStatus::Active,
                PositionStatus::Syncing,
                PositionStatus::Waping,
                PositionStatus::Watching,
                PositionStatus::Replacing,
            ],
            PositionStatus::Closing,
        )
    }

    pub fn mark_closed(&mut self) -> Result<(), TransitionError> {
        self.transition(&[PositionStatus::Closing], PositionStatus::Closed)
    }

    pub fn mark_cancelling(&mut self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError {
                from: self.status,
                to: PositionStatus::Cancelling,
            });
        }
        self.status = PositionStatus::Cancelling;
        Ok(())
    }

    pub fn mark_cancelled(&mut self) -> Result<(), TransitionError> {
        self.transition(&[PositionStatus::Cancelling], PositionStatus::Cancelled)
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError {
                from: self.status,
                to: PositionStatus::Failed,
            });
        }
        self.status = PositionStatus::Failed;
        self.error_message = Some(message.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol_str::SmolStr;

    fn position() -> Position {
        Position::new(
            PositionId(1),
            AccountId(1),
            SymbolKey {
                exchange: escada_markets::ExchangeId::BinanceFutures,
                token: SmolStr::new("BTC"),
                quote: SmolStr::new("USDT"),
            },
            Direction::Long,
            Decimal::new(36, 2),
            4,
        )
    }

    #[test]
    fn happy_path_walks_new_opening_active() {
        let mut position = position();
        position.mark_opening().unwrap();
        position.mark_active().unwrap();
        assert_eq!(position.status, PositionStatus::Active);
        assert!(position.opened_at.is_some());
    }

    #[test]
    fn waping_returns_to_active() {
        let mut position = position();
        position.mark_opening().unwrap();
        position.mark_active().unwrap();
        position.mark_waping().unwrap();
        assert_eq!(position.status, PositionStatus::Waping);
        position.mark_active().unwrap();
        assert_eq!(position.status, PositionStatus::Active);
    }

    #[test]
    fn syncing_and_watching_round_trip_to_active() {
        let mut position = position();
        position.mark_opening().unwrap();
        position.mark_active().unwrap();
        position.mark_syncing().unwrap();
        position.mark_waping().unwrap();
        position.mark_watching().unwrap();
        position.mark_active().unwrap();
        assert_eq!(position.status, PositionStatus::Active);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut position = position();
        assert!(position.mark_active().is_err());
        assert!(position.mark_closing().is_err());
        position.mark_opening().unwrap();
        assert!(position.mark_waping().is_err());
    }

    #[test]
    fn terminal_states_are_never_left() {
        let mut position = position();
        position.mark_opening().unwrap();
        position.mark_failed("boom").unwrap();
        assert!(position.mark_cancelling().is_err());
        assert!(position.mark_failed("again").is_err());
        assert!(position.mark_active().is_err());
        assert_eq!(position.status, PositionStatus::Failed);
    }

    #[test]
    fn cancelling_reaches_cancelled_from_any_active_state() {
        let mut position = position();
        position.mark_opening().unwrap();
        position.mark_cancelling().unwrap();
        position.mark_cancelled().unwrap();
        assert_eq!(position.status, PositionStatus::Cancelled);
    }
}
