//! # Core Error Types
//!
//! Central error type aggregating failures from the engine's subsystems:
//! store conflicts, adapter failures, planner validation and illegal state
//! transitions.

use crate::domain::position::TransitionError;
use crate::store::StoreError;
use escada_exchange::AdapterError;
use escada_markets::MarketError;
use escada_planner::PlannerError;
use serde::Serialize;
use thiserror::Error;

/// Central error type for the core module of the Escada engine.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Error)]
pub enum EngineError {
    /// Repository lookup or conflict errors.
    #[error("Store: {0}")]
    Store(#[from] StoreError),

    /// Exchange adapter errors.
    #[error("Adapter: {0}")]
    Adapter(#[from] AdapterError),

    /// Martingale planner errors.
    #[error("Planner: {0}")]
    Planner(#[from] PlannerError),

    /// Decimal and symbol formatting errors.
    #[error("Market: {0}")]
    Market(#[from] MarketError),

    /// Illegal position status transition.
    #[error("Transition: {0}")]
    Transition(#[from] TransitionError),

    /// No adapter registered for an account.
    #[error("NoAdapter: account {0} has no registered adapter")]
    NoAdapter(u64),

    /// Admission control refused a new position.
    #[error("Admission: {0}")]
    Admission(String),
}
