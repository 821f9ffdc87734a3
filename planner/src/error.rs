//! Error types for the planner.

use escada_markets::MarketError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum PlannerError {
    /// Local validation failed: non-positive price, quantity or multiplier.
    #[error("InvalidInput: {0}")]
    InvalidInput(String),

    /// Neither a reference price, a mark price nor a last price is available.
    #[error("NoBasisPrice: no reference, mark or last price available")]
    NoBasisPrice,

    /// Formatting or decimal arithmetic failed.
    #[error("Market: {0}")]
    Market(#[from] MarketError),
}
