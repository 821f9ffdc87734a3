//! Error types for market primitives.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All possible errors produced by the markets crate.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum MarketError {
    /// Input could not be parsed as a decimal number.
    #[error("InvalidDecimal: {0:?} is not a valid decimal")]
    InvalidDecimal(String),

    /// Division by zero while scaling a decimal.
    #[error("DivisionByZero: {0} / 0")]
    DivisionByZero(Decimal),

    /// Price must be strictly positive for formatting.
    #[error("NonPositivePrice: {0}")]
    NonPositivePrice(Decimal),

    /// Quantity must be strictly positive for formatting.
    #[error("NonPositiveQuantity: {0}")]
    NonPositiveQuantity(Decimal),

    /// Exchange identifier was not recognised.
    #[error("UnknownExchange: {0}")]
    UnknownExchange(String),

    /// Trading pair could not be decoded into (token, quote).
    #[error("UnknownPair: {0}")]
    UnknownPair(String),
}
