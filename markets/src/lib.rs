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

//! # Markets - Venue & Symbol Primitives
//!
//! Foundational market definitions shared by every Escada crate: venue
//! identifiers, order/position sides, margin modes, tradable symbol metadata
//! (precisions, tick/lot steps, price bounds, leverage brackets) and the
//! decimal price/quantity formatter.
//!
//! All money, prices, quantities and ratios flow through the system as
//! [`rust_decimal::Decimal`] values. Binary floating point is never used on a
//! money path.
//!
//! ## Main Components
//!
//! - [`ExchangeId`]: supported derivatives venues
//! - [`Side`] / [`Direction`]: order side and position direction
//! - [`ExchangeSymbol`]: one tradable perpetual contract on one venue
//! - [`format_price`] / [`format_quantity`]: symbol-aware decimal formatting
//! - [`parse_decimal`] / [`div_scaled`]: decimal boundary helpers

use tracing as _;

/// Decimal parsing and arithmetic helpers with explicit scale.
pub mod decimal;

/// Defines all possible errors in Markets.
pub mod error;

/// Exchange identifiers for the supported derivatives venues.
pub mod exchange;

/// Margin mode vocabulary shared across venues.
pub mod margin;

/// Order side and position direction.
pub mod side;

/// Tradable symbol metadata, leverage brackets and the symbol formatter.
pub mod symbol;

pub use decimal::{div_scaled, notional, parse_decimal, percent_of, DEFAULT_SCALE};
pub use error::MarketError;
pub use exchange::ExchangeId;
pub use margin::MarginMode;
pub use side::{Direction, Side};
pub use symbol::{
    bracket_for_notional, decode_pair, format_price, format_quantity, ExchangeSymbol,
    LeverageBracket, SymbolKey,
};
