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

//! # Exchange - Uniform Venue Adapter
//!
//! A normalized request/response mapper hiding exchange-specific quirks
//! (order types, algo endpoints, symbol formatting, margin-mode vocabulary,
//! position keying) behind one contract: [`ExchangeAdapter`].
//!
//! ## Main Features
//!
//! * **Standardization**: the engine speaks only canonical shapes
//!   ([`model::PlaceOrderRequest`], [`model::OrderSnapshot`],
//!   [`model::ExchangePosition`], ...) regardless of venue
//! * **Two halves per operation**: each variant builds the signed request
//!   (`prepare*`, in its `request` module) and parses the venue response into
//!   the canonical shape (`resolve*`, in its `model` module)
//! * **Capability flags**: venue divergences (no cancel-all on BitGet,
//!   position-attached TP/SL, separate algo endpoints) are surfaced as
//!   [`model::ExchangeCapabilities`] consumed by workflows, never as
//!   per-venue branches inside generic code
//!
//! ## Variants
//!
//! [`binance`], [`bybit`], [`bitget`], [`kucoin`], [`kraken`], plus
//! [`mock`] for exercising lifecycle workflows in tests.

use crate::model::{
    AccountBalance, ExchangeCapabilities, ExchangePosition, Kline, KlineInterval, OrderAck,
    OrderRef, OrderSnapshot, PlaceOrderRequest, SymbolInfo, TradeFill,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escada_markets::{ExchangeId, ExchangeSymbol, LeverageBracket, MarginMode};
use fnv::FnvHashMap;
use rust_decimal::Decimal;

/// Binance USD-M futures variant.
pub mod binance;

/// BitGet USDT-M futures variant.
pub mod bitget;

/// Bybit linear perpetuals variant.
pub mod bybit;

/// Venue API credentials.
pub mod credentials;

/// Defines all possible errors in Exchange.
pub mod error;

/// Kraken futures variant.
pub mod kraken;

/// KuCoin futures variant.
pub mod kucoin;

/// In-process mock venue for lifecycle tests.
pub mod mock;

/// Canonical request/response shapes shared by every variant.
pub mod model;

pub use credentials::ApiCredentials;
pub use error::AdapterError;

/// Uniform, asynchronous contract over one venue for one account.
///
/// Every operation is a suspension point governed by the per-account rate
/// limiter and the request-level time budget. All results are canonical; no
/// venue wire type escapes an adapter.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// The venue this adapter speaks to.
    fn exchange(&self) -> ExchangeId;

    /// Static venue capability flags.
    fn capabilities(&self) -> ExchangeCapabilities;

    /// Venue wire encoding of a symbol (eg/ `"BTCUSDT"`, `"XBTUSDTM"`).
    fn format_pair(&self, symbol: &ExchangeSymbol) -> String;

    async fn server_time(&self) -> Result<DateTime<Utc>, AdapterError>;

    async fn exchange_info(&self) -> Result<Vec<SymbolInfo>, AdapterError>;

    async fn mark_price(&self, symbol: &ExchangeSymbol) -> Result<Decimal, AdapterError>;

    async fn klines(
        &self,
        symbol: &ExchangeSymbol,
        interval: KlineInterval,
        limit: u32,
    ) -> Result<Vec<Kline>, AdapterError>;

    async fn leverage_brackets(
        &self,
        symbol: &ExchangeSymbol,
    ) -> Result<Vec<LeverageBracket>, AdapterError>;

    async fn balance(&self) -> Result<AccountBalance, AdapterError>;

    /// Open positions keyed `"<PARSED_PAIR>:<DIRECTION>"` (hedge mode), or by
    /// pair alone on venues without hedge mode.
    async fn positions(&self) -> Result<FnvHashMap<String, ExchangePosition>, AdapterError>;

    async fn open_orders(
        &self,
        symbol: &ExchangeSymbol,
    ) -> Result<Vec<OrderSnapshot>, AdapterError>;

    async fn place_order(
        &self,
        symbol: &ExchangeSymbol,
        request: &PlaceOrderRequest,
    ) -> Result<OrderAck, AdapterError>;

    async fn cancel_order(
        &self,
        symbol: &ExchangeSymbol,
        order: &OrderRef,
    ) -> Result<OrderAck, AdapterError>;

    async fn modify_order(
        &self,
        symbol: &ExchangeSymbol,
        order: &OrderRef,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<OrderAck, AdapterError>;

    async fn query_order(
        &self,
        symbol: &ExchangeSymbol,
        order: &OrderRef,
    ) -> Result<OrderSnapshot, AdapterError>;

    /// Cancel all non-algo open orders on the symbol. Venues without a
    /// symbol-level cancel-all (`supports_cancel_all_by_symbol == false`)
    /// iterate individual cancels.
    async fn cancel_all_orders(&self, symbol: &ExchangeSymbol) -> Result<(), AdapterError>;

    async fn set_leverage(
        &self,
        symbol: &ExchangeSymbol,
        leverage: u32,
    ) -> Result<(), AdapterError>;

    /// Set the margin mode. On Kraken this is a combined margin-mode +
    /// leverage preference call; `leverage` is the hint for such venues and
    /// ignored elsewhere.
    async fn set_margin_mode(
        &self,
        symbol: &ExchangeSymbol,
        mode: MarginMode,
        leverage: Option<u32>,
    ) -> Result<(), AdapterError>;

    async fn trade_history(
        &self,
        symbol: &ExchangeSymbol,
        limit: u32,
    ) -> Result<Vec<TradeFill>, AdapterError>;
}
