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

//! # Core - Escada Position Lifecycle Engine
//!
//! The heart of the Escada trading system: a durable, step-driven workflow
//! engine that manages the full lifecycle of leveraged perpetual-futures
//! positions with a martingale ladder strategy.
//!
//! ## Processing Flow
//!
//! ```text
//!  Scheduler tick
//!        |
//!  Sync workflows (per active position)
//!        |
//!  Steps -> Atomic jobs -> Exchange adapter
//!        |
//!  Order store commits
//!        |
//!  OrderChangeEvaluator -> correction workflows
//! ```
//!
//! ## Main Components
//!
//! - [`domain`]: accounts, positions (state machine), orders with reference
//!   shadow columns
//! - [`store`]: in-memory repositories with optimistic status-guarded writes
//!   plus the single [`OrderChangeEvaluator`](store::observer::OrderChangeEvaluator)
//! - [`job`]: the atomic-job contract
//!   (`start_or_fail -> compute -> double_check -> complete ->
//!   resolve_exception`) and its runner
//! - [`step`]: persisted steps grouped into parallel/sequential blocks with
//!   child-block fan-out
//! - [`workflow`]: the composed lifecycle workflows (Open, Activate, Sync,
//!   WAP-recalc, CorrectDrift, SmartReplace, Close, Cancel)
//! - [`engine`]: wiring plus the step executor
//! - [`scheduler`]: the periodic tick with admission control

/// Engine configuration, environment-derived.
pub mod config;

/// Domain entities: accounts, positions, orders, engine flags.
pub mod domain;

/// Engine wiring and the step executor.
pub mod engine;

/// Defines all possible errors in Core.
pub mod error;

/// The atomic-job contract and runner.
pub mod job;

/// Provides default Core Tracing logging initialisers.
pub mod logging;

/// Notification delivery interface (delivery itself is an external
/// collaborator).
pub mod notify;

/// Periodic scheduler with admission control.
pub mod scheduler;

/// Graceful shutdown signalling.
pub mod shutdown;

/// Per-account cache of recent exchange query results.
pub mod snapshot;

/// Steps, blocks and the step queue.
pub mod step;

/// In-memory state store and the order-change evaluator.
pub mod store;

/// Composed lifecycle workflows and their atomic jobs.
pub mod workflow;

pub use engine::Engine;
pub use error::EngineError;
