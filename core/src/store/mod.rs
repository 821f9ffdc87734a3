//! In-memory state store.
//!
//! Repositories for accounts, symbols, positions and orders behind
//! `parking_lot` locks, with optimistic status-guarded updates: a writer
//! states the status it expects and loses the race cleanly instead of
//! double-firing a workflow.

use crate::domain::{
    account::Account,
    order::Order,
    position::{Position, TransitionError},
    AccountId, EngineFlags, OrderId, PositionId,
};
use escada_exchange::model::CanonicalOrderStatus;
use escada_markets::{Direction, ExchangeSymbol, SymbolKey};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// The single order-change evaluator.
pub mod observer;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Error)]
pub enum StoreError {
    #[error("NotFound: {entity} {id}")]
    NotFound { entity: &'static str, id: u64 },

    #[error("NotFound: symbol {0}")]
    SymbolNotFound(String),

    #[error("DuplicateOpenPosition: {symbol} {direction} already open on account {account}")]
    DuplicateOpenPosition {
        account: u64,
        symbol: String,
        direction: Direction,
    },

    #[error("Conflict: expected status {expected}, found {actual}")]
    Conflict { expected: String, actual: String },

    #[error("Transition: {0}")]
    Transition(#[from] TransitionError),
}

/// In-memory repositories plus the engine flags record.
#[derive(Debug, Default)]
pub struct StateStore {
    accounts: RwLock<FnvHashMap<AccountId, Account>>,
    symbols: RwLock<FnvHashMap<SymbolKey, ExchangeSymbol>>,
    positions: RwLock<FnvHashMap<PositionId, Position>>,
    orders: RwLock<FnvHashMap<OrderId, Order>>,
    flags: RwLock<EngineFlags>,
    sequence: AtomicU64,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    // -- accounts ------------------------------------------------------------

    pub fn insert_account(&self, account: Account) {
        self.accounts.write().insert(account.id, account);
    }

    pub fn account(&self, id: AccountId) -> Result<Account, StoreError> {
        self.accounts
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "account",
                id: id.0,
            })
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.accounts.read().values().cloned().collect()
    }

    // -- symbols -------------------------------------------------------------

    pub fn upsert_symbol(&self, symbol: ExchangeSymbol) {
        self.symbols.write().insert(symbol.key(), symbol);
    }

    pub fn symbol(&self, key: &SymbolKey) -> Result<ExchangeSymbol, StoreError> {
        self.symbols
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::SymbolNotFound(key.to_string()))
    }

    pub fn update_symbol<F>(&self, key: &SymbolKey, update: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ExchangeSymbol),
    {
        let mut symbols = self.symbols.write();
        let symbol = symbols
            .get_mut(key)
            .ok_or_else(|| StoreError::SymbolNotFound(key.to_string()))?;
        update(symbol);
        Ok(())
    }

    // -- positions -----------------------------------------------------------

    /// Insert a new position, enforcing at most one open position per
    /// (account, symbol, direction).
    pub fn create_position(&self, position: Position) -> Result<PositionId, StoreError> {
        let mut positions = self.positions.write();
        let duplicate = positions.values().any(|existing| {
            existing.account_id == position.account_id
                && existing.symbol == position.symbol
                && existing.direction == position.direction
                && !existing.status.is_terminal()
        });
        if duplicate {
            return Err(StoreError::DuplicateOpenPosition {
                account: position.account_id.0,
                symbol: position.symbol.to_string(),
                direction: position.direction,
            });
        }
        let id = position.id;
        positions.insert(id, position);
        Ok(id)
    }

    pub fn position(&self, id: PositionId) -> Result<Position, StoreError> {
        self.positions
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "position",
                id: id.0,
            })
    }

    pub fn positions(&self) -> Vec<Position> {
        self.positions.read().values().cloned().collect()
    }

    pub fn update_position<F, T>(&self, id: PositionId, update: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Position) -> T,
    {
        let mut positions = self.positions.write();
        let position = positions.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "position",
            id: id.0,
        })?;
        Ok(update(position))
    }

    /// Run a transition method under the write lock; the optimistic
    /// transition-table check makes duplicate observer fires no-ops.
    pub fn transition_position<F>(&self, id: PositionId, transition: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Position) -> Result<(), TransitionError>,
    {
        let mut positions = self.positions.write();
        let position = positions.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "position",
            id: id.0,
        })?;
        transition(position).map_err(StoreError::from)
    }

    // -- orders --------------------------------------------------------------

    pub fn create_order(&self, order: Order) -> OrderId {
        let id = order.id;
        self.orders.write().insert(id, order);
        id
    }

    pub fn order(&self, id: OrderId) -> Result<Order, StoreError> {
        self.orders
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "order",
                id: id.0,
            })
    }

    pub fn orders_for_position(&self, position: PositionId) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .values()
            .filter(|order| order.position_id == position)
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.id.0);
        orders
    }

    pub fn update_order<F, T>(&self, id: OrderId, update: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Order) -> T,
    {
        let mut orders = self.orders.write();
        let order = orders.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "order",
            id: id.0,
        })?;
        Ok(update(order))
    }

    /// Optimistic update: applies only while the order still has the
    /// expected status, so racing writers do not double-commit.
    pub fn update_order_where_status<F>(
        &self,
        id: OrderId,
        expected: CanonicalOrderStatus,
        update: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Order),
    {
        let mut orders = self.orders.write();
        let order = orders.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "order",
            id: id.0,
        })?;
        if order.status != expected {
            return Err(StoreError::Conflict {
                expected: expected.to_string(),
                actual: order.status.to_string(),
            });
        }
        update(order);
        Ok(())
    }

    // -- flags ---------------------------------------------------------------

    pub fn flags(&self) -> EngineFlags {
        *self.flags.read()
    }

    pub fn set_allow_opening_positions(&self, allow: bool) {
        self.flags.write().allow_opening_positions = allow;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::PositionStatus;
    use escada_exchange::model::OrderKind;
    use escada_markets::{ExchangeId, Side};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use smol_str::SmolStr;

    fn key() -> SymbolKey {
        SymbolKey {
            exchange: ExchangeId::BinanceFutures,
            token: SmolStr::new("BTC"),
            quote: SmolStr::new("USDT"),
        }
    }

    fn position(store: &StateStore, direction: Direction) -> Position {
        Position::new(
            PositionId(store.next_id()),
            AccountId(1),
            key(),
            direction,
            Decimal::new(36, 2),
            4,
        )
    }

    #[test]
    fn one_open_position_per_account_symbol_direction() {
        let store = StateStore::new();
        let first = position(&store, Direction::Long);
        store.create_position(first).unwrap();
        let duplicate = position(&store, Direction::Long);
        assert!(matches!(
            store.create_position(duplicate),
            Err(StoreError::DuplicateOpenPosition { .. })
        ));
        // hedge mode: opposite direction is a distinct slot
        let short = position(&store, Direction::Short);
        store.create_position(short).unwrap();
    }

    #[test]
    fn terminal_positions_free_their_slot() {
        let store = StateStore::new();
        let mut first = position(&store, Direction::Long);
        first.mark_opening().unwrap();
        first.mark_failed("x").unwrap();
        let id = first.id;
        store.create_position(first).unwrap();
        assert_eq!(store.position(id).unwrap().status, PositionStatus::Failed);
        let second = position(&store, Direction::Long);
        store.create_position(second).unwrap();
    }

    #[test]
    fn optimistic_order_update_rejects_stale_writers() {
        let store = StateStore::new();
        let order = Order::new(
            OrderId(store.next_id()),
            PositionId(1),
            OrderKind::Limit,
            Side::Buy,
            Direction::Long,
            dec!(98),
            dec!(0.312),
            SmolStr::new("cid"),
            false,
        );
        let id = store.create_order(order);
        store
            .update_order_where_status(id, CanonicalOrderStatus::New, |order| {
                order.status = CanonicalOrderStatus::Filled;
            })
            .unwrap();
        // a second writer expecting NEW loses the race
        assert!(matches!(
            store.update_order_where_status(id, CanonicalOrderStatus::New, |order| {
                order.status = CanonicalOrderStatus::Cancelled;
            }),
            Err(StoreError::Conflict { .. })
        ));
    }
}
