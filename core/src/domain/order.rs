//! Orders with reference shadow columns.
//!
//! The reference columns (`reference_price`, `reference_quantity`,
//! `reference_status`) are the immutable intended values, captured once an
//! order is confirmed on the venue. Drift is any current-vs-reference
//! difference. Any job that intentionally changes an order must update the
//! reference columns in the same commit as the change, otherwise the
//! evaluator re-fires.

use crate::domain::{OrderId, PositionId};
use escada_exchange::model::{CanonicalOrderStatus, OrderKind, OrderRef, OrderSnapshot};
use escada_markets::{Direction, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub position_id: PositionId,
    pub kind: OrderKind,
    pub side: Side,
    pub position_side: Direction,
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: CanonicalOrderStatus,
    pub exchange_order_id: Option<String>,
    pub client_order_id: SmolStr,
    pub is_algo: bool,
    pub filled_quantity: Decimal,
    pub average_price: Option<Decimal>,
    /// Rung ordinal for LIMIT ladder orders, 1..=N.
    pub rung_index: Option<u32>,
    pub reference_price: Option<Decimal>,
    pub reference_quantity: Option<Decimal>,
    pub reference_status: Option<CanonicalOrderStatus>,
}

impl Order {
    pub fn new(
        id: OrderId,
        position_id: PositionId,
        kind: OrderKind,
        side: Side,
        position_side: Direction,
        price: Decimal,
        quantity: Decimal,
        client_order_id: SmolStr,
        is_algo: bool,
    ) -> Self {
        Self {
            id,
            position_id,
            kind,
            side,
            position_side,
            price,
            quantity,
            status: CanonicalOrderStatus::New,
            exchange_order_id: None,
            client_order_id,
            is_algo,
            filled_quantity: Decimal::ZERO,
            average_price: None,
            rung_index: None,
            reference_price: None,
            reference_quantity: None,
            reference_status: None,
        }
    }

    pub fn with_rung(mut self, rung_index: u32) -> Self {
        self.rung_index = Some(rung_index);
        self
    }

    /// Reference to the venue order, when it exists there.
    pub fn order_ref(&self) -> Option<OrderRef> {
        self.exchange_order_id.as_ref().map(|id| OrderRef {
            exchange_order_id: id.clone(),
            client_order_id: Some(self.client_order_id.clone()),
            is_algo: self.is_algo,
        })
    }

    /// Copy the current values into the reference columns.
    pub fn capture_reference(&mut self) {
        self.reference_price = Some(self.price);
        self.reference_quantity = Some(self.quantity);
        self.reference_status = Some(self.status);
    }

    /// Apply a venue snapshot to the current (non-reference) columns.
    pub fn apply_snapshot(&mut self, snapshot: &OrderSnapshot) {
        self.status = snapshot.status;
        if !snapshot.price.is_zero() {
            self.price = snapshot.price;
        }
        if !snapshot.quantity.is_zero() || self.reference_quantity == Some(Decimal::ZERO) {
            self.quantity = snapshot.quantity;
        }
        self.filled_quantity = snapshot.filled_quantity;
        if snapshot.average_price.is_some() {
            self.average_price = snapshot.average_price;
        }
    }

    /// Price or quantity moved away from the reference while still working.
    pub fn has_drifted(&self) -> bool {
        if !self.status.is_working() {
            return false;
        }
        let price_drift = self
            .reference_price
            .is_some_and(|reference| reference != self.price);
        let quantity_drift = self
            .reference_quantity
            .is_some_and(|reference| reference != self.quantity);
        price_drift || quantity_drift
    }

    /// Part of the reconciliation set: confirmed on the venue and either
    /// still working or expected to be.
    pub fn is_syncable(&self) -> bool {
        self.exchange_order_id.is_some()
            && (self.status.is_working()
                || self
                    .reference_status
                    .is_some_and(|reference| reference.is_working()))
    }

    /// Take-profit or stop-loss leg.
    pub fn is_exit(&self) -> bool {
        matches!(self.kind, OrderKind::ProfitLimit | OrderKind::StopMarket)
    }

    /// Quantity still unfilled relative to the reference intent.
    pub fn remaining_quantity(&self) -> Decimal {
        let intended = self.reference_quantity.unwrap_or(self.quantity);
        (intended - self.filled_quantity).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order() -> Order {
        let mut order = Order::new(
            OrderId(1),
            PositionId(1),
            OrderKind::Limit,
            Side::Buy,
            Direction::Long,
            dec!(98),
            dec!(0.312),
            SmolStr::new("esc-1-l1"),
            false,
        );
        order.exchange_order_id = Some("42".into());
        order.capture_reference();
        order
    }

    #[test]
    fn capture_reference_freezes_current_values() {
        let order = order();
        assert_eq!(order.reference_price, Some(dec!(98)));
        assert_eq!(order.reference_quantity, Some(dec!(0.312)));
        assert_eq!(order.reference_status, Some(CanonicalOrderStatus::New));
    }

    #[test]
    fn drift_is_any_current_vs_reference_difference_while_working() {
        let mut order = order();
        assert!(!order.has_drifted());
        order.price = dec!(95.5);
        assert!(order.has_drifted());
        order.price = dec!(98);
        order.quantity = dec!(0.5);
        assert!(order.has_drifted());
        // terminal orders no longer count as drifted
        order.status = CanonicalOrderStatus::Filled;
        assert!(!order.has_drifted());
    }

    #[test]
    fn remaining_quantity_subtracts_fills_from_the_reference() {
        let mut order = order();
        order.filled_quantity = dec!(0.1);
        assert_eq!(order.remaining_quantity(), dec!(0.212));
    }
}
