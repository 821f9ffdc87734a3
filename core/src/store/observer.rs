//! The order-change evaluator.
//!
//! Every write path that could trigger a workflow calls this one evaluator
//! after its commit; it is the only place allowed to enqueue correction
//! workflows. Duplicate fires are no-ops: position transitions run through
//! the optimistic transition table, and step enqueues are deduplicated
//! against identical pending specs.

use crate::{
    domain::{order::Order, position::Position, OrderId},
    error::EngineError,
    step::{JobSpec, Step, StepQueue},
    store::{StateStore, StoreError},
    workflow,
};
use escada_exchange::model::{CanonicalOrderStatus, OrderKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// What a committed order change means for the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DriftVerdict {
    /// Nothing actionable.
    None,
    /// A ladder rung filled: recompute the weighted average and move the TP.
    LimitFilled,
    /// The take-profit or stop-loss filled: close the position.
    ExitFilled,
    /// The order vanished (cancelled/expired/not found) while expected NEW.
    Disappeared,
    /// Price or quantity drifted from the reference while still working.
    Modified,
}

/// Pure classification of one order against its reference columns.
pub fn classify(order: &Order) -> DriftVerdict {
    let reference_was_new = order
        .reference_status
        .is_some_and(|reference| reference.is_working());

    if reference_was_new && order.status == CanonicalOrderStatus::Filled {
        return match order.kind {
            OrderKind::Limit => DriftVerdict::LimitFilled,
            OrderKind::ProfitLimit | OrderKind::StopMarket => DriftVerdict::ExitFilled,
            // a market entry is FILLED from the start; reference agrees
            OrderKind::Market => DriftVerdict::None,
        };
    }

    if reference_was_new
        && matches!(
            order.status,
            CanonicalOrderStatus::Cancelled
                | CanonicalOrderStatus::Expired
                | CanonicalOrderStatus::NotFound
        )
    {
        return DriftVerdict::Disappeared;
    }

    if order.has_drifted() {
        return DriftVerdict::Modified;
    }

    DriftVerdict::None
}

/// Post-commit hook: classifies the order and dispatches the matching
/// correction workflow.
#[derive(Debug, Clone)]
pub struct OrderChangeEvaluator {
    store: Arc<StateStore>,
    queue: Arc<dyn StepQueue>,
}

impl OrderChangeEvaluator {
    pub fn new(store: Arc<StateStore>, queue: Arc<dyn StepQueue>) -> Self {
        Self { store, queue }
    }

    /// Evaluate one order after a commit, enqueueing at most one workflow.
    pub fn evaluate(&self, order_id: OrderId) -> Result<DriftVerdict, EngineError> {
        let order = self.store.order(order_id)?;
        let verdict = classify(&order);
        match verdict {
            DriftVerdict::None => {}
            DriftVerdict::LimitFilled => self.on_limit_filled(&order)?,
            DriftVerdict::ExitFilled => self.on_exit_filled(&order)?,
            DriftVerdict::Disappeared => self.enqueue_recreate(&order),
            DriftVerdict::Modified => self.enqueue_correction(&order),
        }
        Ok(verdict)
    }

    fn on_limit_filled(&self, order: &Order) -> Result<(), EngineError> {
        // the optimistic transition is the duplicate-fire guard: a second
        // evaluation finds the position already waping and stops here
        match self
            .store
            .transition_position(order.position_id, Position::mark_waping)
        {
            Ok(()) => {
                info!(position = %order.position_id, order = %order.id, "ladder rung filled, entering waping");
                self.queue
                    .enqueue(workflow::wap_recalc_steps(order.position_id));
                Ok(())
            }
            Err(StoreError::Transition(_)) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn on_exit_filled(&self, order: &Order) -> Result<(), EngineError> {
        match self
            .store
            .transition_position(order.position_id, Position::mark_closing)
        {
            Ok(()) => {
                info!(position = %order.position_id, order = %order.id, kind = %order.kind, "exit order filled, closing");
                self.queue
                    .enqueue(workflow::close_position_steps(order.position_id));
                Ok(())
            }
            Err(StoreError::Transition(_)) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn enqueue_recreate(&self, order: &Order) {
        let spec = JobSpec::RecreateCancelledOrder { order: order.id };
        if self.queue.has_active_spec(&spec) {
            return;
        }
        warn!(order = %order.id, "order disappeared on venue, recreating");
        self.queue
            .enqueue(vec![Step::new(spec, Uuid::new_v4(), 0)]);
    }

    fn enqueue_correction(&self, order: &Order) {
        let block = Uuid::new_v4();
        let steps = if order.is_algo {
            let cancel = JobSpec::CancelSingleAlgoOrder { order: order.id };
            if self.queue.has_active_spec(&cancel) {
                return;
            }
            vec![
                Step::new(cancel, block, 0),
                Step::new(JobSpec::RecreateCancelledOrder { order: order.id }, block, 1),
            ]
        } else {
            let correct = JobSpec::CorrectModifiedOrder { order: order.id };
            if self.queue.has_active_spec(&correct) {
                return;
            }
            vec![Step::new(correct, block, 0)]
        };
        warn!(order = %order.id, is_algo = order.is_algo, "drift detected, correcting");
        self.queue.enqueue(steps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountId, PositionId};
    use escada_markets::{Direction, ExchangeId, Side, SymbolKey};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use smol_str::SmolStr;

    fn order(kind: OrderKind, status: CanonicalOrderStatus) -> Order {
        let mut order = Order::new(
            crate::domain::OrderId(1),
            PositionId(1),
            kind,
            Side::Buy,
            Direction::Long,
            dec!(98),
            dec!(0.312),
            SmolStr::new("cid"),
            kind == OrderKind::StopMarket,
        );
        order.exchange_order_id = Some("42".into());
        order.capture_reference();
        order.status = status;
        order
    }

    #[test]
    fn limit_fill_is_waping_trigger() {
        let mut filled = order(OrderKind::Limit, CanonicalOrderStatus::Filled);
        filled.filled_quantity = filled.quantity;
        assert_eq!(classify(&filled), DriftVerdict::LimitFilled);
    }

    #[test]
    fn exit_fills_trigger_close() {
        assert_eq!(
            classify(&order(OrderKind::ProfitLimit, CanonicalOrderStatus::Filled)),
            DriftVerdict::ExitFilled
        );
        assert_eq!(
            classify(&order(OrderKind::StopMarket, CanonicalOrderStatus::Filled)),
            DriftVerdict::ExitFilled
        );
    }

    #[test]
    fn cancellations_and_not_found_are_disappearances() {
        for status in [
            CanonicalOrderStatus::Cancelled,
            CanonicalOrderStatus::Expired,
            CanonicalOrderStatus::NotFound,
        ] {
            assert_eq!(
                classify(&order(OrderKind::Limit, status)),
                DriftVerdict::Disappeared
            );
        }
    }

    #[test]
    fn price_drift_while_working_is_modified() {
        let mut drifted = order(OrderKind::Limit, CanonicalOrderStatus::New);
        drifted.price = dec!(95.5);
        assert_eq!(classify(&drifted), DriftVerdict::Modified);
    }

    #[test]
    fn intentional_changes_with_reference_updates_are_silent() {
        let mut order = order(OrderKind::ProfitLimit, CanonicalOrderStatus::New);
        // a WAP recalc moves price and reference in the same commit
        order.price = dec!(99.02);
        order.quantity = dec!(0.468);
        order.capture_reference();
        assert_eq!(classify(&order), DriftVerdict::None);
    }

    #[test]
    fn untouched_orders_are_none() {
        assert_eq!(
            classify(&order(OrderKind::Limit, CanonicalOrderStatus::New)),
            DriftVerdict::None
        );
    }

    #[test]
    fn evaluator_is_idempotent_on_duplicate_fires() {
        use crate::step::InMemoryStepQueue;
        let store = Arc::new(StateStore::new());
        let queue: Arc<dyn StepQueue> = Arc::new(InMemoryStepQueue::new());
        let evaluator = OrderChangeEvaluator::new(Arc::clone(&store), Arc::clone(&queue));

        let mut position = crate::domain::position::Position::new(
            PositionId(1),
            AccountId(1),
            SymbolKey {
                exchange: ExchangeId::BinanceFutures,
                token: SmolStr::new("BTC"),
                quote: SmolStr::new("USDT"),
            },
            Direction::Long,
            Decimal::new(36, 2),
            4,
        );
        position.mark_opening().unwrap();
        position.mark_active().unwrap();
        store.create_position(position).unwrap();

        let mut filled = order(OrderKind::Limit, CanonicalOrderStatus::Filled);
        filled.filled_quantity = filled.quantity;
        store.create_order(filled);

        evaluator.evaluate(crate::domain::OrderId(1)).unwrap();
        let after_first = queue.open_count();
        assert!(after_first > 0);
        // duplicate observer fire: no extra workflow
        evaluator.evaluate(crate::domain::OrderId(1)).unwrap();
        assert_eq!(queue.open_count(), after_first);
    }
}
