//! WAP recalculation after a ladder fill.
//!
//! Entered when the evaluator moves the position to `waping`. First verify
//! the take-profit has not already filled (if it has, the close workflow
//! owns the position and this one stops), then recompute the weighted
//! average over all filled legs and move the TP to cover the grown position.

use crate::{
    domain::{order::Order, position::Position, PositionId},
    job::{AtomicJob, JobContext, JobError, JobOutcome},
};
use async_trait::async_trait;
use chrono::Utc;
use escada_exchange::model::{CanonicalOrderStatus, OrderKind, PlaceOrderRequest};
use escada_planner::{weighted_average_price, Leg};
use rust_decimal::Decimal;
use tracing::info;

fn tp_order(ctx: &JobContext, position: PositionId) -> Result<Order, JobError> {
    ctx.store
        .orders_for_position(position)
        .into_iter()
        .find(|order| order.kind == OrderKind::ProfitLimit)
        .ok_or_else(|| JobError::StatePrecondition("position has no take-profit order".into()))
}

/// Filled legs of the position: the market entry plus every filled rung.
fn filled_legs(ctx: &JobContext, position: PositionId) -> Result<Vec<Leg>, JobError> {
    let legs: Vec<Leg> = ctx
        .store
        .orders_for_position(position)
        .into_iter()
        .filter(|order| {
            matches!(order.kind, OrderKind::Market | OrderKind::Limit)
                && order.filled_quantity > Decimal::ZERO
        })
        .map(|order| {
            Leg::new(
                order.average_price.unwrap_or(order.price),
                order.filled_quantity,
            )
        })
        .collect();
    if legs.is_empty() {
        return Err(JobError::StatePrecondition("no filled legs".into()));
    }
    Ok(legs)
}

/// Short-circuits the WAP workflow when the TP is already gone.
#[derive(Debug)]
pub struct VerifyIfTpIsFilled {
    position: PositionId,
}

impl VerifyIfTpIsFilled {
    pub fn new(position: PositionId) -> Self {
        Self { position }
    }
}

#[async_trait]
impl AtomicJob for VerifyIfTpIsFilled {
    fn name(&self) -> &'static str {
        "VerifyIfTpIsFilled"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        Ok(ctx.position(self.position)?.status
            == crate::domain::position::PositionStatus::Waping)
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (_, _, symbol, adapter) = ctx.position_context(self.position)?;
        let tp = tp_order(ctx, self.position)?;
        let reference = tp
            .order_ref()
            .ok_or_else(|| JobError::StatePrecondition("take-profit never placed".into()))?;
        let snapshot = adapter.query_order(&symbol, &reference).await?;
        if snapshot.status == CanonicalOrderStatus::Filled {
            // commit what we saw and let the evaluator dispatch the close
            ctx.store.update_order(tp.id, |order| {
                order.apply_snapshot(&snapshot);
            })?;
            ctx.evaluator()
                .evaluate(tp.id)
                .map_err(|error| JobError::Transient(error.to_string()))?;
            return Err(JobError::NonNotifiable(
                "take-profit already filled; close workflow dispatched".into(),
            ));
        }
        Ok(JobOutcome::new(format!(
            "take-profit still {}",
            snapshot.status
        )))
    }

    async fn complete(&mut self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }
}

/// Recomputes the weighted average price and moves the TP to the new target
/// with the grown quantity. Reference columns are updated in the same commit
/// as the current columns so the evaluator does not re-fire.
#[derive(Debug)]
pub struct CalculateWapAndModifyProfitOrder {
    position: PositionId,
    target_price: Option<Decimal>,
    target_quantity: Option<Decimal>,
    new_exchange_order_id: Option<String>,
}

impl CalculateWapAndModifyProfitOrder {
    pub fn new(position: PositionId) -> Self {
        Self {
            position,
            target_price: None,
            target_quantity: None,
            new_exchange_order_id: None,
        }
    }
}

#[async_trait]
impl AtomicJob for CalculateWapAndModifyProfitOrder {
    fn name(&self) -> &'static str {
        "CalculateWapAndModifyProfitOrder"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        Ok(ctx.position(self.position)?.status
            == crate::domain::position::PositionStatus::Waping)
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, account, symbol, adapter) = ctx.position_context(self.position)?;
        let capabilities = adapter.capabilities();
        let tp = tp_order(ctx, self.position)?;
        let reference = tp
            .order_ref()
            .ok_or_else(|| JobError::StatePrecondition("take-profit never placed".into()))?;

        let legs = filled_legs(ctx, self.position)?;
        let wap = weighted_average_price(&legs)?;
        let total_quantity: Decimal = legs.iter().map(|leg| leg.quantity).sum();
        let mark = adapter.mark_price(&symbol).await?;
        let target = escada_planner::profit_price(
            position.direction,
            wap,
            account.profit_percentage,
            Some(mark),
            &symbol,
        )?;
        let quantity = if capabilities.position_attached_tpsl {
            Decimal::ZERO
        } else {
            total_quantity
        };
        self.target_price = Some(target);
        self.target_quantity = Some(quantity);

        if tp.is_algo || !capabilities.supports_order_modify {
            // venues without in-place modify get a cancel + recreate
            adapter.cancel_order(&symbol, &reference).await?;
            let ack = adapter
                .place_order(
                    &symbol,
                    &PlaceOrderRequest {
                        side: position.direction.exit_side(),
                        direction: position.direction,
                        kind: OrderKind::ProfitLimit,
                        quantity,
                        price: Some(target),
                        stop_price: None,
                        client_order_id: crate::workflow::client_order_id(
                            self.position,
                            "tp",
                            Some(ctx.store.next_id()),
                        ),
                        reduce_only: !capabilities.position_attached_tpsl,
                    },
                )
                .await?;
            self.new_exchange_order_id = Some(ack.exchange_order_id);
        } else {
            adapter
                .modify_order(&symbol, &reference, quantity, target)
                .await?;
        }

        Ok(JobOutcome::new(format!(
            "wap {wap} over {total_quantity}, take-profit -> {target}"
        )))
    }

    async fn double_check(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let (_, _, symbol, adapter) = ctx.position_context(self.position)?;
        let tp = tp_order(ctx, self.position)?;
        let exchange_order_id = self
            .new_exchange_order_id
            .clone()
            .or(tp.exchange_order_id.clone())
            .ok_or_else(|| JobError::StatePrecondition("take-profit never placed".into()))?;
        let reference = escada_exchange::model::OrderRef {
            exchange_order_id,
            client_order_id: Some(tp.client_order_id.clone()),
            is_algo: tp.is_algo,
        };
        let snapshot = adapter.query_order(&symbol, &reference).await?;
        let price_matches = self.target_price == Some(snapshot.price);
        let quantity_matches = self
            .target_quantity
            .is_some_and(|target| target == snapshot.quantity || target.is_zero());
        Ok(snapshot.status.is_working() && price_matches && quantity_matches)
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        let tp = tp_order(ctx, self.position)?;
        let target = self
            .target_price
            .ok_or_else(|| JobError::Transient("target price not computed".into()))?;
        let quantity = self
            .target_quantity
            .ok_or_else(|| JobError::Transient("target quantity not computed".into()))?;
        let new_exchange_order_id = self.new_exchange_order_id.clone();

        // intended change: current and reference columns move together
        ctx.store.update_order(tp.id, |order| {
            order.price = target;
            order.quantity = quantity;
            order.status = CanonicalOrderStatus::New;
            if let Some(id) = new_exchange_order_id {
                order.exchange_order_id = Some(id);
            }
            order.capture_reference();
        })?;

        // the fills this recalc absorbed become intended state; without this
        // the evaluator would re-enter waping on the next sync pass
        for order in ctx.store.orders_for_position(self.position) {
            if order.kind == OrderKind::Limit
                && order.status == CanonicalOrderStatus::Filled
                && order.reference_status != Some(CanonicalOrderStatus::Filled)
            {
                ctx.store.update_order(order.id, |order| {
                    order.capture_reference();
                })?;
            }
        }

        let legs = filled_legs(ctx, self.position)?;
        let total_quantity: Decimal = legs.iter().map(|leg| leg.quantity).sum();
        ctx.store.update_position(self.position, |position| {
            position.quantity = total_quantity;
            position.was_waped = true;
            position.waped_at = Some(Utc::now());
        })?;
        ctx.store
            .transition_position(self.position, Position::mark_active)?;
        info!(position = %self.position, %target, "take-profit re-anchored to new wap");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn wap_math_matches_the_reference_fill_sequence() {
        // market 0.156 @ 100 plus rung one 0.312 @ 98
        let legs = vec![Leg::new(dec!(100), dec!(0.156)), Leg::new(dec!(98), dec!(0.312))];
        let wap = weighted_average_price(&legs).unwrap();
        assert_eq!(wap.round_dp(3), dec!(98.667));
    }
}
