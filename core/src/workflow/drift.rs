//! Drift correction.
//!
//! Dispatched by the evaluator when an order's current values diverge from
//! its reference columns. Non-algo orders are modified back in place; algo
//! orders cannot be modified, so they are cancelled (with the reference
//! status pre-set so the cancel does not read as external) and recreated at
//! the reference price with the remaining quantity.

use crate::{
    domain::{OrderId, PositionId},
    job::{AtomicJob, JobContext, JobError, JobOutcome},
};
use async_trait::async_trait;
use escada_exchange::model::{CanonicalOrderStatus, PlaceOrderRequest};
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Modify a drifted non-algo order back to its reference values.
#[derive(Debug)]
pub struct CorrectModifiedOrder {
    order: OrderId,
    position: Option<PositionId>,
    reference_price: Option<Decimal>,
    reference_quantity: Option<Decimal>,
    /// Set when the venue cannot modify in place and the order was replaced.
    new_exchange_order_id: Option<String>,
}

impl CorrectModifiedOrder {
    pub fn new(order: OrderId) -> Self {
        Self {
            order,
            position: None,
            reference_price: None,
            reference_quantity: None,
            new_exchange_order_id: None,
        }
    }
}

#[async_trait]
impl AtomicJob for CorrectModifiedOrder {
    fn name(&self) -> &'static str {
        "CorrectModifiedOrder"
    }

    fn position_id(&self) -> Option<PositionId> {
        self.position
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let order = ctx.order(self.order)?;
        self.position = Some(order.position_id);
        let position = ctx.position(order.position_id)?;
        Ok(position.status.allows_order_mutation()
            && !order.is_algo
            && order.has_drifted()
            && order.order_ref().is_some())
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let order = ctx.order(self.order)?;
        let (_, _, symbol, adapter) = ctx.position_context(order.position_id)?;
        let reference = order
            .order_ref()
            .ok_or_else(|| JobError::StatePrecondition("order never reached the venue".into()))?;
        let price = order
            .reference_price
            .ok_or_else(|| JobError::StatePrecondition("no reference price".into()))?;
        let quantity = order
            .reference_quantity
            .ok_or_else(|| JobError::StatePrecondition("no reference quantity".into()))?;
        self.reference_price = Some(price);
        self.reference_quantity = Some(quantity);

        warn!(order = %self.order, %price, %quantity, "modifying drifted order back to reference");
        if adapter.capabilities().supports_order_modify {
            adapter
                .modify_order(&symbol, &reference, quantity, price)
                .await?;
        } else {
            // no in-place modify on this venue: replace the order outright
            adapter.cancel_order(&symbol, &reference).await?;
            let ack = adapter
                .place_order(
                    &symbol,
                    &PlaceOrderRequest {
                        side: order.side,
                        direction: order.position_side,
                        kind: order.kind,
                        quantity,
                        price: Some(price),
                        stop_price: None,
                        client_order_id: crate::workflow::client_order_id(
                            order.position_id,
                            "cm",
                            Some(ctx.store.next_id()),
                        ),
                        reduce_only: order.is_exit(),
                    },
                )
                .await?;
            self.new_exchange_order_id = Some(ack.exchange_order_id);
        }
        Ok(JobOutcome::new(format!(
            "order restored to {quantity} @ {price}"
        )))
    }

    async fn double_check(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let order = ctx.order(self.order)?;
        let (_, _, symbol, adapter) = ctx.position_context(order.position_id)?;
        let exchange_order_id = match self
            .new_exchange_order_id
            .clone()
            .or(order.exchange_order_id.clone())
        {
            Some(id) => id,
            None => return Ok(false),
        };
        let reference = escada_exchange::model::OrderRef {
            exchange_order_id,
            client_order_id: None,
            is_algo: order.is_algo,
        };
        let snapshot = adapter.query_order(&symbol, &reference).await?;
        Ok(Some(snapshot.price) == self.reference_price
            && Some(snapshot.quantity) == self.reference_quantity)
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        // current columns return to the reference; the reference itself is
        // untouched
        let price = self.reference_price;
        let quantity = self.reference_quantity;
        let new_exchange_order_id = self.new_exchange_order_id.clone();
        ctx.store.update_order(self.order, |order| {
            if let Some(price) = price {
                order.price = price;
            }
            if let Some(quantity) = quantity {
                order.quantity = quantity;
            }
            if let Some(id) = new_exchange_order_id {
                order.exchange_order_id = Some(id);
            }
        })?;
        info!(order = %self.order, "drift corrected");
        Ok(())
    }
}

/// Cancel a drifted algo order, pre-setting the reference status so the
/// cancellation is recognised as intentional.
#[derive(Debug)]
pub struct CancelSingleAlgoOrder {
    order: OrderId,
    position: Option<PositionId>,
}

impl CancelSingleAlgoOrder {
    pub fn new(order: OrderId) -> Self {
        Self {
            order,
            position: None,
        }
    }
}

#[async_trait]
impl AtomicJob for CancelSingleAlgoOrder {
    fn name(&self) -> &'static str {
        "CancelSingleAlgoOrder"
    }

    fn position_id(&self) -> Option<PositionId> {
        self.position
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let order = ctx.order(self.order)?;
        self.position = Some(order.position_id);
        let position = ctx.position(order.position_id)?;
        Ok(position.status.allows_order_mutation()
            && order.is_algo
            && order.status.is_working()
            && order.order_ref().is_some())
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let order = ctx.order(self.order)?;
        let (_, _, symbol, adapter) = ctx.position_context(order.position_id)?;
        let reference = order
            .order_ref()
            .ok_or_else(|| JobError::StatePrecondition("order never reached the venue".into()))?;

        // pre-set the reference so the upcoming CANCELLED is not treated as
        // an external disappearance; the status guard loses cleanly if the
        // stop fired in the meantime
        ctx.store.update_order_where_status(
            self.order,
            CanonicalOrderStatus::New,
            |order| {
                order.reference_status = Some(CanonicalOrderStatus::Cancelled);
            },
        )?;
        adapter.cancel_order(&symbol, &reference).await?;
        Ok(JobOutcome::new("algo order cancelled for recreation"))
    }

    async fn double_check(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let order = ctx.order(self.order)?;
        let (_, _, symbol, adapter) = ctx.position_context(order.position_id)?;
        let Some(reference) = order.order_ref() else {
            return Ok(false);
        };
        match adapter.query_order(&symbol, &reference).await {
            Ok(snapshot) => Ok(!snapshot.status.is_working()),
            Err(escada_exchange::AdapterError::OrderNotFound) => Ok(true),
            Err(error) => Err(error.into()),
        }
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        ctx.store.update_order(self.order, |order| {
            order.status = CanonicalOrderStatus::Cancelled;
        })?;
        Ok(())
    }
}

/// Recreate a cancelled / expired / vanished order at its reference price
/// with the remaining (unfilled) quantity.
#[derive(Debug)]
pub struct RecreateCancelledOrder {
    order: OrderId,
    position: Option<PositionId>,
    new_exchange_order_id: Option<String>,
    recreated_price: Option<Decimal>,
    recreated_quantity: Option<Decimal>,
}

impl RecreateCancelledOrder {
    pub fn new(order: OrderId) -> Self {
        Self {
            order,
            position: None,
            new_exchange_order_id: None,
            recreated_price: None,
            recreated_quantity: None,
        }
    }
}

#[async_trait]
impl AtomicJob for RecreateCancelledOrder {
    fn name(&self) -> &'static str {
        "RecreateCancelledOrder"
    }

    fn position_id(&self) -> Option<PositionId> {
        self.position
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let order = ctx.order(self.order)?;
        self.position = Some(order.position_id);
        let position = ctx.position(order.position_id)?;
        if !position.status.allows_order_mutation() {
            return Ok(false);
        }
        if !matches!(
            order.status,
            CanonicalOrderStatus::Cancelled
                | CanonicalOrderStatus::Expired
                | CanonicalOrderStatus::NotFound
        ) {
            return Ok(false);
        }
        // nothing to recreate once the intent is fully filled
        let position_attached = order.quantity.is_zero() && order.is_exit();
        Ok(position_attached || order.remaining_quantity() > Decimal::ZERO)
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let order = ctx.order(self.order)?;
        let (_, _, symbol, adapter) = ctx.position_context(order.position_id)?;
        let price = order.reference_price.unwrap_or(order.price);
        let quantity = if order.quantity.is_zero() && order.is_exit() {
            Decimal::ZERO
        } else {
            order.remaining_quantity()
        };
        self.recreated_price = Some(price);
        self.recreated_quantity = Some(quantity);

        let client_order_id = crate::workflow::client_order_id(
            order.position_id,
            "rc",
            Some(ctx.store.next_id()),
        );
        let ack = adapter
            .place_order(
                &symbol,
                &PlaceOrderRequest {
                    side: order.side,
                    direction: order.position_side,
                    kind: order.kind,
                    quantity,
                    price: Some(price),
                    stop_price: order.kind.is_trigger().then_some(price),
                    client_order_id,
                    reduce_only: order.is_exit() && !quantity.is_zero(),
                },
            )
            .await?;
        info!(order = %self.order, new_id = %ack.exchange_order_id, %price, %quantity, "order recreated");
        self.new_exchange_order_id = Some(ack.exchange_order_id);
        Ok(JobOutcome::new(format!("recreated {quantity} @ {price}")))
    }

    async fn double_check(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let order = ctx.order(self.order)?;
        let (_, _, symbol, adapter) = ctx.position_context(order.position_id)?;
        let Some(exchange_order_id) = self.new_exchange_order_id.clone() else {
            return Ok(false);
        };
        let reference = escada_exchange::model::OrderRef {
            exchange_order_id,
            client_order_id: None,
            is_algo: order.is_algo,
        };
        let snapshot = adapter.query_order(&symbol, &reference).await?;
        Ok(snapshot.status.is_working())
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        let new_exchange_order_id = self
            .new_exchange_order_id
            .clone()
            .ok_or_else(|| JobError::Transient("recreated order id not captured".into()))?;
        let price = self.recreated_price;
        let quantity = self.recreated_quantity;
        // the new venue order becomes the intended state, same commit
        ctx.store.update_order(self.order, |order| {
            order.exchange_order_id = Some(new_exchange_order_id);
            order.status = CanonicalOrderStatus::New;
            if let Some(price) = price {
                order.price = price;
            }
            if let Some(quantity) = quantity {
                order.quantity = quantity;
            }
            order.filled_quantity = Decimal::ZERO;
            order.capture_reference();
        })?;
        Ok(())
    }
}
