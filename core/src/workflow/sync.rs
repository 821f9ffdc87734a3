//! Per-order reconciliation.
//!
//! One job per order: query the venue, commit the current columns, then run
//! the change evaluator. Sync jobs only commit to their own order row, so
//! several of them may run in parallel for one position.

use crate::{
    domain::{OrderId, PositionId},
    job::{AtomicJob, JobContext, JobError, JobOutcome},
    store::observer::DriftVerdict,
};
use async_trait::async_trait;
use escada_exchange::{model::CanonicalOrderStatus, AdapterError};
use tracing::debug;

#[derive(Debug)]
pub struct SyncOrder {
    order: OrderId,
    position: Option<PositionId>,
    verdict: Option<DriftVerdict>,
}

impl SyncOrder {
    pub fn new(order: OrderId) -> Self {
        Self {
            order,
            position: None,
            verdict: None,
        }
    }
}

#[async_trait]
impl AtomicJob for SyncOrder {
    fn name(&self) -> &'static str {
        "SyncOrder"
    }

    fn position_id(&self) -> Option<PositionId> {
        self.position
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let order = ctx.order(self.order)?;
        self.position = Some(order.position_id);
        let position = ctx.position(order.position_id)?;
        Ok(position.status.is_opened() && order.is_syncable())
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let order = ctx.order(self.order)?;
        let (_, _, symbol, adapter) = ctx.position_context(order.position_id)?;
        let reference = order
            .order_ref()
            .ok_or_else(|| JobError::StatePrecondition("order never reached the venue".into()))?;

        let summary = match adapter.query_order(&symbol, &reference).await {
            Ok(snapshot) => {
                let summary = format!(
                    "{} -> {} ({} filled)",
                    order.client_order_id, snapshot.status, snapshot.filled_quantity
                );
                ctx.store.update_order(self.order, |order| {
                    order.apply_snapshot(&snapshot);
                })?;
                summary
            }
            // the venue lost the order entirely: surface as NOT_FOUND so the
            // evaluator treats it as a disappearance
            Err(AdapterError::OrderNotFound) => {
                ctx.store.update_order(self.order, |order| {
                    order.status = CanonicalOrderStatus::NotFound;
                })?;
                format!("{} -> NOT_FOUND", order.client_order_id)
            }
            Err(error) => return Err(error.into()),
        };
        Ok(JobOutcome::new(summary))
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        // the observer fires after the commit that caused the change
        let verdict = ctx
            .evaluator()
            .evaluate(self.order)
            .map_err(|error| JobError::Transient(error.to_string()))?;
        self.verdict = Some(verdict);
        debug!(order = %self.order, ?verdict, "sync evaluated");
        Ok(())
    }
}
