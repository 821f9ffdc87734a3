//! SmartReplaceOrders.
//!
//! Verifies the venue still carries the position. When it is gone the close
//! workflow takes over (there is nothing left to guard); when it exists, any
//! locally-expected orders missing on the venue are recreated.

use crate::{
    domain::{position::Position, PositionId},
    job::{AtomicJob, JobContext, JobError, JobOutcome},
    snapshot::{SnapshotKey, SnapshotPayload},
    step::{JobSpec, Step},
    workflow,
};
use async_trait::async_trait;
use escada_exchange::model::{position_key, CanonicalOrderStatus};
use tracing::{info, warn};
use uuid::Uuid;

/// Queries the venue's open positions and branches: close when the position
/// vanished, recreate-missing when it survives.
#[derive(Debug)]
pub struct VerifyPositionExistsOnExchange {
    position: PositionId,
    exists: Option<bool>,
}

impl VerifyPositionExistsOnExchange {
    pub fn new(position: PositionId) -> Self {
        Self {
            position,
            exists: None,
        }
    }
}

#[async_trait]
impl AtomicJob for VerifyPositionExistsOnExchange {
    fn name(&self) -> &'static str {
        "VerifyPositionExistsOnExchange"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        // the optimistic transition is the at-most-one guard for the whole
        // replace workflow
        match ctx
            .store
            .transition_position(self.position, Position::mark_replacing)
        {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, account, symbol, adapter) = ctx.position_context(self.position)?;
        let positions = adapter.positions().await?;
        ctx.snapshots.put(
            account.id,
            SnapshotKey::AccountPositions,
            SnapshotPayload::Positions(positions.values().cloned().collect()),
        );
        let pair = adapter.format_pair(&symbol);
        let key = position_key(
            &pair,
            position.direction,
            adapter.capabilities().hedge_mode,
        );
        let exists = positions
            .get(&key)
            .map(|venue| !venue.amount.is_zero())
            .unwrap_or(false);
        self.exists = Some(exists);
        Ok(JobOutcome::new(format!("venue position {key} exists: {exists}")))
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        let exists = self
            .exists
            .ok_or_else(|| JobError::Transient("existence not determined".into()))?;
        if exists {
            ctx.queue.enqueue(vec![Step::new(
                JobSpec::RecreateMissingOrders {
                    position: self.position,
                },
                Uuid::new_v4(),
                0,
            )]);
        } else {
            warn!(position = %self.position, "position vanished on venue, dispatching close");
            ctx.store
                .transition_position(self.position, Position::mark_closing)?;
            ctx.queue
                .enqueue(workflow::close_position_steps(self.position));
        }
        Ok(())
    }
}

/// Re-places every locally-expected order the venue no longer shows.
#[derive(Debug)]
pub struct RecreateMissingOrders {
    position: PositionId,
}

impl RecreateMissingOrders {
    pub fn new(position: PositionId) -> Self {
        Self { position }
    }
}

#[async_trait]
impl AtomicJob for RecreateMissingOrders {
    fn name(&self) -> &'static str {
        "RecreateMissingOrders"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        Ok(ctx.position(self.position)?.status
            == crate::domain::position::PositionStatus::Replacing)
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (_, _, symbol, adapter) = ctx.position_context(self.position)?;
        let resting = adapter.open_orders(&symbol).await?;
        let resting_ids: Vec<&str> = resting
            .iter()
            .map(|snapshot| snapshot.exchange_order_id.as_str())
            .collect();

        let mut missing = 0;
        let mut steps = Vec::new();
        for order in ctx.store.orders_for_position(self.position) {
            let expected_working = order
                .reference_status
                .is_some_and(|reference| reference.is_working());
            if !expected_working {
                continue;
            }
            let gone = order
                .exchange_order_id
                .as_deref()
                .map(|id| !resting_ids.contains(&id))
                .unwrap_or(true);
            if !gone {
                continue;
            }
            missing += 1;
            // mark it vanished so the recreate guard accepts it
            ctx.store.update_order(order.id, |order| {
                order.status = CanonicalOrderStatus::NotFound;
            })?;
            let spec = JobSpec::RecreateCancelledOrder { order: order.id };
            if !ctx.queue.has_active_spec(&spec) {
                steps.push(Step::new(spec, Uuid::new_v4(), 0));
            }
        }
        ctx.queue.enqueue(steps);
        Ok(JobOutcome::new(format!("{missing} orders missing on venue")))
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        ctx.store
            .transition_position(self.position, Position::mark_active)?;
        info!(position = %self.position, "replace pass finished");
        Ok(())
    }
}
