//! Steps, blocks and the step queue.
//!
//! A **step** is one enqueued atomic job with typed arguments. A **block**
//! is every step sharing a `block_uuid`: steps with equal `index` run in
//! parallel, ascending `index` values run strictly in order. A step may
//! declare a `child_block_uuid`; the child block starts after the step
//! completes, and later indexes of the parent block wait for the whole child
//! block (happens-before across blocks).
//!
//! The queue contract assumes an external at-least-once delivery system;
//! idempotence comes from `start_or_fail` guards plus the reference-column
//! checks, never from the queue.

use crate::domain::{OrderId, PositionId, StepId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Typed payload naming the atomic job a step executes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum JobSpec {
    PreparePosition { position: PositionId },
    VerifyNotional { position: PositionId },
    SetMarginMode { position: PositionId },
    DetermineLeverage { position: PositionId },
    SetLeverage { position: PositionId },
    PlaceMarketOrder { position: PositionId },
    DispatchLimitOrders { position: PositionId, child_block: Uuid },
    PlaceLimitOrder { position: PositionId, rung_index: u32 },
    PlaceProfitOrder { position: PositionId },
    PlaceStopLossOrder { position: PositionId },
    ActivatePosition { position: PositionId },
    SyncOrder { order: OrderId },
    VerifyIfTpIsFilled { position: PositionId },
    CalculateWapAndModifyProfitOrder { position: PositionId },
    CorrectModifiedOrder { order: OrderId },
    CancelSingleAlgoOrder { order: OrderId },
    RecreateCancelledOrder { order: OrderId },
    VerifyPositionExistsOnExchange { position: PositionId },
    RecreateMissingOrders { position: PositionId },
    CancelPositionOpenOrders { position: PositionId },
    CancelAlgoOpenOrders { position: PositionId },
    ClosePositionAtomically { position: PositionId },
    VerifyPositionResidualAmount { position: PositionId },
    ApplyPumpCooldown { position: PositionId },
    UpdateRemainingClosingData { position: PositionId },
    FinishCancellation { position: PositionId },
}

impl JobSpec {
    pub fn name(&self) -> &'static str {
        match self {
            JobSpec::PreparePosition { .. } => "PreparePosition",
            JobSpec::VerifyNotional { .. } => "VerifyNotional",
            JobSpec::SetMarginMode { .. } => "SetMarginMode",
            JobSpec::DetermineLeverage { .. } => "DetermineLeverage",
            JobSpec::SetLeverage { .. } => "SetLeverage",
            JobSpec::PlaceMarketOrder { .. } => "PlaceMarketOrder",
            JobSpec::DispatchLimitOrders { .. } => "DispatchLimitOrders",
            JobSpec::PlaceLimitOrder { .. } => "PlaceLimitOrder",
            JobSpec::PlaceProfitOrder { .. } => "PlaceProfitOrder",
            JobSpec::PlaceStopLossOrder { .. } => "PlaceStopLossOrder",
            JobSpec::ActivatePosition { .. } => "ActivatePosition",
            JobSpec::SyncOrder { .. } => "SyncOrder",
            JobSpec::VerifyIfTpIsFilled { .. } => "VerifyIfTpIsFilled",
            JobSpec::CalculateWapAndModifyProfitOrder { .. } => {
                "CalculateWapAndModifyProfitOrder"
            }
            JobSpec::CorrectModifiedOrder { .. } => "CorrectModifiedOrder",
            JobSpec::CancelSingleAlgoOrder { .. } => "CancelSingleAlgoOrder",
            JobSpec::RecreateCancelledOrder { .. } => "RecreateCancelledOrder",
            JobSpec::VerifyPositionExistsOnExchange { .. } => "VerifyPositionExistsOnExchange",
            JobSpec::RecreateMissingOrders { .. } => "RecreateMissingOrders",
            JobSpec::CancelPositionOpenOrders { .. } => "CancelPositionOpenOrders",
            JobSpec::CancelAlgoOpenOrders { .. } => "CancelAlgoOpenOrders",
            JobSpec::ClosePositionAtomically { .. } => "ClosePositionAtomically",
            JobSpec::VerifyPositionResidualAmount { .. } => "VerifyPositionResidualAmount",
            JobSpec::ApplyPumpCooldown { .. } => "ApplyPumpCooldown",
            JobSpec::UpdateRemainingClosingData { .. } => "UpdateRemainingClosingData",
            JobSpec::FinishCancellation { .. } => "FinishCancellation",
        }
    }

    /// The position the step belongs to, directly or through its order.
    pub fn position_id(&self) -> Option<PositionId> {
        match self {
            JobSpec::PreparePosition { position }
            | JobSpec::VerifyNotional { position }
            | JobSpec::SetMarginMode { position }
            | JobSpec::DetermineLeverage { position }
            | JobSpec::SetLeverage { position }
            | JobSpec::PlaceMarketOrder { position }
            | JobSpec::DispatchLimitOrders { position, .. }
            | JobSpec::PlaceLimitOrder { position, .. }
            | JobSpec::PlaceProfitOrder { position }
            | JobSpec::PlaceStopLossOrder { position }
            | JobSpec::ActivatePosition { position }
            | JobSpec::VerifyIfTpIsFilled { position }
            | JobSpec::CalculateWapAndModifyProfitOrder { position }
            | JobSpec::VerifyPositionExistsOnExchange { position }
            | JobSpec::RecreateMissingOrders { position }
            | JobSpec::CancelPositionOpenOrders { position }
            | JobSpec::CancelAlgoOpenOrders { position }
            | JobSpec::ClosePositionAtomically { position }
            | JobSpec::VerifyPositionResidualAmount { position }
            | JobSpec::ApplyPumpCooldown { position }
            | JobSpec::UpdateRemainingClosingData { position }
            | JobSpec::FinishCancellation { position } => Some(*position),
            JobSpec::SyncOrder { .. }
            | JobSpec::CorrectModifiedOrder { .. }
            | JobSpec::CancelSingleAlgoOrder { .. }
            | JobSpec::RecreateCancelledOrder { .. } => None,
        }
    }

    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            JobSpec::SyncOrder { order }
            | JobSpec::CorrectModifiedOrder { order }
            | JobSpec::CancelSingleAlgoOrder { order }
            | JobSpec::RecreateCancelledOrder { order } => Some(*order),
            _ => None,
        }
    }

    /// Whether the job mutates position-level state (and therefore needs the
    /// per-position mutex). Order-scoped sync and corrections commit only to
    /// their own order row.
    pub fn is_position_mutating(&self) -> bool {
        !matches!(
            self,
            JobSpec::SyncOrder { .. }
                | JobSpec::CorrectModifiedOrder { .. }
                | JobSpec::CancelSingleAlgoOrder { .. }
                | JobSpec::RecreateCancelledOrder { .. }
        )
    }
}

impl fmt::Display for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            StepStatus::Done | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

/// One enqueued unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Step {
    pub id: StepId,
    pub job: JobSpec,
    pub block_uuid: Uuid,
    pub index: u32,
    pub child_block_uuid: Option<Uuid>,
    pub status: StepStatus,
    pub attempts: u32,
    pub result: Option<String>,
}

impl Step {
    pub fn new(job: JobSpec, block_uuid: Uuid, index: u32) -> Self {
        Self {
            id: StepId(0),
            job,
            block_uuid,
            index,
            child_block_uuid: None,
            status: StepStatus::Pending,
            attempts: 0,
            result: None,
        }
    }

    pub fn with_child_block(mut self, child: Uuid) -> Self {
        self.child_block_uuid = Some(child);
        self
    }
}

/// Contract of the external persistent step queue (at-least-once delivery).
pub trait StepQueue: Send + Sync + std::fmt::Debug {
    /// Persist steps, assigning ids.
    fn enqueue(&self, steps: Vec<Step>) -> Vec<StepId>;

    /// Claim the next runnable step, marking it running.
    fn claim_next(&self) -> Option<Step>;

    /// Settle a step.
    fn mark(&self, id: StepId, status: StepStatus, result: Option<String>);

    /// A step with an identical spec is already pending or running.
    fn has_active_spec(&self, spec: &JobSpec) -> bool;

    /// Steps not yet settled.
    fn open_count(&self) -> usize;

    /// Snapshot for inspection.
    fn steps(&self) -> Vec<Step>;
}

/// The bundled queue implementation: an in-process vector with the block
/// ordering rules applied at claim time.
#[derive(Debug, Default)]
pub struct InMemoryStepQueue {
    steps: Mutex<Vec<Step>>,
    sequence: AtomicU64,
}

impl InMemoryStepQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn block_settled(steps: &[Step], block: Uuid) -> bool {
        steps
            .iter()
            .filter(|step| step.block_uuid == block)
            .all(|step| step.status.is_settled())
    }

    fn runnable(steps: &[Step], candidate: &Step) -> bool {
        if candidate.status != StepStatus::Pending {
            return false;
        }
        // strict ordering inside the block: every lower index settled, along
        // with any child blocks those steps fanned out
        for step in steps
            .iter()
            .filter(|step| step.block_uuid == candidate.block_uuid)
        {
            if step.index < candidate.index {
                if !step.status.is_settled() {
                    return false;
                }
                if let Some(child) = step.child_block_uuid {
                    if !Self::block_settled(steps, child) {
                        return false;
                    }
                }
            }
        }
        // child blocks wait for their parent step
        if let Some(parent) = steps
            .iter()
            .find(|step| step.child_block_uuid == Some(candidate.block_uuid))
        {
            if !parent.status.is_settled() {
                return false;
            }
        }
        true
    }
}

impl StepQueue for InMemoryStepQueue {
    fn enqueue(&self, mut new_steps: Vec<Step>) -> Vec<StepId> {
        let mut steps = self.steps.lock();
        let mut ids = Vec::with_capacity(new_steps.len());
        for step in new_steps.iter_mut() {
            step.id = StepId(self.sequence.fetch_add(1, Ordering::Relaxed) + 1);
            ids.push(step.id);
        }
        steps.extend(new_steps);
        ids
    }

    fn claim_next(&self) -> Option<Step> {
        let mut steps = self.steps.lock();
        let snapshot = steps.clone();
        let index = snapshot
            .iter()
            .position(|step| Self::runnable(&snapshot, step))?;
        let claimed = &mut steps[index];
        claimed.status = StepStatus::Running;
        claimed.attempts += 1;
        Some(claimed.clone())
    }

    fn mark(&self, id: StepId, status: StepStatus, result: Option<String>) {
        let mut steps = self.steps.lock();
        if let Some(step) = steps.iter_mut().find(|step| step.id == id) {
            step.status = status;
            if result.is_some() {
                step.result = result;
            }
        }
    }

    fn has_active_spec(&self, spec: &JobSpec) -> bool {
        self.steps.lock().iter().any(|step| {
            &step.job == spec
                && matches!(step.status, StepStatus::Pending | StepStatus::Running)
        })
    }

    fn open_count(&self) -> usize {
        self.steps
            .lock()
            .iter()
            .filter(|step| !step.status.is_settled())
            .count()
    }

    fn steps(&self) -> Vec<Step> {
        self.steps.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(position: u64) -> JobSpec {
        JobSpec::PreparePosition {
            position: PositionId(position),
        }
    }

    #[test]
    fn sequential_indexes_run_strictly_ascending() {
        let queue = InMemoryStepQueue::new();
        let block = Uuid::new_v4();
        queue.enqueue(vec![
            Step::new(spec(1), block, 0),
            Step::new(spec(2), block, 1),
        ]);

        let first = queue.claim_next().unwrap();
        assert_eq!(first.job, spec(1));
        // second is blocked until the first settles
        assert!(queue.claim_next().is_none());
        queue.mark(first.id, StepStatus::Done, None);
        let second = queue.claim_next().unwrap();
        assert_eq!(second.job, spec(2));
    }

    #[test]
    fn equal_indexes_run_in_parallel() {
        let queue = InMemoryStepQueue::new();
        let block = Uuid::new_v4();
        queue.enqueue(vec![
            Step::new(spec(1), block, 0),
            Step::new(spec(2), block, 0),
        ]);
        let first = queue.claim_next().unwrap();
        let second = queue.claim_next().unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn child_blocks_gate_both_directions() {
        let queue = InMemoryStepQueue::new();
        let block = Uuid::new_v4();
        let child = Uuid::new_v4();
        queue.enqueue(vec![
            Step::new(spec(1), block, 0).with_child_block(child),
            Step::new(spec(2), block, 1),
            Step::new(spec(3), child, 0),
        ]);

        // child waits for the parent step
        let parent = queue.claim_next().unwrap();
        assert_eq!(parent.job, spec(1));
        assert!(queue.claim_next().is_none());
        queue.mark(parent.id, StepStatus::Done, None);

        // parent's successor waits for the whole child block
        let child_step = queue.claim_next().unwrap();
        assert_eq!(child_step.job, spec(3));
        assert!(queue.claim_next().is_none());
        queue.mark(child_step.id, StepStatus::Done, None);

        let successor = queue.claim_next().unwrap();
        assert_eq!(successor.job, spec(2));
    }

    #[test]
    fn active_spec_dedup_sees_pending_and_running() {
        let queue = InMemoryStepQueue::new();
        let block = Uuid::new_v4();
        queue.enqueue(vec![Step::new(spec(1), block, 0)]);
        assert!(queue.has_active_spec(&spec(1)));
        let step = queue.claim_next().unwrap();
        assert!(queue.has_active_spec(&spec(1)));
        queue.mark(step.id, StepStatus::Done, None);
        assert!(!queue.has_active_spec(&spec(1)));
    }
}
