//! Composed lifecycle workflows.
//!
//! Each function below builds the step list for one workflow; the step
//! engine schedules them by block and index. [`instantiate`] maps a
//! [`JobSpec`] back to its atomic job, which is all the executor needs to
//! run any step regardless of which workflow enqueued it.

use crate::{
    domain::{OrderId, PositionId},
    job::AtomicJob,
    step::{JobSpec, Step},
};
use smol_str::SmolStr;
use uuid::Uuid;

/// Close sequence: cancel resting orders, cancel algo orders, reduce the
/// position, verify the residual, pump-cooldown check, persist closing data.
pub mod close;

/// Drift corrections: modify back in place, or cancel-and-recreate for algo
/// orders.
pub mod drift;

/// The open-position sequence, ladder fan-out and activation validation.
pub mod open;

/// SmartReplace: verify the venue still has the position, then close or
/// recreate what is missing.
pub mod replace;

/// Per-order reconciliation against the venue.
pub mod sync;

/// WAP recalculation after a ladder fill.
pub mod wap;

/// OpenPosition: sequential prepare/verify/margin/leverage/market, ladder
/// fan-out through a child block, exits, then activation.
pub fn open_position_steps(position: PositionId) -> Vec<Step> {
    let block = Uuid::new_v4();
    let limits_block = Uuid::new_v4();
    vec![
        Step::new(JobSpec::PreparePosition { position }, block, 0),
        Step::new(JobSpec::VerifyNotional { position }, block, 1),
        Step::new(JobSpec::SetMarginMode { position }, block, 2),
        Step::new(JobSpec::DetermineLeverage { position }, block, 3),
        Step::new(JobSpec::SetLeverage { position }, block, 4),
        Step::new(JobSpec::PlaceMarketOrder { position }, block, 5),
        Step::new(
            JobSpec::DispatchLimitOrders {
                position,
                child_block: limits_block,
            },
            block,
            6,
        )
        .with_child_block(limits_block),
        Step::new(JobSpec::PlaceProfitOrder { position }, block, 7),
        Step::new(JobSpec::PlaceStopLossOrder { position }, block, 8),
        Step::new(JobSpec::ActivatePosition { position }, block, 9),
    ]
}

/// SyncPositionOrders: parallel api-sync over the given orders.
pub fn sync_orders_steps(orders: impl IntoIterator<Item = OrderId>) -> Vec<Step> {
    let block = Uuid::new_v4();
    orders
        .into_iter()
        .map(|order| Step::new(JobSpec::SyncOrder { order }, block, 0))
        .collect()
}

/// WAP-recalc: verify the TP is still resting, then recompute and move it.
pub fn wap_recalc_steps(position: PositionId) -> Vec<Step> {
    let block = Uuid::new_v4();
    vec![
        Step::new(JobSpec::VerifyIfTpIsFilled { position }, block, 0),
        Step::new(
            JobSpec::CalculateWapAndModifyProfitOrder { position },
            block,
            1,
        ),
    ]
}

/// SmartReplaceOrders: one verification step; the branch (close vs recreate)
/// is enqueued by its `complete`.
pub fn smart_replace_steps(position: PositionId) -> Vec<Step> {
    vec![Step::new(
        JobSpec::VerifyPositionExistsOnExchange { position },
        Uuid::new_v4(),
        0,
    )]
}

/// ClosePosition: the §close sequence, strictly ordered.
pub fn close_position_steps(position: PositionId) -> Vec<Step> {
    let block = Uuid::new_v4();
    vec![
        Step::new(JobSpec::CancelPositionOpenOrders { position }, block, 0),
        Step::new(JobSpec::CancelAlgoOpenOrders { position }, block, 1),
        Step::new(JobSpec::ClosePositionAtomically { position }, block, 2),
        Step::new(JobSpec::VerifyPositionResidualAmount { position }, block, 3),
        Step::new(JobSpec::ApplyPumpCooldown { position }, block, 4),
        Step::new(JobSpec::UpdateRemainingClosingData { position }, block, 5),
    ]
}

/// CancelPosition: cancel everything resting, then settle the status.
pub fn cancel_position_steps(position: PositionId) -> Vec<Step> {
    let block = Uuid::new_v4();
    vec![
        Step::new(JobSpec::CancelPositionOpenOrders { position }, block, 0),
        Step::new(JobSpec::CancelAlgoOpenOrders { position }, block, 1),
        Step::new(JobSpec::FinishCancellation { position }, block, 2),
    ]
}

/// Instantiate the atomic job a step names.
pub fn instantiate(spec: &JobSpec) -> Box<dyn AtomicJob> {
    match spec.clone() {
        JobSpec::PreparePosition { position } => Box::new(open::PreparePosition::new(position)),
        JobSpec::VerifyNotional { position } => Box::new(open::VerifyNotional::new(position)),
        JobSpec::SetMarginMode { position } => Box::new(open::SetMarginMode::new(position)),
        JobSpec::DetermineLeverage { position } => {
            Box::new(open::DetermineLeverage::new(position))
        }
        JobSpec::SetLeverage { position } => Box::new(open::SetLeverage::new(position)),
        JobSpec::PlaceMarketOrder { position } => Box::new(open::PlaceMarketOrder::new(position)),
        JobSpec::DispatchLimitOrders {
            position,
            child_block,
        } => Box::new(open::DispatchLimitOrders::new(position, child_block)),
        JobSpec::PlaceLimitOrder {
            position,
            rung_index,
        } => Box::new(open::PlaceLimitOrder::new(position, rung_index)),
        JobSpec::PlaceProfitOrder { position } => Box::new(open::PlaceProfitOrder::new(position)),
        JobSpec::PlaceStopLossOrder { position } => {
            Box::new(open::PlaceStopLossOrder::new(position))
        }
        JobSpec::ActivatePosition { position } => Box::new(open::ActivatePosition::new(position)),
        JobSpec::SyncOrder { order } => Box::new(sync::SyncOrder::new(order)),
        JobSpec::VerifyIfTpIsFilled { position } => {
            Box::new(wap::VerifyIfTpIsFilled::new(position))
        }
        JobSpec::CalculateWapAndModifyProfitOrder { position } => {
            Box::new(wap::CalculateWapAndModifyProfitOrder::new(position))
        }
        JobSpec::CorrectModifiedOrder { order } => {
            Box::new(drift::CorrectModifiedOrder::new(order))
        }
        JobSpec::CancelSingleAlgoOrder { order } => {
            Box::new(drift::CancelSingleAlgoOrder::new(order))
        }
        JobSpec::RecreateCancelledOrder { order } => {
            Box::new(drift::RecreateCancelledOrder::new(order))
        }
        JobSpec::VerifyPositionExistsOnExchange { position } => {
            Box::new(replace::VerifyPositionExistsOnExchange::new(position))
        }
        JobSpec::RecreateMissingOrders { position } => {
            Box::new(replace::RecreateMissingOrders::new(position))
        }
        JobSpec::CancelPositionOpenOrders { position } => {
            Box::new(close::CancelPositionOpenOrders::new(position))
        }
        JobSpec::CancelAlgoOpenOrders { position } => {
            Box::new(close::CancelAlgoOpenOrders::new(position))
        }
        JobSpec::ClosePositionAtomically { position } => {
            Box::new(close::ClosePositionAtomically::new(position))
        }
        JobSpec::VerifyPositionResidualAmount { position } => {
            Box::new(close::VerifyPositionResidualAmount::new(position))
        }
        JobSpec::ApplyPumpCooldown { position } => {
            Box::new(close::ApplyPumpCooldown::new(position))
        }
        JobSpec::UpdateRemainingClosingData { position } => {
            Box::new(close::UpdateRemainingClosingData::new(position))
        }
        JobSpec::FinishCancellation { position } => {
            Box::new(close::FinishCancellation::new(position))
        }
    }
}

/// Deterministic client order id for a position leg; `tag` names the leg
/// (mkt, l1.., tp, sl, cls) and `nonce` disambiguates recreations.
pub(crate) fn client_order_id(position: PositionId, tag: &str, nonce: Option<u64>) -> SmolStr {
    match nonce {
        Some(nonce) => SmolStr::new(format!("esc-{}-{tag}-{nonce}", position.0)),
        None => SmolStr::new(format!("esc-{}-{tag}", position.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_workflow_is_strictly_sequenced_with_a_ladder_child() {
        let steps = open_position_steps(PositionId(7));
        assert_eq!(steps.len(), 10);
        let indexes: Vec<u32> = steps.iter().map(|step| step.index).collect();
        assert_eq!(indexes, (0..10).collect::<Vec<u32>>());
        let dispatch = &steps[6];
        assert!(dispatch.child_block_uuid.is_some());
        assert_eq!(dispatch.job.name(), "DispatchLimitOrders");
    }

    #[test]
    fn every_spec_instantiates() {
        let specs = vec![
            JobSpec::PreparePosition { position: PositionId(1) },
            JobSpec::SyncOrder { order: OrderId(1) },
            JobSpec::CorrectModifiedOrder { order: OrderId(1) },
            JobSpec::FinishCancellation { position: PositionId(1) },
        ];
        for spec in specs {
            assert_eq!(instantiate(&spec).name(), spec.name());
        }
    }
}
