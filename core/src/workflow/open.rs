//! The open-position workflow.
//!
//! Sequential: Prepare -> VerifyNotional -> SetMarginMode ->
//! DetermineLeverage -> SetLeverage -> PlaceMarket -> DispatchLimits
//! (fan-out, parallel rungs) -> PlaceProfit -> PlaceStopLoss -> Activate.
//!
//! Every job re-checks the position status in `start_or_fail`, which is what
//! keeps the sequence idempotent when the queue redelivers a step.

use crate::{
    domain::{order::Order, position::{Position, PositionStatus}, OrderId, PositionId},
    job::{AtomicJob, JobContext, JobError, JobOutcome},
    snapshot::{SnapshotKey, SnapshotPayload},
    step::{JobSpec, Step},
    workflow::client_order_id,
};
use async_trait::async_trait;
use chrono::Utc;
use escada_exchange::model::{CanonicalOrderStatus, OrderKind, PlaceOrderRequest};
use escada_markets::decimal::percent_of;
use escada_planner::{ladder_divider, plan_unbounded_position, PositionPlan};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

fn plan_of(position: &Position) -> Result<PositionPlan, JobError> {
    position
        .plan
        .clone()
        .ok_or_else(|| JobError::StatePrecondition("position has no plan yet".into()))
}

/// Guard + snapshot capture: marks the position `opening`, caches balance
/// and mark price, fixes the margin allocation.
#[derive(Debug)]
pub struct PreparePosition {
    position: PositionId,
}

impl PreparePosition {
    pub fn new(position: PositionId) -> Self {
        Self { position }
    }
}

#[async_trait]
impl AtomicJob for PreparePosition {
    fn name(&self) -> &'static str {
        "PreparePosition"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let (position, account, symbol, _) = ctx.position_context(self.position)?;
        if position.status != PositionStatus::New {
            return Ok(false);
        }
        // the kill-switch is re-read once per new-position attempt
        if !ctx.store.flags().allow_opening_positions {
            return Ok(false);
        }
        if !account.can_trade {
            return Ok(false);
        }
        if !symbol.is_tradeable(Utc::now()) {
            return Ok(false);
        }
        Ok(true)
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, account, symbol, adapter) = ctx.position_context(self.position)?;
        ctx.store
            .transition_position(self.position, Position::mark_opening)?;

        let balance = adapter.balance().await?;
        ctx.snapshots.put(
            account.id,
            SnapshotKey::AccountBalance,
            SnapshotPayload::Balance(balance.clone()),
        );

        let mark = adapter.mark_price(&symbol).await?;
        ctx.store.update_symbol(&position.symbol, |symbol| {
            symbol.mark_price = Some(mark);
            symbol.mark_price_synced_at = Some(Utc::now());
            symbol.has_stale_price = false;
        })?;

        let margin = percent_of(balance.wallet, account.max_position_percentage)?;
        ctx.store.update_position(self.position, |position| {
            position.margin = margin;
        })?;

        Ok(JobOutcome::new(format!(
            "margin {margin} allocated at mark {mark}"
        )))
    }

    async fn complete(&mut self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }
}

/// Rejects positions whose market leg could not meet the venue's minimum
/// notional even at the requested leverage cap.
#[derive(Debug)]
pub struct VerifyNotional {
    position: PositionId,
}

impl VerifyNotional {
    pub fn new(position: PositionId) -> Self {
        Self { position }
    }
}

#[async_trait]
impl AtomicJob for VerifyNotional {
    fn name(&self) -> &'static str {
        "VerifyNotional"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        Ok(ctx.position(self.position)?.status == PositionStatus::Opening)
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, account, symbol, _) = ctx.position_context(self.position)?;
        let divider = ladder_divider(
            &symbol.limit_quantity_multipliers,
            position.total_limit_orders,
        );
        let cap = Decimal::from(account.leverage_cap(position.direction));
        let market_notional = position.margin * cap / divider;
        if market_notional < symbol.min_notional {
            return Err(JobError::InvalidInput(format!(
                "market notional {market_notional} below venue minimum {}",
                symbol.min_notional
            )));
        }
        Ok(JobOutcome::new(format!(
            "market notional {market_notional} clears minimum {}",
            symbol.min_notional
        )))
    }

    async fn complete(&mut self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }
}

/// Pushes the account's margin mode to the venue.
#[derive(Debug)]
pub struct SetMarginMode {
    position: PositionId,
}

impl SetMarginMode {
    pub fn new(position: PositionId) -> Self {
        Self { position }
    }
}

#[async_trait]
impl AtomicJob for SetMarginMode {
    fn name(&self) -> &'static str {
        "SetMarginMode"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        Ok(ctx.position(self.position)?.status == PositionStatus::Opening)
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, account, symbol, adapter) = ctx.position_context(self.position)?;
        adapter
            .set_margin_mode(
                &symbol,
                account.margin_mode,
                Some(account.leverage_cap(position.direction)),
            )
            .await?;
        Ok(JobOutcome::new(format!("margin mode {}", account.margin_mode)))
    }

    async fn complete(&mut self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }
}

/// Fetches the venue bracket table and runs the planner; persists the full
/// position plan (leverage, market leg, ladder).
#[derive(Debug)]
pub struct DetermineLeverage {
    position: PositionId,
}

impl DetermineLeverage {
    pub fn new(position: PositionId) -> Self {
        Self { position }
    }
}

#[async_trait]
impl AtomicJob for DetermineLeverage {
    fn name(&self) -> &'static str {
        "DetermineLeverage"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        Ok(ctx.position(self.position)?.status == PositionStatus::Opening)
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, account, mut symbol, adapter) = ctx.position_context(self.position)?;

        let brackets = adapter.leverage_brackets(&symbol).await?;
        ctx.store.update_symbol(&position.symbol, |symbol| {
            symbol.leverage_brackets = brackets.clone();
        })?;
        symbol.leverage_brackets = brackets;

        let balance = match ctx.snapshots.fresh_balance(account.id) {
            Some(balance) => balance,
            None => adapter.balance().await?,
        };

        let plan = plan_unbounded_position(
            balance.wallet,
            account.max_position_percentage,
            position.direction,
            symbol.mark_price,
            &symbol,
            account.leverage_cap(position.direction),
            ctx.config.headroom_fraction(),
        )?;

        let summary = format!(
            "leverage {}x, market qty {}, {} rungs",
            plan.leverage,
            plan.market.quantity,
            plan.ladder.rungs.len()
        );
        ctx.store.update_position(self.position, |position| {
            position.margin = plan.margin;
            position.leverage = plan.leverage;
            position.total_limit_orders = plan.ladder.rungs.len() as u32;
            position.plan = Some(plan);
        })?;
        Ok(JobOutcome::new(summary))
    }

    async fn complete(&mut self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }
}

/// Pushes the planned leverage to the venue.
#[derive(Debug)]
pub struct SetLeverage {
    position: PositionId,
}

impl SetLeverage {
    pub fn new(position: PositionId) -> Self {
        Self { position }
    }
}

#[async_trait]
impl AtomicJob for SetLeverage {
    fn name(&self) -> &'static str {
        "SetLeverage"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let position = ctx.position(self.position)?;
        Ok(position.status == PositionStatus::Opening && position.plan.is_some())
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, _, symbol, adapter) = ctx.position_context(self.position)?;
        let plan = plan_of(&position)?;
        adapter.set_leverage(&symbol, plan.leverage).await?;
        Ok(JobOutcome::new(format!("leverage {}x", plan.leverage)))
    }

    async fn complete(&mut self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }
}

/// Places the market entry leg and waits for its fill.
#[derive(Debug)]
pub struct PlaceMarketOrder {
    position: PositionId,
    order: Option<OrderId>,
    fill: Option<escada_exchange::model::OrderSnapshot>,
}

impl PlaceMarketOrder {
    pub fn new(position: PositionId) -> Self {
        Self {
            position,
            order: None,
            fill: None,
        }
    }
}

#[async_trait]
impl AtomicJob for PlaceMarketOrder {
    fn name(&self) -> &'static str {
        "PlaceMarketOrder"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let position = ctx.position(self.position)?;
        if position.status != PositionStatus::Opening || position.plan.is_none() {
            return Ok(false);
        }
        // replay: an already-placed market leg must not be placed twice
        let existing = ctx
            .store
            .orders_for_position(self.position)
            .into_iter()
            .find(|order| order.kind == OrderKind::Market && !order.is_exit());
        match existing {
            Some(order) if order.exchange_order_id.is_some() => Ok(false),
            Some(order) => {
                self.order = Some(order.id);
                Ok(true)
            }
            None => Ok(true),
        }
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, _, symbol, adapter) = ctx.position_context(self.position)?;
        let plan = plan_of(&position)?;

        let order_id = match self.order {
            Some(id) => id,
            None => {
                let order = Order::new(
                    OrderId(ctx.store.next_id()),
                    self.position,
                    OrderKind::Market,
                    position.direction.entry_side(),
                    position.direction,
                    plan.reference_price,
                    plan.market.quantity,
                    client_order_id(self.position, "mkt", None),
                    false,
                );
                ctx.store.create_order(order)
            }
        };
        self.order = Some(order_id);

        let order = ctx.order(order_id)?;
        let ack = adapter
            .place_order(
                &symbol,
                &PlaceOrderRequest {
                    side: order.side,
                    direction: order.position_side,
                    kind: OrderKind::Market,
                    quantity: order.quantity,
                    price: None,
                    stop_price: None,
                    client_order_id: order.client_order_id.clone(),
                    reduce_only: false,
                },
            )
            .await?;
        ctx.store.update_order(order_id, |order| {
            order.exchange_order_id = Some(ack.exchange_order_id.clone());
        })?;
        Ok(JobOutcome::new(format!(
            "market leg {} placed as {}",
            order.quantity, ack.exchange_order_id
        )))
    }

    async fn double_check(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let order_id = self
            .order
            .ok_or_else(|| JobError::StatePrecondition("no market order".into()))?;
        let (_, _, symbol, adapter) = ctx.position_context(self.position)?;
        let order = ctx.order(order_id)?;
        let Some(reference) = order.order_ref() else {
            return Ok(false);
        };
        let snapshot = adapter.query_order(&symbol, &reference).await?;
        if snapshot.status == CanonicalOrderStatus::Filled {
            self.fill = Some(snapshot);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        let order_id = self
            .order
            .ok_or_else(|| JobError::StatePrecondition("no market order".into()))?;
        let fill = self
            .fill
            .take()
            .ok_or_else(|| JobError::Transient("market fill not captured".into()))?;
        let opening_price = fill.average_price.unwrap_or(fill.price);
        let filled = fill.filled_quantity;

        ctx.store.update_order(order_id, |order| {
            order.apply_snapshot(&fill);
            order.capture_reference();
        })?;
        ctx.store.update_position(self.position, |position| {
            position.opening_price = Some(opening_price);
            position.quantity = filled;
        })?;
        info!(position = %self.position, %opening_price, %filled, "market leg filled");
        Ok(())
    }
}

/// Fans the ladder out into the child block, one step per planned rung.
#[derive(Debug)]
pub struct DispatchLimitOrders {
    position: PositionId,
    child_block: Uuid,
}

impl DispatchLimitOrders {
    pub fn new(position: PositionId, child_block: Uuid) -> Self {
        Self {
            position,
            child_block,
        }
    }
}

#[async_trait]
impl AtomicJob for DispatchLimitOrders {
    fn name(&self) -> &'static str {
        "DispatchLimitOrders"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let position = ctx.position(self.position)?;
        Ok(position.status == PositionStatus::Opening && position.plan.is_some())
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let position = ctx.position(self.position)?;
        let plan = plan_of(&position)?;
        let mut dispatched = 0;
        let mut steps = Vec::new();
        for rung in &plan.ladder.rungs {
            let spec = JobSpec::PlaceLimitOrder {
                position: self.position,
                rung_index: rung.index,
            };
            if ctx.queue.has_active_spec(&spec) {
                continue;
            }
            steps.push(Step::new(spec, self.child_block, 0));
            dispatched += 1;
        }
        ctx.queue.enqueue(steps);
        Ok(JobOutcome::new(format!("{dispatched} rungs dispatched")))
    }

    async fn complete(&mut self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }
}

/// Places one ladder rung.
#[derive(Debug)]
pub struct PlaceLimitOrder {
    position: PositionId,
    rung_index: u32,
    order: Option<OrderId>,
    resting: Option<escada_exchange::model::OrderSnapshot>,
}

impl PlaceLimitOrder {
    pub fn new(position: PositionId, rung_index: u32) -> Self {
        Self {
            position,
            rung_index,
            order: None,
            resting: None,
        }
    }
}

#[async_trait]
impl AtomicJob for PlaceLimitOrder {
    fn name(&self) -> &'static str {
        "PlaceLimitOrder"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let position = ctx.position(self.position)?;
        if position.status != PositionStatus::Opening || position.plan.is_none() {
            return Ok(false);
        }
        let existing = ctx
            .store
            .orders_for_position(self.position)
            .into_iter()
            .find(|order| order.rung_index == Some(self.rung_index));
        match existing {
            Some(order) if order.exchange_order_id.is_some() => Ok(false),
            Some(order) => {
                self.order = Some(order.id);
                Ok(true)
            }
            None => Ok(true),
        }
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, _, symbol, adapter) = ctx.position_context(self.position)?;
        let plan = plan_of(&position)?;
        let rung = plan
            .ladder
            .rungs
            .iter()
            .find(|rung| rung.index == self.rung_index)
            .ok_or_else(|| {
                JobError::StatePrecondition(format!("rung {} not in plan", self.rung_index))
            })?;

        let order_id = match self.order {
            Some(id) => id,
            None => {
                let order = Order::new(
                    OrderId(ctx.store.next_id()),
                    self.position,
                    OrderKind::Limit,
                    position.direction.entry_side(),
                    position.direction,
                    rung.price,
                    rung.quantity,
                    client_order_id(self.position, &format!("l{}", self.rung_index), None),
                    false,
                )
                .with_rung(self.rung_index);
                ctx.store.create_order(order)
            }
        };
        self.order = Some(order_id);

        let order = ctx.order(order_id)?;
        let ack = adapter
            .place_order(
                &symbol,
                &PlaceOrderRequest {
                    side: order.side,
                    direction: order.position_side,
                    kind: OrderKind::Limit,
                    quantity: order.quantity,
                    price: Some(order.price),
                    stop_price: None,
                    client_order_id: order.client_order_id.clone(),
                    reduce_only: false,
                },
            )
            .await?;
        ctx.store.update_order(order_id, |order| {
            order.exchange_order_id = Some(ack.exchange_order_id.clone());
        })?;
        Ok(JobOutcome::new(format!(
            "rung {} placed: {} @ {}",
            self.rung_index, order.quantity, order.price
        )))
    }

    async fn double_check(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let order_id = self
            .order
            .ok_or_else(|| JobError::StatePrecondition("no rung order".into()))?;
        let (_, _, symbol, adapter) = ctx.position_context(self.position)?;
        let order = ctx.order(order_id)?;
        let Some(reference) = order.order_ref() else {
            return Ok(false);
        };
        let snapshot = adapter.query_order(&symbol, &reference).await?;
        if snapshot.status.is_working() {
            self.resting = Some(snapshot);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        let order_id = self
            .order
            .ok_or_else(|| JobError::StatePrecondition("no rung order".into()))?;
        let resting = self
            .resting
            .take()
            .ok_or_else(|| JobError::Transient("resting snapshot not captured".into()))?;
        ctx.store.update_order(order_id, |order| {
            order.apply_snapshot(&resting);
            order.capture_reference();
        })?;
        Ok(())
    }
}

/// Places the take-profit leg from the opening price.
#[derive(Debug)]
pub struct PlaceProfitOrder {
    position: PositionId,
    order: Option<OrderId>,
    resting: Option<escada_exchange::model::OrderSnapshot>,
    target: Option<Decimal>,
}

impl PlaceProfitOrder {
    pub fn new(position: PositionId) -> Self {
        Self {
            position,
            order: None,
            resting: None,
            target: None,
        }
    }
}

#[async_trait]
impl AtomicJob for PlaceProfitOrder {
    fn name(&self) -> &'static str {
        "PlaceProfitOrder"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let position = ctx.position(self.position)?;
        if position.status != PositionStatus::Opening || position.opening_price.is_none() {
            return Ok(false);
        }
        let existing = ctx
            .store
            .orders_for_position(self.position)
            .into_iter()
            .find(|order| order.kind == OrderKind::ProfitLimit);
        match existing {
            Some(order) if order.exchange_order_id.is_some() => Ok(false),
            Some(order) => {
                self.order = Some(order.id);
                Ok(true)
            }
            None => Ok(true),
        }
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, account, symbol, adapter) = ctx.position_context(self.position)?;
        let capabilities = adapter.capabilities();
        let basis = position
            .opening_price
            .ok_or_else(|| JobError::StatePrecondition("no opening price".into()))?;
        let mark = adapter.mark_price(&symbol).await?;
        let target = escada_planner::profit_price(
            position.direction,
            basis,
            account.profit_percentage,
            Some(mark),
            &symbol,
        )?;
        self.target = Some(target);
        let quantity = if capabilities.position_attached_tpsl {
            Decimal::ZERO
        } else {
            position.quantity
        };
        let is_algo = capabilities.is_algo_order(OrderKind::ProfitLimit);

        let order_id = match self.order {
            Some(id) => id,
            None => {
                let order = Order::new(
                    OrderId(ctx.store.next_id()),
                    self.position,
                    OrderKind::ProfitLimit,
                    position.direction.exit_side(),
                    position.direction,
                    target,
                    quantity,
                    client_order_id(self.position, "tp", None),
                    is_algo,
                );
                ctx.store.create_order(order)
            }
        };
        self.order = Some(order_id);

        let order = ctx.order(order_id)?;
        let ack = adapter
            .place_order(
                &symbol,
                &PlaceOrderRequest {
                    side: order.side,
                    direction: order.position_side,
                    kind: OrderKind::ProfitLimit,
                    quantity: order.quantity,
                    price: Some(target),
                    stop_price: None,
                    client_order_id: order.client_order_id.clone(),
                    reduce_only: !capabilities.position_attached_tpsl,
                },
            )
            .await?;
        ctx.store.update_order(order_id, |order| {
            order.exchange_order_id = Some(ack.exchange_order_id.clone());
        })?;
        Ok(JobOutcome::new(format!("take-profit placed @ {target}")))
    }

    async fn double_check(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let order_id = self
            .order
            .ok_or_else(|| JobError::StatePrecondition("no tp order".into()))?;
        let (_, _, symbol, adapter) = ctx.position_context(self.position)?;
        let order = ctx.order(order_id)?;
        let Some(reference) = order.order_ref() else {
            return Ok(false);
        };
        let snapshot = adapter.query_order(&symbol, &reference).await?;
        if snapshot.status.is_working() {
            self.resting = Some(snapshot);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        let order_id = self
            .order
            .ok_or_else(|| JobError::StatePrecondition("no tp order".into()))?;
        let resting = self
            .resting
            .take()
            .ok_or_else(|| JobError::Transient("resting snapshot not captured".into()))?;
        let target = self.target;
        ctx.store.update_order(order_id, |order| {
            order.apply_snapshot(&resting);
            order.capture_reference();
        })?;
        ctx.store.update_position(self.position, |position| {
            if position.first_profit_price.is_none() {
                position.first_profit_price = target;
            }
        })?;
        Ok(())
    }
}

/// Places the stop-loss leg anchored at the last rung.
#[derive(Debug)]
pub struct PlaceStopLossOrder {
    position: PositionId,
    order: Option<OrderId>,
    resting: Option<escada_exchange::model::OrderSnapshot>,
}

impl PlaceStopLossOrder {
    pub fn new(position: PositionId) -> Self {
        Self {
            position,
            order: None,
            resting: None,
        }
    }
}

#[async_trait]
impl AtomicJob for PlaceStopLossOrder {
    fn name(&self) -> &'static str {
        "PlaceStopLossOrder"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let position = ctx.position(self.position)?;
        if position.status != PositionStatus::Opening || position.plan.is_none() {
            return Ok(false);
        }
        let existing = ctx
            .store
            .orders_for_position(self.position)
            .into_iter()
            .find(|order| order.kind == OrderKind::StopMarket);
        match existing {
            Some(order) if order.exchange_order_id.is_some() => Ok(false),
            Some(order) => {
                self.order = Some(order.id);
                Ok(true)
            }
            None => Ok(true),
        }
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, account, symbol, adapter) = ctx.position_context(self.position)?;
        let capabilities = adapter.capabilities();
        let plan = plan_of(&position)?;
        let anchor = plan
            .ladder
            .anchor_price()
            .or(position.opening_price)
            .ok_or_else(|| JobError::StatePrecondition("no stop anchor".into()))?;
        let stop = escada_planner::stop_loss_price(
            position.direction,
            anchor,
            account.stop_market_initial_percentage,
            &symbol,
        )?;
        let quantity = if capabilities.position_attached_tpsl {
            Decimal::ZERO
        } else {
            position.quantity
        };
        let is_algo = capabilities.is_algo_order(OrderKind::StopMarket);

        let order_id = match self.order {
            Some(id) => id,
            None => {
                let order = Order::new(
                    OrderId(ctx.store.next_id()),
                    self.position,
                    OrderKind::StopMarket,
                    position.direction.exit_side(),
                    position.direction,
                    stop,
                    quantity,
                    client_order_id(self.position, "sl", None),
                    is_algo,
                );
                ctx.store.create_order(order)
            }
        };
        self.order = Some(order_id);

        let order = ctx.order(order_id)?;
        let ack = adapter
            .place_order(
                &symbol,
                &PlaceOrderRequest {
                    side: order.side,
                    direction: order.position_side,
                    kind: OrderKind::StopMarket,
                    quantity: order.quantity,
                    price: None,
                    stop_price: Some(stop),
                    client_order_id: order.client_order_id.clone(),
                    reduce_only: !capabilities.position_attached_tpsl,
                },
            )
            .await?;
        ctx.store.update_order(order_id, |order| {
            order.exchange_order_id = Some(ack.exchange_order_id.clone());
        })?;
        Ok(JobOutcome::new(format!(
            "stop-loss placed @ {stop} (anchor {anchor})"
        )))
    }

    async fn double_check(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let order_id = self
            .order
            .ok_or_else(|| JobError::StatePrecondition("no sl order".into()))?;
        let (_, _, symbol, adapter) = ctx.position_context(self.position)?;
        let order = ctx.order(order_id)?;
        let Some(reference) = order.order_ref() else {
            return Ok(false);
        };
        let snapshot = adapter.query_order(&symbol, &reference).await?;
        if snapshot.status.is_working() {
            self.resting = Some(snapshot);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        let order_id = self
            .order
            .ok_or_else(|| JobError::StatePrecondition("no sl order".into()))?;
        let resting = self
            .resting
            .take()
            .ok_or_else(|| JobError::Transient("resting snapshot not captured".into()))?;
        ctx.store.update_order(order_id, |order| {
            order.apply_snapshot(&resting);
            order.capture_reference();
        })?;
        Ok(())
    }
}

/// Activation validation: exact order census and reference equality; any
/// mismatch resolves the position failed without retry cycles.
#[derive(Debug)]
pub struct ActivatePosition {
    position: PositionId,
}

impl ActivatePosition {
    pub fn new(position: PositionId) -> Self {
        Self { position }
    }
}

#[async_trait]
impl AtomicJob for ActivatePosition {
    fn name(&self) -> &'static str {
        "ActivatePosition"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        Ok(ctx.position(self.position)?.status == PositionStatus::Opening)
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, _, _, adapter) = ctx.position_context(self.position)?;
        let tpsl_attached = adapter.capabilities().position_attached_tpsl;
        let orders = ctx.store.orders_for_position(self.position);

        let markets: Vec<_> = orders
            .iter()
            .filter(|order| order.kind == OrderKind::Market)
            .collect();
        let limits: Vec<_> = orders
            .iter()
            .filter(|order| order.kind == OrderKind::Limit)
            .collect();
        let profits: Vec<_> = orders
            .iter()
            .filter(|order| order.kind == OrderKind::ProfitLimit)
            .collect();
        let stops: Vec<_> = orders
            .iter()
            .filter(|order| order.kind == OrderKind::StopMarket)
            .collect();

        if markets.len() != 1
            || limits.len() != position.total_limit_orders as usize
            || profits.len() != 1
            || stops.len() != 1
        {
            return Err(JobError::JustResolve(format!(
                "order census mismatch: {} market, {} limit (expected {}), {} profit, {} stop",
                markets.len(),
                limits.len(),
                position.total_limit_orders,
                profits.len(),
                stops.len()
            )));
        }

        let market = markets[0];
        if market.status != CanonicalOrderStatus::Filled
            || market.reference_status != Some(CanonicalOrderStatus::Filled)
        {
            return Err(JobError::JustResolve(format!(
                "market leg not filled: status {}, reference {:?}",
                market.status, market.reference_status
            )));
        }

        for order in limits.iter().chain(profits.iter()).chain(stops.iter()) {
            if order.status != CanonicalOrderStatus::New
                || order.reference_status != Some(CanonicalOrderStatus::New)
            {
                return Err(JobError::JustResolve(format!(
                    "order {} not resting: status {}, reference {:?}",
                    order.client_order_id, order.status, order.reference_status
                )));
            }
        }

        for order in &orders {
            if order.reference_price != Some(order.price)
                || order.reference_quantity != Some(order.quantity)
            {
                return Err(JobError::JustResolve(format!(
                    "order {} reference mismatch",
                    order.client_order_id
                )));
            }
            let zero_allowed = tpsl_attached && order.is_exit();
            if order.quantity <= Decimal::ZERO && !zero_allowed {
                return Err(JobError::JustResolve(format!(
                    "order {} has zero quantity",
                    order.client_order_id
                )));
            }
        }

        Ok(JobOutcome::new(format!("{} orders validated", orders.len())))
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        ctx.store
            .transition_position(self.position, Position::mark_active)?;
        info!(position = %self.position, "position active");
        Ok(())
    }
}
