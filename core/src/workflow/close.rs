//! The close and cancel sequences.
//!
//! Close: CancelPositionOpenOrders -> CancelAlgoOpenOrders ->
//! ClosePositionAtomically (market reduce) -> VerifyPositionResidualAmount
//! -> ApplyPumpCooldown -> UpdateRemainingClosingData. A residual amount on
//! the venue is an operator alert, never a failure.
//!
//! Cancel shares the first two jobs and settles with FinishCancellation.

use crate::{
    domain::{order::Order, position::{Position, PositionStatus}, OrderId, PositionId},
    job::{AtomicJob, JobContext, JobError, JobOutcome},
    notify::DeliveryGroup,
    workflow::client_order_id,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use escada_exchange::model::{
    position_key, CanonicalOrderStatus, KlineInterval, OrderKind, PlaceOrderRequest,
};
use escada_markets::decimal::div_scaled;
use rust_decimal::Decimal;
use tracing::{info, warn};

fn closing_or_cancelling(status: PositionStatus) -> bool {
    matches!(status, PositionStatus::Closing | PositionStatus::Cancelling)
}

/// Cancel every resting non-algo order on the position's symbol.
#[derive(Debug)]
pub struct CancelPositionOpenOrders {
    position: PositionId,
}

impl CancelPositionOpenOrders {
    pub fn new(position: PositionId) -> Self {
        Self { position }
    }
}

#[async_trait]
impl AtomicJob for CancelPositionOpenOrders {
    fn name(&self) -> &'static str {
        "CancelPositionOpenOrders"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        Ok(closing_or_cancelling(ctx.position(self.position)?.status))
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (_, _, symbol, adapter) = ctx.position_context(self.position)?;
        // capability flag decides between one call and an iterated sweep
        if adapter.capabilities().supports_cancel_all_by_symbol {
            adapter.cancel_all_orders(&symbol).await?;
        } else {
            for order in ctx.store.orders_for_position(self.position) {
                if order.is_algo || !order.status.is_working() {
                    continue;
                }
                if let Some(reference) = order.order_ref() {
                    adapter.cancel_order(&symbol, &reference).await?;
                }
            }
        }
        Ok(JobOutcome::new("resting orders cancelled"))
    }

    async fn double_check(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let (_, _, symbol, adapter) = ctx.position_context(self.position)?;
        let resting = adapter.open_orders(&symbol).await?;
        Ok(resting.iter().all(|snapshot| snapshot.is_algo))
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        // intentional cancellation: status and reference move together
        for order in ctx.store.orders_for_position(self.position) {
            if order.is_algo || !order.status.is_working() {
                continue;
            }
            ctx.store.update_order(order.id, |order| {
                order.status = CanonicalOrderStatus::Cancelled;
                order.reference_status = Some(CanonicalOrderStatus::Cancelled);
            })?;
        }
        Ok(())
    }
}

/// Cancel every resting algo order through the algo endpoints.
#[derive(Debug)]
pub struct CancelAlgoOpenOrders {
    position: PositionId,
}

impl CancelAlgoOpenOrders {
    pub fn new(position: PositionId) -> Self {
        Self { position }
    }
}

#[async_trait]
impl AtomicJob for CancelAlgoOpenOrders {
    fn name(&self) -> &'static str {
        "CancelAlgoOpenOrders"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        Ok(closing_or_cancelling(ctx.position(self.position)?.status))
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (_, _, symbol, adapter) = ctx.position_context(self.position)?;
        let mut cancelled = 0;
        for order in ctx.store.orders_for_position(self.position) {
            if !order.is_algo || !order.status.is_working() {
                continue;
            }
            if let Some(reference) = order.order_ref() {
                match adapter.cancel_order(&symbol, &reference).await {
                    Ok(_) => cancelled += 1,
                    Err(escada_exchange::AdapterError::OrderNotFound) => {}
                    Err(error) => return Err(error.into()),
                }
            }
        }
        Ok(JobOutcome::new(format!("{cancelled} algo orders cancelled")))
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        for order in ctx.store.orders_for_position(self.position) {
            if !order.is_algo || !order.status.is_working() {
                continue;
            }
            ctx.store.update_order(order.id, |order| {
                order.status = CanonicalOrderStatus::Cancelled;
                order.reference_status = Some(CanonicalOrderStatus::Cancelled);
            })?;
        }
        Ok(())
    }
}

/// Market-reduce whatever the venue still holds for this position.
#[derive(Debug)]
pub struct ClosePositionAtomically {
    position: PositionId,
    close_order: Option<OrderId>,
}

impl ClosePositionAtomically {
    pub fn new(position: PositionId) -> Self {
        Self {
            position,
            close_order: None,
        }
    }
}

#[async_trait]
impl AtomicJob for ClosePositionAtomically {
    fn name(&self) -> &'static str {
        "ClosePositionAtomically"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let (position, _, symbol, adapter) = ctx.position_context(self.position)?;
        if !closing_or_cancelling(position.status) {
            return Ok(false);
        }
        // nothing to reduce when the venue carries no amount
        let positions = adapter.positions().await?;
        let key = position_key(
            &adapter.format_pair(&symbol),
            position.direction,
            adapter.capabilities().hedge_mode,
        );
        Ok(positions
            .get(&key)
            .map(|venue| !venue.amount.is_zero())
            .unwrap_or(false))
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, _, symbol, adapter) = ctx.position_context(self.position)?;
        let positions = adapter.positions().await?;
        let key = position_key(
            &adapter.format_pair(&symbol),
            position.direction,
            adapter.capabilities().hedge_mode,
        );
        let amount = positions
            .get(&key)
            .map(|venue| venue.amount.abs())
            .unwrap_or(Decimal::ZERO);
        if amount.is_zero() {
            return Ok(JobOutcome::new("nothing to reduce"));
        }

        let order = Order::new(
            OrderId(ctx.store.next_id()),
            self.position,
            OrderKind::Market,
            position.direction.exit_side(),
            position.direction,
            Decimal::ZERO,
            amount,
            client_order_id(self.position, "cls", Some(ctx.store.next_id())),
            false,
        );
        let order_id = ctx.store.create_order(order);
        self.close_order = Some(order_id);

        let request = {
            let order = ctx.order(order_id)?;
            PlaceOrderRequest {
                side: order.side,
                direction: order.position_side,
                kind: OrderKind::Market,
                quantity: order.quantity,
                price: None,
                stop_price: None,
                client_order_id: order.client_order_id.clone(),
                reduce_only: true,
            }
        };
        let ack = adapter.place_order(&symbol, &request).await?;
        ctx.store.update_order(order_id, |order| {
            order.exchange_order_id = Some(ack.exchange_order_id.clone());
        })?;
        Ok(JobOutcome::new(format!("market reduce of {amount} placed")))
    }

    async fn double_check(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        let Some(order_id) = self.close_order else {
            return Ok(true);
        };
        let order = ctx.order(order_id)?;
        let (_, _, symbol, adapter) = ctx.position_context(self.position)?;
        let Some(reference) = order.order_ref() else {
            return Ok(false);
        };
        let snapshot = adapter.query_order(&symbol, &reference).await?;
        Ok(snapshot.status == CanonicalOrderStatus::Filled)
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        if let Some(order_id) = self.close_order {
            ctx.store.update_order(order_id, |order| {
                order.status = CanonicalOrderStatus::Filled;
                order.filled_quantity = order.quantity;
                order.capture_reference();
            })?;
        }
        Ok(())
    }
}

/// Residual check: a leftover amount is surfaced to the operator, not a
/// failure.
#[derive(Debug)]
pub struct VerifyPositionResidualAmount {
    position: PositionId,
}

impl VerifyPositionResidualAmount {
    pub fn new(position: PositionId) -> Self {
        Self { position }
    }
}

#[async_trait]
impl AtomicJob for VerifyPositionResidualAmount {
    fn name(&self) -> &'static str {
        "VerifyPositionResidualAmount"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        Ok(closing_or_cancelling(ctx.position(self.position)?.status))
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, _, symbol, adapter) = ctx.position_context(self.position)?;
        let positions = adapter.positions().await?;
        let key = position_key(
            &adapter.format_pair(&symbol),
            position.direction,
            adapter.capabilities().hedge_mode,
        );
        let residual = positions
            .get(&key)
            .map(|venue| venue.amount.abs())
            .unwrap_or(Decimal::ZERO);
        if !residual.is_zero() {
            warn!(position = %self.position, %residual, "residual amount after close");
            ctx.notifier.notify(
                DeliveryGroup::Admin,
                "residual amount after close",
                &format!("position {} left {residual} on the venue", self.position),
            );
        }
        Ok(JobOutcome::new(format!("residual {residual}")))
    }

    async fn complete(&mut self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }
}

/// Pump cooldown: a daily price spike beyond the symbol's threshold gates
/// re-entry for the configured number of hours.
#[derive(Debug)]
pub struct ApplyPumpCooldown {
    position: PositionId,
}

impl ApplyPumpCooldown {
    pub fn new(position: PositionId) -> Self {
        Self { position }
    }
}

#[async_trait]
impl AtomicJob for ApplyPumpCooldown {
    fn name(&self) -> &'static str {
        "ApplyPumpCooldown"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        Ok(ctx.position(self.position)?.status == PositionStatus::Closing)
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (position, _, symbol, adapter) = ctx.position_context(self.position)?;
        let klines = adapter.klines(&symbol, KlineInterval::OneDay, 2).await?;
        let Some(daily) = klines.first() else {
            return Ok(JobOutcome::new("no daily candle available"));
        };
        let daily_close = daily.close;
        if daily_close.is_zero() {
            return Ok(JobOutcome::new("degenerate daily close"));
        }
        let mark = adapter.mark_price(&symbol).await?;
        let change = div_scaled(
            (mark - daily_close).abs() * Decimal::ONE_HUNDRED,
            daily_close,
            8,
        )?;
        if change < symbol.disable_on_price_spike_percentage {
            return Ok(JobOutcome::new(format!("daily change {change}% below threshold")));
        }

        let until = Utc::now() + Duration::hours(symbol.price_spike_cooldown_hours);
        ctx.store.update_symbol(&position.symbol, |symbol| {
            symbol.tradeable_at = Some(until);
        })?;
        warn!(symbol = %position.symbol, %change, %until, "price spike cooldown applied");
        ctx.notifier.notify(
            DeliveryGroup::Admin,
            "price spike cooldown",
            &format!(
                "{} moved {change}% against its daily close; tradeable again at {until}",
                position.symbol
            ),
        );
        Ok(JobOutcome::new(format!("cooldown until {until}")))
    }

    async fn complete(&mut self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }
}

/// Persists the closing data and settles the position `closed`.
#[derive(Debug)]
pub struct UpdateRemainingClosingData {
    position: PositionId,
    closing_price: Option<Decimal>,
}

impl UpdateRemainingClosingData {
    pub fn new(position: PositionId) -> Self {
        Self {
            position,
            closing_price: None,
        }
    }
}

#[async_trait]
impl AtomicJob for UpdateRemainingClosingData {
    fn name(&self) -> &'static str {
        "UpdateRemainingClosingData"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        Ok(ctx.position(self.position)?.status == PositionStatus::Closing)
    }

    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError> {
        let (_, _, symbol, adapter) = ctx.position_context(self.position)?;
        let trades = adapter.trade_history(&symbol, 50).await?;
        let closing_price = match trades.last() {
            Some(trade) => trade.price,
            None => adapter.mark_price(&symbol).await?,
        };
        self.closing_price = Some(closing_price);
        Ok(JobOutcome::new(format!("closing price {closing_price}")))
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        let (position, account, _, _) = ctx.position_context(self.position)?;
        let closing_price = self.closing_price;

        let filled_limits = ctx
            .store
            .orders_for_position(self.position)
            .into_iter()
            .filter(|order| {
                order.kind == OrderKind::Limit && order.status == CanonicalOrderStatus::Filled
            })
            .count() as u32;

        let fast_traded = position
            .opened_at
            .map(|opened| {
                (Utc::now() - opened).num_seconds() < ctx.config.fast_trade_max_secs
            })
            .unwrap_or(false);

        // align every order's reference with its settled status
        for order in ctx.store.orders_for_position(self.position) {
            ctx.store.update_order(order.id, |order| {
                order.reference_status = Some(order.status);
            })?;
        }

        ctx.store.update_position(self.position, |position| {
            position.closing_price = closing_price;
            position.was_fast_traded = fast_traded;
        })?;
        ctx.store
            .transition_position(self.position, Position::mark_closed)?;

        if filled_limits >= account.total_limit_orders_filled_to_notify {
            ctx.notifier.notify(
                DeliveryGroup::HighProfit,
                "ladder recovered into profit",
                &format!(
                    "position {} closed after {filled_limits} rung fills",
                    self.position
                ),
            );
        }
        info!(position = %self.position, ?closing_price, fast_traded, "position closed");
        Ok(())
    }
}

/// Settles a cancelled position.
#[derive(Debug)]
pub struct FinishCancellation {
    position: PositionId,
}

impl FinishCancellation {
    pub fn new(position: PositionId) -> Self {
        Self { position }
    }
}

#[async_trait]
impl AtomicJob for FinishCancellation {
    fn name(&self) -> &'static str {
        "FinishCancellation"
    }

    fn position_id(&self) -> Option<PositionId> {
        Some(self.position)
    }

    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError> {
        Ok(ctx.position(self.position)?.status == PositionStatus::Cancelling)
    }

    async fn compute(&mut self, _ctx: &JobContext) -> Result<JobOutcome, JobError> {
        Ok(JobOutcome::new("cancellation settled"))
    }

    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        ctx.store
            .transition_position(self.position, Position::mark_cancelled)?;
        info!(position = %self.position, "position cancelled");
        Ok(())
    }
}
