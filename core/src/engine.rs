//! Engine wiring and the step executor.
//!
//! The [`Engine`] owns the store, the snapshot cache, the step queue, the
//! notifier and the per-account adapters, and executes claimed steps under
//! the concurrency discipline: a per-position mutex for anything that
//! mutates position state, and a per-account semaphore capping concurrent
//! steps per account.

use crate::{
    config::EngineConfig,
    domain::{
        account::Account,
        position::Position,
        AccountId, PositionId,
    },
    error::EngineError,
    job::{AdapterRegistry, JobContext, JobResult, JobRunner},
    notify::Notifier,
    snapshot::ApiSnapshotCache,
    step::{InMemoryStepQueue, Step, StepQueue, StepStatus},
    store::StateStore,
    workflow,
};
use chrono::Utc;
use escada_exchange::ExchangeAdapter;
use escada_markets::{Direction, SymbolKey};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Engine {
    pub store: Arc<StateStore>,
    pub snapshots: Arc<ApiSnapshotCache>,
    pub queue: Arc<InMemoryStepQueue>,
    pub notifier: Arc<dyn Notifier>,
    pub adapters: Arc<AdapterRegistry>,
    pub config: EngineConfig,
    runner: JobRunner,
    position_locks: Mutex<FnvHashMap<PositionId, Arc<tokio::sync::Mutex<()>>>>,
    account_slots: Mutex<FnvHashMap<AccountId, Arc<Semaphore>>>,
}

impl Engine {
    pub fn new(config: EngineConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store: Arc::new(StateStore::new()),
            snapshots: Arc::new(ApiSnapshotCache::new(config.snapshot_ttl_secs)),
            queue: Arc::new(InMemoryStepQueue::new()),
            notifier,
            adapters: Arc::new(AdapterRegistry::new()),
            runner: JobRunner::new(config.job_budget),
            config,
            position_locks: Mutex::new(FnvHashMap::default()),
            account_slots: Mutex::new(FnvHashMap::default()),
        }
    }

    /// The context handed to every atomic job.
    pub fn context(&self) -> JobContext {
        JobContext {
            store: Arc::clone(&self.store),
            snapshots: Arc::clone(&self.snapshots),
            queue: self.queue.clone() as Arc<dyn StepQueue>,
            notifier: Arc::clone(&self.notifier),
            adapters: Arc::clone(&self.adapters),
            config: self.config.clone(),
        }
    }

    pub fn register_account(&self, account: Account, adapter: Arc<dyn ExchangeAdapter>) {
        self.adapters.register(account.id, adapter);
        self.store.insert_account(account);
    }

    /// Admission-checked position creation: kill-switch, account and symbol
    /// gates are re-read here, atomically with the slot reservation.
    pub fn open_position(
        &self,
        account_id: AccountId,
        symbol: SymbolKey,
        direction: Direction,
    ) -> Result<PositionId, EngineError> {
        if !self.store.flags().allow_opening_positions {
            return Err(EngineError::Admission(
                "kill-switch: opening positions is disabled".into(),
            ));
        }
        let account = self.store.account(account_id)?;
        if !account.can_trade {
            return Err(EngineError::Admission(format!(
                "account {account_id} is not allowed to trade"
            )));
        }
        let exchange_symbol = self.store.symbol(&symbol)?;
        if !exchange_symbol.is_tradeable(Utc::now()) {
            return Err(EngineError::Admission(format!(
                "symbol {symbol} is cooling down until {:?}",
                exchange_symbol.tradeable_at
            )));
        }

        let position = Position::new(
            PositionId(self.store.next_id()),
            account_id,
            symbol,
            direction,
            account.profit_percentage,
            exchange_symbol.total_limit_orders,
        );
        let id = self.store.create_position(position)?;
        self.queue.enqueue(workflow::open_position_steps(id));
        info!(position = %id, %direction, "position admitted, open workflow enqueued");
        Ok(id)
    }

    /// Operator-initiated close.
    pub fn request_close(&self, position: PositionId) -> Result<(), EngineError> {
        self.store
            .transition_position(position, Position::mark_closing)?;
        self.queue.enqueue(workflow::close_position_steps(position));
        Ok(())
    }

    /// Operator-initiated cancel.
    pub fn request_cancel(&self, position: PositionId) -> Result<(), EngineError> {
        self.store
            .transition_position(position, Position::mark_cancelling)?;
        self.queue.enqueue(workflow::cancel_position_steps(position));
        Ok(())
    }

    /// Enqueue the sync workflow for one position: one parallel step per
    /// syncable order, deduplicated against steps already in flight.
    pub fn enqueue_sync(&self, position: PositionId) {
        let orders: Vec<_> = self
            .store
            .orders_for_position(position)
            .into_iter()
            .filter(|order| order.is_syncable())
            .filter(|order| {
                !self.queue.has_active_spec(&crate::step::JobSpec::SyncOrder {
                    order: order.id,
                })
            })
            .map(|order| order.id)
            .collect();
        if orders.is_empty() {
            return;
        }
        debug!(position = %position, count = orders.len(), "sync workflow enqueued");
        self.queue.enqueue(workflow::sync_orders_steps(orders));
    }

    fn position_lock(&self, position: PositionId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.position_locks
                .lock()
                .entry(position)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    fn account_slots(&self, account: AccountId) -> Arc<Semaphore> {
        Arc::clone(
            self.account_slots
                .lock()
                .entry(account)
                .or_insert_with(|| Arc::new(Semaphore::new(self.config.per_account_concurrency))),
        )
    }

    fn account_of(&self, step: &Step) -> Option<AccountId> {
        let position = match step.job.position_id() {
            Some(position) => position,
            None => {
                let order = step.job.order_id()?;
                self.store.order(order).ok()?.position_id
            }
        };
        self.store
            .position(position)
            .ok()
            .map(|position| position.account_id)
    }

    /// Execute one claimed step through the job runner and settle it.
    pub async fn run_step(&self, step: Step) {
        let ctx = self.context();

        let _slot = match self.account_of(&step) {
            Some(account) => {
                let semaphore = self.account_slots(account);
                Some(semaphore.acquire_owned().await)
            }
            None => None,
        };

        // at-most-one mutating workflow per position; order-scoped syncs
        // commit to distinct rows and run in parallel
        let lock = step
            .job
            .is_position_mutating()
            .then(|| {
                step.job
                    .position_id()
                    .or_else(|| {
                        step.job
                            .order_id()
                            .and_then(|order| self.store.order(order).ok())
                            .map(|order| order.position_id)
                    })
                    .map(|position| self.position_lock(position))
            })
            .flatten();
        let _guard = match &lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let mut job = workflow::instantiate(&step.job);
        let result = self.runner.run(job.as_mut(), &ctx).await;
        let (status, message) = match result {
            JobResult::Completed(outcome) => (StepStatus::Done, outcome.summary),
            JobResult::Skipped(reason) => (StepStatus::Skipped, reason),
            JobResult::ShortCircuited(reason) => (StepStatus::Failed, reason),
            JobResult::Failed(error) => (StepStatus::Failed, error.to_string()),
        };
        debug!(step = %step.id, job = step.job.name(), ?status, %message, "step settled");
        self.queue.mark(step.id, status, Some(message));
    }

    /// Run every runnable step to quiescence. The scheduler calls this each
    /// tick; tests use it to drive workflows deterministically.
    pub async fn drain(&self) {
        while let Some(step) = self.queue.claim_next() {
            self.run_step(step).await;
        }
    }
}
