//! The atomic-job framework.
//!
//! Every unit of work against the venue implements [`AtomicJob`]:
//!
//! 1. `start_or_fail` — precondition guard; `false` skips the step (not an
//!    error), which is what makes workflows idempotent under replay
//! 2. `compute` — the effect, usually one adapter call
//! 3. `double_check` — re-query the venue until the effect is visible,
//!    polled with exponential backoff
//! 4. `complete` — commit shadow-column updates and follow-on transitions
//! 5. `resolve_exception` — the single classification point deciding
//!    retry / skip / record / abort
//!
//! The [`JobRunner`] drives any implementer through this lifecycle under the
//! workflow-level time budget.

use crate::{
    config::EngineConfig,
    domain::{
        account::Account, order::Order, position::Position, AccountId, OrderId, PositionId,
    },
    notify::{DeliveryGroup, Notifier},
    snapshot::ApiSnapshotCache,
    step::StepQueue,
    store::{observer::OrderChangeEvaluator, StateStore, StoreError},
};
use async_trait::async_trait;
use escada_exchange::{AdapterError, ExchangeAdapter};
use escada_integration::{ExponentialBackoff, TransportError};
use escada_markets::{ExchangeSymbol, MarketError};
use escada_planner::PlannerError;
use fnv::FnvHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Exception taxonomy surfaced by `resolve_exception`.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum JobError {
    /// Network, 5xx, timeout. Retried with backoff.
    #[error("Transient: {0}")]
    Transient(String),

    /// Venue rate limit. Retried with longer, jittered backoff.
    #[error("RateLimited: {message}")]
    RateLimited {
        retry_after: Option<u64>,
        message: String,
    },

    /// Local validation failed. Fatal at the job; the position fails.
    #[error("InvalidInput: {0}")]
    InvalidInput(String),

    /// Guard failed: wrong status, lost race. A skip, not an error.
    #[error("StatePrecondition: {0}")]
    StatePrecondition(String),

    /// Expected control-flow short-circuit (eg/ TP already filled).
    /// Recorded, stops the workflow, no alert.
    #[error("NonNotifiable: {0}")]
    NonNotifiable(String),

    /// Activation-time validation mismatch. Recorded, position fails, no
    /// retry, operator notified.
    #[error("JustResolve: {0}")]
    JustResolve(String),

    /// Signature failure, invalid credentials, delisted symbol. Position
    /// fails, operator notified.
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl From<AdapterError> for JobError {
    fn from(error: AdapterError) -> Self {
        if error.is_rate_limited() {
            return JobError::RateLimited {
                retry_after: error.retry_after(),
                message: error.to_string(),
            };
        }
        if error.is_auth_failure() {
            return JobError::Fatal(error.to_string());
        }
        match error {
            AdapterError::Transport(TransportError::Api { .. })
            | AdapterError::Venue { .. }
            | AdapterError::UnsupportedOperation(_) => JobError::Fatal(error.to_string()),
            AdapterError::OrderNotFound => JobError::Transient(error.to_string()),
            _ => JobError::Transient(error.to_string()),
        }
    }
}

impl From<StoreError> for JobError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { .. }
            | StoreError::Transition(_)
            | StoreError::NotFound { .. } => JobError::StatePrecondition(error.to_string()),
            StoreError::SymbolNotFound(_) => JobError::Fatal(error.to_string()),
            StoreError::DuplicateOpenPosition { .. } => JobError::InvalidInput(error.to_string()),
        }
    }
}

impl From<PlannerError> for JobError {
    fn from(error: PlannerError) -> Self {
        JobError::InvalidInput(error.to_string())
    }
}

impl From<MarketError> for JobError {
    fn from(error: MarketError) -> Self {
        JobError::InvalidInput(error.to_string())
    }
}

/// What the runner should do with a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    RetryTransient,
    RetryRateLimited { retry_after: Option<u64> },
    /// Not an error: mark the step skipped.
    Skip,
    /// Record on the position and stop the workflow quietly.
    Record,
    /// Mark the position failed; optionally alert the exceptions group.
    Abort { notify: bool },
}

/// The default classification used unless a job overrides it.
pub fn default_resolution(error: &JobError) -> Resolution {
    match error {
        JobError::Transient(_) => Resolution::RetryTransient,
        JobError::RateLimited { retry_after, .. } => Resolution::RetryRateLimited {
            retry_after: *retry_after,
        },
        JobError::StatePrecondition(_) => Resolution::Skip,
        JobError::NonNotifiable(_) => Resolution::Record,
        JobError::InvalidInput(_) => Resolution::Abort { notify: false },
        JobError::JustResolve(_) | JobError::Fatal(_) => Resolution::Abort { notify: true },
    }
}

/// Structured result of a job's effect, kept for step logging.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JobOutcome {
    pub summary: String,
}

impl JobOutcome {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
        }
    }
}

/// Terminal result of driving one job through its lifecycle.
#[derive(Debug, Clone)]
pub enum JobResult {
    Skipped(String),
    Completed(JobOutcome),
    /// NonNotifiable short-circuit: recorded, workflow stops, no alert.
    ShortCircuited(String),
    Failed(JobError),
}

/// One single-purpose unit implementing the atomic lifecycle.
#[async_trait]
pub trait AtomicJob: Send {
    fn name(&self) -> &'static str;

    /// The position this job belongs to, for failure bookkeeping.
    fn position_id(&self) -> Option<PositionId> {
        None
    }

    /// Precondition guard; `false` skips the step.
    async fn start_or_fail(&mut self, ctx: &JobContext) -> Result<bool, JobError>;

    /// The effect.
    async fn compute(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobError>;

    /// Verify the effect landed on the venue.
    async fn double_check(&mut self, _ctx: &JobContext) -> Result<bool, JobError> {
        Ok(true)
    }

    /// Commit shadow-column updates and follow-on transitions.
    async fn complete(&mut self, ctx: &JobContext) -> Result<(), JobError>;

    /// Classify an error; defaults to the taxonomy mapping.
    fn resolve_exception(&self, error: &JobError) -> Resolution {
        default_resolution(error)
    }
}

/// Registry of per-account adapters.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<FnvHashMap<AccountId, Arc<dyn ExchangeAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, account: AccountId, adapter: Arc<dyn ExchangeAdapter>) {
        self.adapters.write().insert(account, adapter);
    }

    pub fn get(&self, account: AccountId) -> Option<Arc<dyn ExchangeAdapter>> {
        self.adapters.read().get(&account).cloned()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("accounts", &self.adapters.read().len())
            .finish()
    }
}

/// Everything a job needs: repositories, cache, queue, notifier, adapters.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub store: Arc<StateStore>,
    pub snapshots: Arc<ApiSnapshotCache>,
    pub queue: Arc<dyn StepQueue>,
    pub notifier: Arc<dyn Notifier>,
    pub adapters: Arc<AdapterRegistry>,
    pub config: EngineConfig,
}

impl JobContext {
    /// The single evaluator allowed to enqueue correction workflows.
    pub fn evaluator(&self) -> OrderChangeEvaluator {
        OrderChangeEvaluator::new(Arc::clone(&self.store), Arc::clone(&self.queue))
    }

    pub fn position(&self, id: PositionId) -> Result<Position, JobError> {
        Ok(self.store.position(id)?)
    }

    pub fn order(&self, id: OrderId) -> Result<Order, JobError> {
        Ok(self.store.order(id)?)
    }

    pub fn adapter(&self, account: AccountId) -> Result<Arc<dyn ExchangeAdapter>, JobError> {
        self.adapters
            .get(account)
            .ok_or_else(|| JobError::Fatal(format!("account {account} has no adapter")))
    }

    /// The usual bundle: position, its account, its symbol and the adapter.
    pub fn position_context(
        &self,
        id: PositionId,
    ) -> Result<(Position, Account, ExchangeSymbol, Arc<dyn ExchangeAdapter>), JobError> {
        let position = self.position(id)?;
        let account = self.store.account(position.account_id)?;
        let symbol = self.store.symbol(&position.symbol)?;
        let adapter = self.adapter(position.account_id)?;
        Ok((position, account, symbol, adapter))
    }

    /// Cancellation flag checked between suspension points.
    pub fn cancellation_requested(&self, id: PositionId) -> bool {
        self.store
            .position(id)
            .map(|position| {
                matches!(
                    position.status,
                    crate::domain::position::PositionStatus::Cancelling
                        | crate::domain::position::PositionStatus::Cancelled
                        | crate::domain::position::PositionStatus::Failed
                )
            })
            .unwrap_or(true)
    }
}

/// Drives any [`AtomicJob`] through the lifecycle with the configured
/// budgets and retry schedules.
#[derive(Debug, Clone)]
pub struct JobRunner {
    job_budget: Duration,
    double_check_backoff: ExponentialBackoff,
    transient_backoff: ExponentialBackoff,
    rate_limited_backoff: ExponentialBackoff,
}

impl JobRunner {
    pub fn new(job_budget: Duration) -> Self {
        Self {
            job_budget,
            double_check_backoff: ExponentialBackoff::double_check(),
            transient_backoff: ExponentialBackoff::transient(),
            rate_limited_backoff: ExponentialBackoff::rate_limited(),
        }
    }

    pub async fn run(&self, job: &mut dyn AtomicJob, ctx: &JobContext) -> JobResult {
        let mut transient_attempt = 0u32;
        let mut rate_attempt = 0u32;
        loop {
            let error = match self.run_once(job, ctx).await {
                Ok(result) => return result,
                Err(error) => error,
            };
            match job.resolve_exception(&error) {
                Resolution::RetryTransient => {
                    warn!(job = job.name(), %error, attempt = transient_attempt, "transient failure, retrying");
                    if !self.transient_backoff.wait(transient_attempt).await {
                        return self.abort(job, ctx, error, true);
                    }
                    transient_attempt += 1;
                }
                Resolution::RetryRateLimited { retry_after } => {
                    warn!(job = job.name(), %error, attempt = rate_attempt, "rate limited, backing off");
                    if !self
                        .rate_limited_backoff
                        .wait_hinted(rate_attempt, retry_after)
                        .await
                    {
                        return self.abort(job, ctx, error, true);
                    }
                    rate_attempt += 1;
                }
                Resolution::Skip => {
                    return JobResult::Skipped(error.to_string());
                }
                Resolution::Record => {
                    self.record_error(job, ctx, &error);
                    info!(job = job.name(), %error, "workflow short-circuited");
                    return JobResult::ShortCircuited(error.to_string());
                }
                Resolution::Abort { notify } => {
                    return self.abort(job, ctx, error, notify);
                }
            }
        }
    }

    async fn run_once(
        &self,
        job: &mut dyn AtomicJob,
        ctx: &JobContext,
    ) -> Result<JobResult, JobError> {
        if !job.start_or_fail(ctx).await? {
            return Ok(JobResult::Skipped("precondition not met".into()));
        }

        let outcome = tokio::time::timeout(self.job_budget, job.compute(ctx))
            .await
            .map_err(|_| {
                JobError::Transient(format!("job budget {:?} elapsed", self.job_budget))
            })??;

        let mut verified = false;
        for attempt in 0..self.double_check_backoff.max_attempts {
            if job.double_check(ctx).await? {
                verified = true;
                break;
            }
            if !self.double_check_backoff.wait(attempt).await {
                break;
            }
        }
        if !verified {
            return Err(JobError::Transient(
                "double-check did not observe the effect".into(),
            ));
        }

        job.complete(ctx).await?;
        info!(job = job.name(), summary = %outcome.summary, "atomic job completed");
        Ok(JobResult::Completed(outcome))
    }

    fn record_error(&self, job: &dyn AtomicJob, ctx: &JobContext, error: &JobError) {
        if let Some(position) = job.position_id() {
            let message = error.to_string();
            let _ = ctx.store.update_position(position, |position| {
                position.error_message = Some(message.clone());
            });
        }
    }

    fn abort(
        &self,
        job: &dyn AtomicJob,
        ctx: &JobContext,
        error: JobError,
        notify: bool,
    ) -> JobResult {
        let message = error.to_string();
        if let Some(position) = job.position_id() {
            let _ = ctx.store.update_position(position, |position| {
                let _ = position.mark_failed(message.clone());
                position.error_message.get_or_insert(message.clone());
            });
        }
        if notify {
            ctx.notifier.notify(
                DeliveryGroup::Exceptions,
                &format!("{} failed", job.name()),
                &message,
            );
        }
        warn!(job = job.name(), %error, "atomic job aborted");
        JobResult::Failed(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::step::InMemoryStepQueue;

    fn context() -> JobContext {
        JobContext {
            store: Arc::new(StateStore::new()),
            snapshots: Arc::new(ApiSnapshotCache::new(5)),
            queue: Arc::new(InMemoryStepQueue::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            adapters: Arc::new(AdapterRegistry::new()),
            config: EngineConfig::default(),
        }
    }

    #[derive(Debug, Default)]
    struct ScriptedJob {
        guard: bool,
        compute_errors: Vec<JobError>,
        checks_until_pass: u32,
        computed: u32,
        completed: bool,
    }

    #[async_trait]
    impl AtomicJob for ScriptedJob {
        fn name(&self) -> &'static str {
            "ScriptedJob"
        }

        async fn start_or_fail(&mut self, _: &JobContext) -> Result<bool, JobError> {
            Ok(self.guard)
        }

        async fn compute(&mut self, _: &JobContext) -> Result<JobOutcome, JobError> {
            self.computed += 1;
            if let Some(error) = self.compute_errors.pop() {
                return Err(error);
            }
            Ok(JobOutcome::new("ok"))
        }

        async fn double_check(&mut self, _: &JobContext) -> Result<bool, JobError> {
            if self.checks_until_pass == 0 {
                Ok(true)
            } else {
                self.checks_until_pass -= 1;
                Ok(false)
            }
        }

        async fn complete(&mut self, _: &JobContext) -> Result<(), JobError> {
            self.completed = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn guard_failure_is_a_skip_not_an_error() {
        let runner = JobRunner::new(Duration::from_secs(5));
        let ctx = context();
        let mut job = ScriptedJob::default();
        assert!(matches!(
            runner.run(&mut job, &ctx).await,
            JobResult::Skipped(_)
        ));
        assert_eq!(job.computed, 0);
    }

    #[tokio::test]
    async fn transient_errors_retry_until_success() {
        let runner = JobRunner::new(Duration::from_secs(5));
        let ctx = context();
        let mut job = ScriptedJob {
            guard: true,
            compute_errors: vec![JobError::Transient("blip".into())],
            ..Default::default()
        };
        assert!(matches!(
            runner.run(&mut job, &ctx).await,
            JobResult::Completed(_)
        ));
        assert_eq!(job.computed, 2);
        assert!(job.completed);
    }

    #[tokio::test]
    async fn double_check_polls_until_the_effect_lands() {
        let runner = JobRunner::new(Duration::from_secs(5));
        let ctx = context();
        let mut job = ScriptedJob {
            guard: true,
            checks_until_pass: 2,
            ..Default::default()
        };
        assert!(matches!(
            runner.run(&mut job, &ctx).await,
            JobResult::Completed(_)
        ));
        assert!(job.completed);
    }

    #[tokio::test]
    async fn fatal_errors_abort_and_notify() {
        let runner = JobRunner::new(Duration::from_secs(5));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut ctx = context();
        ctx.notifier = notifier.clone();
        let mut job = ScriptedJob {
            guard: true,
            compute_errors: vec![JobError::Fatal("bad credentials".into())],
            ..Default::default()
        };
        assert!(matches!(
            runner.run(&mut job, &ctx).await,
            JobResult::Failed(_)
        ));
        assert_eq!(notifier.count_for(DeliveryGroup::Exceptions), 1);
        assert!(!job.completed);
    }

    #[test]
    fn adapter_taxonomy_maps_into_job_errors() {
        let rate_limited: JobError = AdapterError::Transport(TransportError::RateLimited {
            retry_after: Some(3),
            message: "429".into(),
        })
        .into();
        assert!(matches!(
            rate_limited,
            JobError::RateLimited {
                retry_after: Some(3),
                ..
            }
        ));

        let signature: JobError =
            AdapterError::Transport(TransportError::Signature("bad key".into())).into();
        assert!(matches!(signature, JobError::Fatal(_)));

        let timeout: JobError =
            AdapterError::Transport(TransportError::Timeout("slow".into())).into();
        assert!(matches!(timeout, JobError::Transient(_)));
    }
}
