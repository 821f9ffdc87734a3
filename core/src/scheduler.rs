//! Periodic scheduler.
//!
//! Each tick enqueues the sync workflow for every position in an opened
//! status, then drains the queue. Admission control lives in the engine
//! (per-account semaphores, per-position mutex); the scheduler only decides
//! *what* needs a sync pass this tick.

use crate::{engine::Engine, shutdown::ShutdownListener};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Scheduler {
    engine: Arc<Engine>,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// One tick: enqueue sync workflows for every opened position.
    pub fn tick(&self) {
        let mut enqueued = 0;
        for position in self.engine.store.positions() {
            if position.status.is_opened() {
                self.engine.enqueue_sync(position.id);
                enqueued += 1;
            }
        }
        debug!(positions = enqueued, "scheduler tick");
    }

    /// Run until shutdown: tick, drain, sleep.
    pub async fn run(&self, mut shutdown: ShutdownListener) {
        let mut interval = tokio::time::interval(self.engine.config.scheduler_tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(tick = ?self.engine.config.scheduler_tick, "scheduler started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                    self.engine.drain().await;
                }
                _ = shutdown.recv() => {
                    info!("scheduler stopping");
                    break;
                }
            }
        }
    }
}
