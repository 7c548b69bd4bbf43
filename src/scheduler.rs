//! Recurring sync scheduling.
//!
//! Owns the two timers that drive the engine without any HTTP involvement:
//! a ratings refresh every 15 minutes and a full convergence pass every
//! hour (both configurable). The timers are independent of each other and
//! of manual triggers; a failed tick is logged and the schedule continues.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::config::SyncConfig;
use crate::sync::SyncEngine;

/// Owns the named recurring tasks. `start` spawns them; `stop` (or drop)
/// aborts them. Each tick is fire-and-forget relative to the other timer —
/// the engine's per-operation in-flight guard is the only overlap control.
pub struct Scheduler {
    engine: Arc<SyncEngine>,
    full_interval: Duration,
    ratings_interval: Duration,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(engine: Arc<SyncEngine>, config: &SyncConfig) -> Self {
        Self {
            engine,
            full_interval: Duration::from_secs(config.full_interval_secs),
            ratings_interval: Duration::from_secs(config.ratings_interval_secs),
            handles: Vec::new(),
        }
    }

    /// Spawns both recurring tasks. The first tick of each timer fires one
    /// full period after start; startup runs its own initial full sync, so
    /// nothing fires immediately.
    pub fn start(&mut self) {
        info!(
            full_secs = self.full_interval.as_secs(),
            ratings_secs = self.ratings_interval.as_secs(),
            "starting sync scheduler"
        );

        let engine = self.engine.clone();
        let period = self.full_interval;
        self.handles.push(tokio::spawn(async move {
            let mut ticker = interval_after(period);
            loop {
                ticker.tick().await;
                if let Err(err) = engine.full_sync().await {
                    error!("scheduled full sync failed: {:#}", err);
                }
            }
        }));

        let engine = self.engine.clone();
        let period = self.ratings_interval;
        self.handles.push(tokio::spawn(async move {
            let mut ticker = interval_after(period);
            loop {
                ticker.tick().await;
                if let Err(err) = engine.ratings_sync().await {
                    error!("scheduled ratings sync failed: {:#}", err);
                }
            }
        }));
    }

    /// Aborts the recurring tasks. An in-progress pass inside the engine is
    /// not cancelled mid-write by callers holding their own engine handle;
    /// only the timers stop.
    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        info!("sync scheduler stopped");
    }

    /// Test hook: run a single tick of each operation without any timer.
    pub async fn run_once(&self) -> (anyhow::Result<()>, anyhow::Result<()>) {
        let full = self.engine.full_sync().await.map(|_| ());
        let ratings = self.engine.ratings_sync().await.map(|_| ());
        (full, ratings)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// An interval whose first tick fires after one full period, and which
/// delays rather than bursts after a missed tick (a slow pass should not
/// be followed by a back-to-back rerun).
fn interval_after(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
