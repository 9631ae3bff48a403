//! Poll scheduler
//!
//! Drives [`ReconcileEngine::process_batch`] on a fixed interval.
//!
//! ```text
//!        tick                 Ok, no pause
//! Idle ───────▶ Ticking ─────────────────▶ Idle
//!   ▲              │  pause > 0
//!   │    tick      ▼
//!   └────────── Paused     (next tick no sooner than max(pause, interval))
//!
//! any state ── shutdown ──▶ ShuttingDown
//! ```
//!
//! Round errors are logged and never stop the loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use super::engine::ReconcileEngine;
use crate::shutdown::ShutdownSignal;

/// Scheduler configuration
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Max unresolved orders pulled per round
    pub batch_limit: usize,
    /// Max accrual lookups in flight
    pub send_limit: usize,
    /// Interval between rounds
    pub poll_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            batch_limit: 100,
            send_limit: 30,
            poll_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Ticking,
    Paused,
    ShuttingDown,
}

pub struct PollScheduler {
    engine: Arc<ReconcileEngine>,
    config: PollConfig,
    shutdown: ShutdownSignal,
    state: watch::Sender<SchedulerState>,
}

impl PollScheduler {
    pub fn new(engine: Arc<ReconcileEngine>, config: PollConfig, shutdown: ShutdownSignal) -> Self {
        let (state, _rx) = watch::channel(SchedulerState::Idle);
        Self {
            engine,
            config,
            shutdown,
            state,
        }
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    fn set_state(&self, next: SchedulerState) {
        self.state.send_replace(next);
    }

    /// Run until shutdown is requested.
    pub async fn run(&self) {
        let interval_len = self.config.poll_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + interval_len, interval_len);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            batch_limit = self.config.batch_limit,
            send_limit = self.config.send_limit,
            poll_interval_secs = interval_len.as_secs(),
            "Poll scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.shutdown.wait() => break,
            }

            self.set_state(SchedulerState::Ticking);
            let outcome = tokio::select! {
                outcome = self.engine.process_batch(self.config.batch_limit, self.config.send_limit) => outcome,
                _ = self.shutdown.wait() => break,
            };

            let pause = match outcome {
                Ok(report) => report.pause,
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    error!(error = %e, "Reconciliation round failed");
                    e.pause()
                }
            };

            if pause.is_zero() {
                self.set_state(SchedulerState::Idle);
            } else {
                let wait = pause.max(interval_len);
                warn!(
                    pause_secs = pause.as_secs(),
                    next_round_in_secs = wait.as_secs(),
                    "Accrual service rate limit, pausing"
                );
                interval.reset_at(Instant::now() + wait);
                self.set_state(SchedulerState::Paused);
            }
        }

        self.set_state(SchedulerState::ShuttingDown);
        info!("Poll scheduler stopped");
    }
}
