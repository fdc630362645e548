//! Top-level session state machine:
//! `Idle → Initializing → Cycling → (SweepAdvance → Cycling) | Done`.
//!
//! The scheduler strictly serializes phases (no two phases of the same walk
//! ever run concurrently) and is the sole owner of the per-session state.
//! When constructed with a [`BusyLock`] it defers its start while another
//! agent holds the lease, and publishes its own activity for the duration of
//! the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::core::config::WalkerConfig;
use crate::core::retry::wait_for;
use crate::core::types::{AgeRange, CycleOutcome, SessionFlags, SessionReport, WalkSession};
use crate::driver::PageDriver;
use crate::lock::{BusyLock, OBSERVER_POLL};
use crate::walk::cycle::CardWalkCycle;
use crate::walk::interact::InteractionSimulator;
use crate::walk::probe::PageProbe;
use crate::walk::scroll::ScrollTargetResolver;
use crate::walk::sweep::AgeSweepController;
use crate::walk::WalkError;

/// The scrollable layout tends to shift shortly after load, so the initial
/// scroll target is resolved twice with a pause in between.
const TARGET_RESOLVE_PAUSE: Duration = Duration::from_millis(300);
const INITIAL_CARD_WAIT: Duration = Duration::from_secs(15);
const INITIAL_CARD_POLL: Duration = Duration::from_millis(200);
const POST_FILTER_CARD_WAIT: Duration = Duration::from_secs(8);
const POST_FILTER_CARD_POLL: Duration = Duration::from_millis(150);
/// Pause after a failed filter apply before the next cycle is attempted.
const SWEEP_ERROR_COOLDOWN: Duration = Duration::from_millis(1500);

#[derive(Clone, Copy, Debug)]
enum SchedulerPhase {
    Initializing,
    Cycling,
    SweepAdvance,
    Done,
}

fn log_phase(phase: SchedulerPhase) {
    debug!("scheduler: phase={:?}", phase);
}

pub struct WalkSessionScheduler {
    driver: Arc<dyn PageDriver>,
    config: WalkerConfig,
    flags: Arc<SessionFlags>,
    lock: Option<BusyLock>,
}

impl WalkSessionScheduler {
    pub fn new(driver: Arc<dyn PageDriver>, config: WalkerConfig) -> Self {
        Self {
            driver,
            config,
            flags: SessionFlags::new(),
            lock: None,
        }
    }

    /// Gate this session on the shared busy lease.
    pub fn with_lock(mut self, lock: BusyLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Shared flag handle; `flags().stop()` requests a cooperative stop.
    pub fn flags(&self) -> Arc<SessionFlags> {
        self.flags.clone()
    }

    pub async fn run(mut self) -> Result<SessionReport, WalkError> {
        self.flags.set_running(true);
        self.flags.set_sweeping(self.config.age_sweep_enabled);

        if let Some(lock) = &self.lock {
            lock.wait_until_free(OBSERVER_POLL, &self.flags).await;
        }
        if !self.flags.running() {
            self.flags.stop();
            return Ok(SessionReport {
                stopped_by_request: true,
                ..Default::default()
            });
        }
        if let Some(lock) = self.lock.as_mut() {
            lock.acquire()?;
        }

        let result = self.drive().await;

        if let Some(lock) = self.lock.as_mut() {
            if let Err(e) = lock.release() {
                warn!("scheduler: lease release failed: {e}");
            }
        }
        self.flags.stop();
        log_phase(SchedulerPhase::Done);
        result
    }

    async fn drive(&mut self) -> Result<SessionReport, WalkError> {
        log_phase(SchedulerPhase::Initializing);
        let probe = PageProbe::new(self.driver.clone());
        let interact = InteractionSimulator::new(self.driver.clone());
        let sweep = AgeSweepController::new(self.driver.clone());

        let mut resolver = ScrollTargetResolver::new(self.driver.clone());
        resolver.pick_best().await?;
        sleep(TARGET_RESOLVE_PAUSE).await;
        resolver.pick_best().await?;

        let mut session = WalkSession::new(
            self.flags.clone(),
            AgeRange::new(self.config.age_start, self.config.age_end, self.config.age_step),
        );
        let mut report = SessionReport::default();

        if self.config.age_sweep_enabled
            && self.config.apply_filter_before_first_cycle
            && self.flags.running()
        {
            info!(
                "scheduler: applying initial filter value {}",
                session.age.cursor
            );
            match sweep.apply_age_filter(session.age.cursor).await {
                Ok(()) => report.filter_values_applied.push(session.age.cursor),
                Err(e) => warn!("scheduler: initial filter apply failed: {e}"),
            }
            session.visited.clear();
            self.driver.scroll_to_top().await?;
            let probe_ref = &probe;
            wait_for(
                || async move { probe_ref.on_list_page().await.unwrap_or(false) },
                POST_FILTER_CARD_WAIT,
                POST_FILTER_CARD_POLL,
            )
            .await;
        }

        loop {
            if !self.flags.running() {
                report.stopped_by_request = true;
                break;
            }

            session.visited.clear();
            self.driver.scroll_to_top().await?;
            info!("scheduler: waiting for the card list");
            let probe_ref = &probe;
            let found = wait_for(
                || async move { probe_ref.on_list_page().await.unwrap_or(false) },
                INITIAL_CARD_WAIT,
                INITIAL_CARD_POLL,
            )
            .await;
            if !found {
                warn!("scheduler: no cards appeared, ending the session");
                break;
            }

            log_phase(SchedulerPhase::Cycling);
            let cycle = CardWalkCycle::new(
                self.driver.clone(),
                &probe,
                &mut resolver,
                &interact,
                &self.config,
                &mut session,
            );
            let cycle_report = cycle.run().await?;
            report.cards_opened += cycle_report.opened;
            info!(
                "scheduler: cycle ended ({:?}, {} opened)",
                cycle_report.outcome, cycle_report.opened
            );

            if !self.flags.running() || cycle_report.outcome == CycleOutcome::Stopped {
                report.stopped_by_request = true;
                break;
            }

            if !self.config.age_sweep_enabled {
                break;
            }

            log_phase(SchedulerPhase::SweepAdvance);
            if !session.age.advance() {
                info!("scheduler: filter sweep complete");
                break;
            }
            info!("scheduler: advancing filter to {}", session.age.cursor);
            match sweep.apply_age_filter(session.age.cursor).await {
                Ok(()) => report.filter_values_applied.push(session.age.cursor),
                Err(e) => {
                    warn!("scheduler: filter apply failed: {e}, cooling down");
                    sleep(SWEEP_ERROR_COOLDOWN).await;
                }
            }
        }

        Ok(report)
    }
}
