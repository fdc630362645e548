//! Lease-based advisory mutual exclusion between independently injected
//! agents.
//!
//! Holders may be separate processes with no shared call stack, so an
//! in-memory flag cannot coordinate them: the lease lives in a shared
//! persistent store, stays alive through heartbeat rewrites, and self-expires
//! (TTL) if its holder dies without releasing. A broadcast channel delivers
//! immediate started/stopped notifications; observers also poll the store so
//! TTL expiry is noticed even when no notification arrives.
//!
//! The exclusion is advisory: an agent that ignores the lock can still act,
//! so every page action elsewhere in this crate stays individually safe
//! (idempotent clicks, bounded retries) under accidental concurrency.

pub mod bus;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::types::SessionFlags;

pub use bus::{AgentSignal, SignalBus, CHANNEL_NAME};
pub use store::{
    now_ms, BusyLease, FileLeaseStore, LeaseStore, MemoryLeaseStore, StoreError, BUSY_LEASE_KEY,
};

/// Lease validity window. A holder that stops heartbeating is treated as
/// gone after this long.
pub const LEASE_TTL_MS: i64 = 20_000;
/// Heartbeat period; must stay well under the TTL.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// How often gated observers re-read the store when no notification arrives.
pub const OBSERVER_POLL: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum LockError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Refresh the lease's expiry, unless the lease is no longer busy: another
/// party has cleared it, and extending would resurrect it.
fn heartbeat_tick(store: &dyn LeaseStore, ttl_ms: i64) {
    match store.read() {
        Some(lease) if lease.busy => {
            if let Err(e) = store.write(&BusyLease::held(ttl_ms)) {
                debug!("busy_lock: heartbeat write failed: {e}");
            }
        }
        _ => debug!("busy_lock: heartbeat skipped, lease not busy"),
    }
}

pub struct BusyLock {
    store: Arc<dyn LeaseStore>,
    bus: SignalBus,
    ttl_ms: i64,
    heartbeat_interval: Duration,
    heartbeat: Option<JoinHandle<()>>,
}

impl BusyLock {
    pub fn new(store: Arc<dyn LeaseStore>, bus: SignalBus) -> Self {
        Self {
            store,
            bus,
            ttl_ms: LEASE_TTL_MS,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            heartbeat: None,
        }
    }

    /// Override TTL and heartbeat period (tests, embedded setups). The
    /// heartbeat must remain strictly shorter than the TTL.
    pub fn with_timing(mut self, ttl_ms: i64, heartbeat_interval: Duration) -> Self {
        debug_assert!((heartbeat_interval.as_millis() as i64) < ttl_ms);
        self.ttl_ms = ttl_ms;
        self.heartbeat_interval = heartbeat_interval;
        self
    }

    /// Current stored lease, if any (diagnostic surface).
    pub fn lease(&self) -> Option<BusyLease> {
        self.store.read()
    }

    /// True iff the stored lease is busy and unexpired.
    pub fn is_held(&self) -> bool {
        self.store
            .read()
            .map(|l| l.is_held_at(now_ms()))
            .unwrap_or(false)
    }

    /// Write a fresh held lease, start the heartbeat, announce "started".
    pub fn acquire(&mut self) -> Result<(), LockError> {
        self.store.write(&BusyLease::held(self.ttl_ms))?;

        let store = self.store.clone();
        let ttl_ms = self.ttl_ms;
        let period = self.heartbeat_interval;
        self.stop_heartbeat();
        self.heartbeat = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick fires immediately; it just rewrites the fresh lease.
            loop {
                interval.tick().await;
                heartbeat_tick(store.as_ref(), ttl_ms);
            }
        }));

        self.bus.publish(AgentSignal::started());
        info!("busy_lock: lease acquired (ttl {} ms)", self.ttl_ms);
        Ok(())
    }

    /// Stop the heartbeat, mark the lease released, announce "stopped".
    pub fn release(&mut self) -> Result<(), LockError> {
        self.stop_heartbeat();
        self.store.write(&BusyLease::released())?;
        self.bus.publish(AgentSignal::stopped());
        info!("busy_lock: lease released");
        Ok(())
    }

    fn stop_heartbeat(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
    }

    /// Defer until no other agent holds the lease, or until `flags` stop the
    /// session. Wakes on "stopped" notifications and on the poll interval;
    /// the poll catches TTL expiry when the notification channel cannot
    /// reach the holder's process.
    pub async fn wait_until_free(&self, poll: Duration, flags: &SessionFlags) {
        if !self.is_held() {
            return;
        }
        info!("busy_lock: another agent holds the lease, deferring start");
        let mut rx = self.bus.subscribe();
        loop {
            if !flags.running() || !self.is_held() {
                return;
            }
            tokio::select! {
                sig = rx.recv() => {
                    if sig.is_err() {
                        // Channel lagged or closed: fall back to pure polling.
                        tokio::time::sleep(poll).await;
                    }
                }
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }
}

impl Drop for BusyLock {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}
