//! Busy-lease protocol: TTL invariants, heartbeat behavior, and gated-agent
//! coordination (Scenario C).

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use card_walker::config::WalkerConfig;
use card_walker::lock::{
    BusyLease, BusyLock, LeaseStore, MemoryLeaseStore, SignalBus, StoreError, LEASE_TTL_MS,
};
use card_walker::types::SessionFlags;
use card_walker::{PageDriver, WalkSessionScheduler};

use common::{FakeCard, FakePage, ORIGIN};

/// Store wrapper counting writes, for heartbeat observation.
struct CountingStore {
    inner: MemoryLeaseStore,
    writes: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: MemoryLeaseStore::new(),
            writes: AtomicUsize::new(0),
        }
    }

    fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl LeaseStore for CountingStore {
    fn read(&self) -> Option<BusyLease> {
        self.inner.read()
    }

    fn write(&self, lease: &BusyLease) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(lease)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear()
    }
}

fn shared_pair() -> (Arc<MemoryLeaseStore>, SignalBus) {
    (Arc::new(MemoryLeaseStore::new()), SignalBus::new())
}

#[tokio::test]
async fn acquire_writes_a_ttl_consistent_lease() {
    let (store, bus) = shared_pair();
    let mut lock = BusyLock::new(store.clone(), bus);

    lock.acquire().unwrap();
    let lease = lock.lease().expect("lease written");
    assert!(lease.busy);
    assert_eq!(lease.expires_at - lease.updated_at, LEASE_TTL_MS);
    assert!(lock.is_held());

    lock.release().unwrap();
    let lease = lock.lease().expect("release overwrites, not clears");
    assert!(!lease.busy);
    assert!(!lock.is_held());
}

#[tokio::test]
async fn expired_lease_reads_as_released_without_explicit_release() {
    let (store, bus) = shared_pair();
    store
        .write(&BusyLease {
            busy: true,
            updated_at: card_walker::lock::now_ms() - 30_000,
            expires_at: card_walker::lock::now_ms() - 10_000,
        })
        .unwrap();

    let lock = BusyLock::new(store, bus);
    assert!(!lock.is_held(), "TTL elapsed, lease self-heals to released");
}

#[tokio::test(start_paused = true)]
async fn heartbeat_rewrites_the_lease_on_its_interval() {
    let store = Arc::new(CountingStore::new());
    let bus = SignalBus::new();
    let mut lock =
        BusyLock::new(store.clone(), bus).with_timing(LEASE_TTL_MS, Duration::from_millis(500));

    lock.acquire().unwrap();
    let after_acquire = store.write_count();

    tokio::time::sleep(Duration::from_secs(5)).await;
    let after_wait = store.write_count();
    assert!(
        after_wait >= after_acquire + 5,
        "expected several heartbeat rewrites, got {after_acquire} -> {after_wait}"
    );
    assert!(lock.is_held());

    lock.release().unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    let after_release = store.write_count();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(
        store.write_count(),
        after_release,
        "heartbeat stops with the release"
    );
}

// ── Scenario C: gated agent defers until the holder stops ────────────────────

#[tokio::test(start_paused = true)]
async fn scenario_c_gated_session_waits_for_the_holder_to_release() {
    let (store, bus) = shared_pair();
    let mut holder = BusyLock::new(store.clone(), bus.clone());
    holder.acquire().unwrap();

    let page = Arc::new(FakePage::with_cards(vec![FakeCard::with_id(1)]));
    let driver: Arc<dyn PageDriver> = page.clone();
    let cfg = WalkerConfig {
        target_url: format!("{ORIGIN}/search"),
        dwell_max_seconds: 2,
        between_wait_ms: 100,
        max_card_count: 0,
        max_auto_scroll: 1,
        scroll_during_dwell: false,
        max_scroll_moves: 1,
        age_sweep_enabled: false,
        age_start: 33,
        age_end: 36,
        age_step: 1,
        apply_filter_before_first_cycle: false,
    };
    let scheduler =
        WalkSessionScheduler::new(driver, cfg).with_lock(BusyLock::new(store.clone(), bus));
    let session = tokio::spawn(scheduler.run());

    // Plenty of virtual time passes; the gated agent must not start cycling.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(
        page.snapshot().opened_detail_ids.is_empty(),
        "gated agent began cycling while the lease was held"
    );

    holder.release().unwrap();
    let report = session.await.unwrap().expect("gated session completes");
    assert_eq!(report.cards_opened, 1);
}

#[tokio::test]
async fn ttl_expiry_frees_a_gated_agent_when_the_holder_vanishes() {
    let (store, bus) = shared_pair();
    // Short TTL so the test runs in real time: the holder dies (dropped
    // without release), its heartbeat stops, and the lease times out.
    let mut holder =
        BusyLock::new(store.clone(), bus.clone()).with_timing(200, Duration::from_millis(50));
    holder.acquire().unwrap();
    drop(holder);

    let gated = BusyLock::new(store.clone(), bus);
    assert!(gated.is_held(), "lease still busy right after the crash");

    let flags = SessionFlags::new();
    flags.set_running(true);
    tokio::time::timeout(
        Duration::from_secs(5),
        gated.wait_until_free(Duration::from_millis(100), &flags),
    )
    .await
    .expect("gated agent frees within a few poll intervals of TTL expiry");
    assert!(!gated.is_held());
}

#[tokio::test(start_paused = true)]
async fn gated_wait_aborts_when_the_session_is_stopped() {
    let (store, bus) = shared_pair();
    let mut holder = BusyLock::new(store.clone(), bus.clone());
    holder.acquire().unwrap();

    let gated = BusyLock::new(store, bus);
    let flags = SessionFlags::new();
    flags.set_running(true);

    let stop_flags = flags.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        stop_flags.stop();
    });

    gated
        .wait_until_free(Duration::from_secs(3), &flags)
        .await;
    assert!(gated.is_held(), "the holder never released; we stopped waiting");
}
