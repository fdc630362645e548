use std::sync::Arc;

use tracing::{info, warn};

use card_walker::lock::{BusyLock, FileLeaseStore, LeaseStore, MemoryLeaseStore, SignalBus};
use card_walker::{config, CdpDriver, WalkSessionScheduler};

fn has_flag(name: &str) -> bool {
    std::env::args().any(|a| a == name)
}

/// Shared lease store; falls back to a process-local store when no home
/// directory can be resolved (the lock then only coordinates in-process
/// agents, which is still safe because the lock is advisory).
fn open_lease_store() -> Arc<dyn LeaseStore> {
    match FileLeaseStore::at_default_location() {
        Some(store) => Arc::new(store),
        None => {
            warn!("main: no home directory, busy lease will not be shared across processes");
            Arc::new(MemoryLeaseStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let store = open_lease_store();

    // Diagnostic mode: print the current busy-lease state and exit.
    if has_flag("--show-lease") {
        match store.read() {
            Some(lease) => println!("{}", serde_json::to_string_pretty(&lease)?),
            None => println!("null"),
        }
        return Ok(());
    }

    let cfg = config::load();
    let target = url::Url::parse(&cfg.target_url)
        .map_err(|e| anyhow::anyhow!("invalid target url {}: {}", cfg.target_url, e))?;
    info!(
        "main: starting walker (url={}, sweep={}..={} step {} enabled={})",
        target, cfg.age_start, cfg.age_end, cfg.age_step, cfg.age_sweep_enabled
    );

    let headless = has_flag("--headless");
    let (mut browser, driver) = CdpDriver::launch(target.as_str(), headless).await?;
    let driver = Arc::new(driver);

    let lock = BusyLock::new(store, SignalBus::new());
    let scheduler = WalkSessionScheduler::new(driver, cfg).with_lock(lock);

    // Ctrl-C requests a cooperative stop; the session winds down at the next
    // phase boundary.
    let flags = scheduler.flags();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("main: stop requested, finishing the current phase");
            flags.stop();
        }
    });

    let report = scheduler.run().await?;
    info!(
        "main: session done: {} card(s) opened, filter values applied: {:?}{}",
        report.cards_opened,
        report.filter_values_applied,
        if report.stopped_by_request {
            " (stopped by request)"
        } else {
            ""
        }
    );

    if let Err(e) = browser.close().await {
        warn!("main: browser close failed: {}", e);
    }
    Ok(())
}
