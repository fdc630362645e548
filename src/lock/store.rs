//! Persistent busy-lease record.
//!
//! The lease is a single shared key-value entry visible to every agent on
//! the machine: `{busy, updatedAt, expiresAt}` (camelCase on the wire, epoch
//! milliseconds). Writes are single-record last-writer-wins; races are
//! tolerated because staleness is bounded by the TTL.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Shared store key. Kept from the v1 wire protocol so existing agents keep
/// interoperating.
pub const BUSY_LEASE_KEY: &str = "omiai:fw:busy:v1";

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyLease {
    pub busy: bool,
    pub updated_at: i64,
    pub expires_at: i64,
}

impl BusyLease {
    /// A freshly held lease: `expiresAt = updatedAt + ttl`.
    pub fn held(ttl_ms: i64) -> Self {
        let now = now_ms();
        Self {
            busy: true,
            updated_at: now,
            expires_at: now + ttl_ms,
        }
    }

    /// An explicitly released lease.
    pub fn released() -> Self {
        let now = now_ms();
        Self {
            busy: false,
            updated_at: now,
            expires_at: now,
        }
    }

    /// Held iff busy and not yet expired. A lease whose TTL elapsed without
    /// a heartbeat counts as released even if never cleared.
    pub fn is_held_at(&self, at_ms: i64) -> bool {
        self.busy && self.expires_at > at_ms
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("lease store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("lease record malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Shared persistent key-value entry holding the lease.
pub trait LeaseStore: Send + Sync {
    /// `None` when the lease was never written or cannot be read.
    fn read(&self) -> Option<BusyLease>;
    fn write(&self, lease: &BusyLease) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

// ── File-backed store ────────────────────────────────────────────────────────

/// JSON file under `~/.card-walker/`, derived from [`BUSY_LEASE_KEY`] so
/// every agent resolves the same path.
pub struct FileLeaseStore {
    path: PathBuf,
}

fn key_to_filename(key: &str) -> String {
    let safe: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("{safe}.json")
}

impl FileLeaseStore {
    /// Store at the default shared location. `None` when no home directory
    /// can be resolved.
    pub fn at_default_location() -> Option<Self> {
        let home = dirs::home_dir()?;
        Some(Self {
            path: home
                .join(".card-walker")
                .join(key_to_filename(BUSY_LEASE_KEY)),
        })
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }
}

impl LeaseStore for FileLeaseStore {
    fn read(&self) -> Option<BusyLease> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(lease) => Some(lease),
            Err(e) => {
                warn!("lease_store: malformed record at {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn write(&self, lease: &BusyLease) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(lease)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ── In-memory store ──────────────────────────────────────────────────────────

/// Process-local store for tests and embedded setups where all agents share
/// one process.
#[derive(Default)]
pub struct MemoryLeaseStore {
    lease: Mutex<Option<BusyLease>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeaseStore for MemoryLeaseStore {
    fn read(&self) -> Option<BusyLease> {
        self.lease.lock().ok()?.clone()
    }

    fn write(&self, lease: &BusyLease) -> Result<(), StoreError> {
        if let Ok(mut guard) = self.lease.lock() {
            *guard = Some(lease.clone());
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        if let Ok(mut guard) = self.lease.lock() {
            *guard = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_wire_shape_is_camel_case() {
        let lease = BusyLease {
            busy: true,
            updated_at: 1000,
            expires_at: 21_000,
        };
        let json = serde_json::to_string(&lease).unwrap();
        assert_eq!(json, r#"{"busy":true,"updatedAt":1000,"expiresAt":21000}"#);
        let back: BusyLease = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lease);
    }

    #[test]
    fn held_lease_satisfies_ttl_invariant() {
        let lease = BusyLease::held(20_000);
        assert_eq!(lease.expires_at - lease.updated_at, 20_000);
        assert!(lease.is_held_at(lease.updated_at + 1));
        assert!(!lease.is_held_at(lease.expires_at));
        assert!(!lease.is_held_at(lease.expires_at + 1));
    }

    #[test]
    fn released_lease_is_never_held() {
        let lease = BusyLease::released();
        assert!(!lease.is_held_at(lease.updated_at - 100));
        assert!(!lease.is_held_at(lease.updated_at + 100));
    }

    #[test]
    fn file_store_round_trips_and_clears() {
        let path = std::env::temp_dir().join(format!(
            "card-walker-test-{}-{}.json",
            std::process::id(),
            now_ms()
        ));
        let store = FileLeaseStore::at_path(path.clone());
        assert!(store.read().is_none());

        let lease = BusyLease::held(20_000);
        store.write(&lease).unwrap();
        assert_eq!(store.read(), Some(lease));

        store.clear().unwrap();
        assert!(store.read().is_none());
        // Clearing an already-absent record is not an error.
        store.clear().unwrap();
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn filename_derivation_is_stable() {
        assert_eq!(key_to_filename(BUSY_LEASE_KEY), "omiai-fw-busy-v1.json");
    }
}
