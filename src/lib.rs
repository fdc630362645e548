pub mod core;
pub mod driver;
pub mod lock;
pub mod walk;

// --- Primary exports ---
pub use crate::core::config::{self as config, WalkerConfig};
pub use crate::core::types;
pub use crate::core::types::{SessionFlags, SessionReport};
pub use crate::driver::{CdpDriver, PageDriver};
pub use crate::lock::{BusyLock, FileLeaseStore, SignalBus};
pub use crate::walk::{WalkError, WalkSessionScheduler};
