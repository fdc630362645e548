//! The traversal/walk engine: route probing, scroll-target resolution,
//! interaction simulation, dwell, load-more forcing, the filter sweep, and
//! the session scheduler that composes them.

pub mod cycle;
pub mod dwell;
pub mod interact;
pub mod loadmore;
pub mod probe;
pub mod scheduler;
pub mod scroll;
pub mod sweep;

use thiserror::Error;

use crate::driver::DriverError;
use crate::lock::LockError;

pub use probe::PageProbe;
pub use scheduler::WalkSessionScheduler;
pub use scroll::ScrollTargetResolver;

#[derive(Debug, Error)]
pub enum WalkError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Lock(#[from] LockError),
}
