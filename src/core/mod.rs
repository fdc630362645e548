pub mod config;
pub mod retry;
pub mod types;

pub use config::WalkerConfig;
pub use types::SessionFlags;
