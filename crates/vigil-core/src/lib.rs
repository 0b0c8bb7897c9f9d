//! # Vigil Core
//!
//! Shared foundation for the survival tier: configuration, error types, and
//! the append-only session WAL.

pub mod config;
pub mod error;
pub mod wal;

pub use config::{CourierConfig, OracleConfig, VigilConfig, WatchdogConfig};
pub use error::{Result, VigilError};
pub use wal::{WalEvent, WalLog};

/// Expand a leading `~` in configured paths.
pub fn expand_path(p: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(shellexpand::tilde(p).to_string())
}
