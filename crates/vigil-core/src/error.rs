//! Vigil error types.

use thiserror::Error;

/// Errors produced by the survival tier.
#[derive(Debug, Error)]
pub enum VigilError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VigilError>;
