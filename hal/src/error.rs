//! Common error types for HAL operations

use thiserror::Error;

/// HAL operation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    /// Invalid parameter provided
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    /// Pin or peripheral is already claimed by another driver
    #[error("pins {0:#010x} are already claimed")]
    AlreadyClaimed(u32),
    /// Pin or peripheral was used without being claimed first
    #[error("pins {0:#010x} are not claimed")]
    NotClaimed(u32),
    /// The interrupt line was shut down while a thread waited on it
    #[error("interrupt line closed")]
    Closed,
    /// Hardware error occurred
    #[error("hardware error: {0}")]
    Hardware(String),
}

/// Result type for HAL operations
pub type HalResult<T> = Result<T, HalError>;
