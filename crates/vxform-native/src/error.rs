//! Error codes of the native media library.

use thiserror::Error;

/// Errors returned by native frames, scaling contexts and filter graphs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NativeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Filter not found: {0}")]
    FilterNotFound(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Graph configuration error: {0}")]
    GraphConfig(String),

    #[error("Resource temporarily unavailable")]
    Again,

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Hardware transfer error: {0}")]
    HwTransfer(String),
}

/// Result type alias for native operations.
pub type Result<T> = std::result::Result<T, NativeError>;
