//! Error types for punchlist-core

use thiserror::Error;

/// Result type alias using punchlist-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in punchlist-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Storage medium is full. Distinguished from other storage errors so
    /// callers can run cleanup and retry.
    #[error("Storage quota exceeded")]
    QuotaExceeded,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Report not found
    #[error("Report not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
