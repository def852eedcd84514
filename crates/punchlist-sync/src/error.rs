//! Error types for punchlist-sync

use thiserror::Error;

/// Result type alias using punchlist-sync's error
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while synchronizing with the remote service.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Device is offline; the operation was not attempted.
    #[error("Device is offline")]
    Offline,

    /// No auth credential available; treated like a connectivity failure so
    /// the operation is queued rather than attempted.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Transport-level HTTP failure (network unreachable, timeout).
    #[error("Sync HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote service rejected the request.
    #[error("Remote service error: {message} ({status})")]
    Remote { status: u16, message: String },

    /// Invalid sync configuration (e.g. malformed base URL).
    #[error("Invalid sync configuration: {0}")]
    InvalidConfiguration(String),

    /// Local storage failure.
    #[error("Local storage failed: {0}")]
    Storage(#[from] punchlist_core::Error),
}

impl SyncError {
    /// Whether this failure belongs to the recoverable connectivity class:
    /// queue the operation and retry later, never surface as fatal.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Offline | Self::Unauthenticated | Self::Http(_) | Self::Remote { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_class_excludes_storage_and_config() {
        assert!(SyncError::Offline.is_connectivity());
        assert!(SyncError::Unauthenticated.is_connectivity());
        assert!(SyncError::Remote {
            status: 500,
            message: "boom".to_string()
        }
        .is_connectivity());

        assert!(!SyncError::InvalidConfiguration("bad url".to_string()).is_connectivity());
        assert!(!SyncError::Storage(punchlist_core::Error::QuotaExceeded).is_connectivity());
    }
}
