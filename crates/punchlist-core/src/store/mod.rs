//! Local storage layer
//!
//! Durable keyed storage for the report set, the tombstone set, and the
//! operation queue blob. Each collection is fully rewritten on every
//! mutation - there is no incremental format.

mod file;
mod memory;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Report, ReportId};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Durable local storage contract consumed by the sync subsystem.
///
/// Implementations must raise [`crate::Error::QuotaExceeded`] when the
/// underlying medium is full, so callers can distinguish it from other
/// storage failures and run cleanup before retrying.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Atomically replace the full stored report set.
    async fn save_reports(&self, reports: &[Report]) -> Result<()>;

    /// Load the full stored report set (empty if none).
    async fn load_reports(&self) -> Result<Vec<Report>>;

    /// Persist the tombstone id set, independent of the report set.
    async fn save_tombstones(&self, tombstones: &HashSet<ReportId>) -> Result<()>;

    /// Load the tombstone id set (empty if none).
    async fn load_tombstones(&self) -> Result<HashSet<ReportId>>;

    /// Persist the operation queue blob under its well-known key.
    async fn save_queue(&self, blob: &serde_json::Value) -> Result<()>;

    /// Load the operation queue blob, or `None` if nothing was persisted.
    async fn load_queue(&self) -> Result<Option<serde_json::Value>>;

    /// Wipe reports, tombstones, and the queue blob. Destructive; used only
    /// by clear-all-local-data flows.
    async fn clear_all(&self) -> Result<()>;
}
