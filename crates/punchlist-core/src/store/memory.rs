//! In-memory implementation of [`LocalStore`]
//!
//! Used by tests and embedding scenarios that do not need durability. A
//! report-count quota can be injected to exercise the quota-exceeded
//! recovery path.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::models::{Report, ReportId};

use super::LocalStore;

#[derive(Default)]
struct MemoryInner {
    reports: Vec<Report>,
    tombstones: HashSet<ReportId>,
    queue: Option<serde_json::Value>,
    /// When set, `save_reports` fails with `QuotaExceeded` if the new set
    /// holds more than this many reports.
    quota: Option<usize>,
}

/// In-memory local store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of reports `save_reports` will accept, or lift the
    /// limit with `None`.
    pub fn set_quota(&self, max_reports: Option<usize>) {
        self.inner.lock().quota = max_reports;
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn save_reports(&self, reports: &[Report]) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(quota) = inner.quota {
            if reports.len() > quota {
                return Err(Error::QuotaExceeded);
            }
        }
        inner.reports = reports.to_vec();
        Ok(())
    }

    async fn load_reports(&self) -> Result<Vec<Report>> {
        Ok(self.inner.lock().reports.clone())
    }

    async fn save_tombstones(&self, tombstones: &HashSet<ReportId>) -> Result<()> {
        self.inner.lock().tombstones = tombstones.clone();
        Ok(())
    }

    async fn load_tombstones(&self) -> Result<HashSet<ReportId>> {
        Ok(self.inner.lock().tombstones.clone())
    }

    async fn save_queue(&self, blob: &serde_json::Value) -> Result<()> {
        self.inner.lock().queue = Some(blob.clone());
        Ok(())
    }

    async fn load_queue(&self) -> Result<Option<serde_json::Value>> {
        Ok(self.inner.lock().queue.clone())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.reports.clear();
        inner.tombstones.clear();
        inner.queue = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn round_trips_reports_and_tombstones() {
        let store = MemoryStore::new();
        let reports = vec![Report::new("Harbour Tower")];
        store.save_reports(&reports).await.unwrap();
        assert_eq!(store.load_reports().await.unwrap(), reports);

        let mut tombstones = HashSet::new();
        tombstones.insert(ReportId::new());
        store.save_tombstones(&tombstones).await.unwrap();
        assert_eq!(store.load_tombstones().await.unwrap(), tombstones);
    }

    #[tokio::test]
    async fn quota_limit_fails_save() {
        let store = MemoryStore::new();
        store.set_quota(Some(1));

        let two = vec![Report::new("A"), Report::new("B")];
        let error = store.save_reports(&two).await.unwrap_err();
        assert!(matches!(error, Error::QuotaExceeded));

        // Within quota succeeds, and previous contents were untouched
        store.save_reports(&two[..1]).await.unwrap();
        assert_eq!(store.load_reports().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_all_resets_state() {
        let store = MemoryStore::new();
        store.save_reports(&[Report::new("A")]).await.unwrap();
        store
            .save_queue(&serde_json::json!({ "version": 1, "ops": [] }))
            .await
            .unwrap();

        store.clear_all().await.unwrap();
        assert!(store.load_reports().await.unwrap().is_empty());
        assert!(store.load_queue().await.unwrap().is_none());
    }
}
