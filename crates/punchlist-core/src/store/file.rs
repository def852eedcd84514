//! JSON-file-backed implementation of [`LocalStore`]
//!
//! One file per collection inside a data directory. Writes go to a
//! temporary file first and are renamed into place, so a crash mid-write
//! never leaves a truncated collection behind.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{Report, ReportId};

use super::LocalStore;

const REPORTS_FILE: &str = "reports.json";
const TOMBSTONES_FILE: &str = "tombstones.json";
const QUEUE_FILE: &str = "queue.json";

/// ENOSPC, for platforms/toolchains where the io error kind is unavailable
const ENOSPC: i32 = 28;

/// File-per-collection local store rooted at a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    async fn write_json<T: Serialize + Sync>(&self, name: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let target = self.path(name);
        let tmp = self.path(&format!("{name}.tmp"));

        write_all(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(map_io_error)?;
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match tokio::fs::read(self.path(name)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(map_io_error(error)),
        }
    }

    async fn remove(&self, name: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(name)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(map_io_error(error)),
        }
    }
}

async fn write_all(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes).await.map_err(map_io_error)
}

fn map_io_error(error: std::io::Error) -> Error {
    if error.kind() == ErrorKind::StorageFull || error.raw_os_error() == Some(ENOSPC) {
        Error::QuotaExceeded
    } else {
        Error::Io(error)
    }
}

#[async_trait]
impl LocalStore for FileStore {
    async fn save_reports(&self, reports: &[Report]) -> Result<()> {
        self.write_json(REPORTS_FILE, &reports).await
    }

    async fn load_reports(&self) -> Result<Vec<Report>> {
        Ok(self.read_json(REPORTS_FILE).await?.unwrap_or_default())
    }

    async fn save_tombstones(&self, tombstones: &HashSet<ReportId>) -> Result<()> {
        self.write_json(TOMBSTONES_FILE, tombstones).await
    }

    async fn load_tombstones(&self) -> Result<HashSet<ReportId>> {
        Ok(self.read_json(TOMBSTONES_FILE).await?.unwrap_or_default())
    }

    async fn save_queue(&self, blob: &serde_json::Value) -> Result<()> {
        self.write_json(QUEUE_FILE, blob).await
    }

    async fn load_queue(&self) -> Result<Option<serde_json::Value>> {
        self.read_json(QUEUE_FILE).await
    }

    async fn clear_all(&self) -> Result<()> {
        self.remove(REPORTS_FILE).await?;
        self.remove(TOMBSTONES_FILE).await?;
        self.remove(QUEUE_FILE).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn round_trips_reports() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let reports = vec![Report::new("Harbour Tower"), Report::new("Depot Annex")];
        store.save_reports(&reports).await.unwrap();

        let loaded = store.load_reports().await.unwrap();
        assert_eq!(reports, loaded);
    }

    #[tokio::test]
    async fn empty_store_loads_empty_collections() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert!(store.load_reports().await.unwrap().is_empty());
        assert!(store.load_tombstones().await.unwrap().is_empty());
        assert!(store.load_queue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn round_trips_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let mut tombstones = HashSet::new();
        tombstones.insert(ReportId::new());
        tombstones.insert(ReportId::new());
        store.save_tombstones(&tombstones).await.unwrap();

        assert_eq!(store.load_tombstones().await.unwrap(), tombstones);
    }

    #[tokio::test]
    async fn clear_all_wipes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.save_reports(&[Report::new("Harbour Tower")]).await.unwrap();
        store
            .save_queue(&serde_json::json!({ "version": 1, "ops": [] }))
            .await
            .unwrap();
        store.clear_all().await.unwrap();

        assert!(store.load_reports().await.unwrap().is_empty());
        assert!(store.load_queue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store
            .save_reports(&[Report::new("Harbour Tower"), Report::new("Depot Annex")])
            .await
            .unwrap();
        let only = vec![Report::new("Depot Annex")];
        store.save_reports(&only).await.unwrap();

        assert_eq!(store.load_reports().await.unwrap(), only);
    }
}
