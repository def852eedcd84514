//! Sync orchestrator.
//!
//! Owns the authoritative local report set and the tombstone set, drives
//! reconciliation on a schedule and on reconnect, and surfaces a
//! user-visible sync status. User mutations are optimistic: the local write
//! and the queueing of the remote write both complete before any network
//! confirmation, so the UI never blocks on connectivity.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use punchlist_core::{LocalStore, Report, ReportId};

use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, SubscriptionId};
use crate::error::{SyncError, SyncResult};
use crate::queue::OperationQueue;
use crate::reconcile::Reconciler;
use crate::remote::RemoteService;

/// User-visible sync state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    /// A non-silent reconciliation is in progress.
    Syncing,
    /// A non-silent pass failed; dismissible.
    Error(String),
    /// Local storage is full; stays visible until a save succeeds again.
    QuotaWarning,
}

struct OrchestratorInner {
    store: Arc<dyn LocalStore>,
    queue: OperationQueue,
    reconciler: Reconciler,
    monitor: ConnectivityMonitor,
    config: SyncConfig,
    reports: Mutex<Vec<Report>>,
    tombstones: Mutex<HashSet<ReportId>>,
    status_tx: watch::Sender<SyncStatus>,
}

/// Running background sync; aborts the poll loop and unsubscribes from
/// connectivity when stopped or dropped.
pub struct SyncHandle {
    task: JoinHandle<()>,
    monitor: ConnectivityMonitor,
    subscription: SubscriptionId,
}

impl SyncHandle {
    pub fn stop(&self) {
        self.task.abort();
        self.monitor.unsubscribe(self.subscription);
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ties the store, queue, reconciler, and connectivity monitor together.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteService>,
        monitor: ConnectivityMonitor,
        config: SyncConfig,
    ) -> Self {
        let queue = OperationQueue::new(
            store.clone(),
            remote.clone(),
            monitor.clone(),
            config.clone(),
        );
        let reconciler = Reconciler::new(remote, queue.clone());
        let (status_tx, _status_rx) = watch::channel(SyncStatus::Idle);

        Self {
            inner: Arc::new(OrchestratorInner {
                store,
                queue,
                reconciler,
                monitor,
                config,
                reports: Mutex::new(Vec::new()),
                tombstones: Mutex::new(HashSet::new()),
                status_tx,
            }),
        }
    }

    /// Restore reports, tombstones, and the operation queue from the local
    /// store. Call once at startup before mutating anything.
    pub async fn load(&self) -> SyncResult<()> {
        let reports = self.inner.store.load_reports().await?;
        let tombstones = self.inner.store.load_tombstones().await?;
        *self.inner.reports.lock() = reports;
        *self.inner.tombstones.lock() = tombstones;
        self.inner.queue.load().await
    }

    /// Current authoritative report set (most recently modified first after
    /// a reconciliation pass).
    #[must_use]
    pub fn reports(&self) -> Vec<Report> {
        self.inner.reports.lock().clone()
    }

    /// Watch the user-visible sync status.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Dismiss a surfaced error. Quota warnings are not dismissible; they
    /// clear when a save succeeds again.
    pub fn dismiss_error(&self) {
        if matches!(&*self.inner.status_tx.borrow(), SyncStatus::Error(_)) {
            self.set_status(SyncStatus::Idle);
        }
    }

    /// The underlying operation queue, for diagnostics.
    #[must_use]
    pub fn queue(&self) -> &OperationQueue {
        &self.inner.queue
    }

    /// Save a report: phase 1 updates the local set and persists it, phase
    /// 2 queues the remote upsert. Never waits on the network.
    pub async fn save_report(&self, report: Report) -> SyncResult<()> {
        let snapshot = {
            let mut reports = self.inner.reports.lock();
            match reports.iter_mut().find(|existing| existing.id == report.id) {
                Some(slot) => *slot = report.clone(),
                None => reports.push(report.clone()),
            }
            reports.clone()
        };

        self.persist_reports(&snapshot).await?;
        self.inner.queue.enqueue_save(report).await
    }

    /// Delete a report: optimistic local removal, tombstone, persist both,
    /// queue the remote delete - all before any network confirmation.
    pub async fn delete_report(&self, id: ReportId) -> SyncResult<()> {
        let reports_snapshot = {
            let mut reports = self.inner.reports.lock();
            reports.retain(|report| report.id != id);
            reports.clone()
        };
        let tombstones_snapshot = {
            let mut tombstones = self.inner.tombstones.lock();
            tombstones.insert(id);
            tombstones.clone()
        };

        self.persist_reports(&reports_snapshot).await?;
        self.inner.store.save_tombstones(&tombstones_snapshot).await?;
        self.inner.queue.enqueue_delete(id).await
    }

    /// Destructive: wipe local reports, tombstones, and the queue.
    pub async fn clear_local_data(&self) -> SyncResult<()> {
        self.inner.queue.clear().await?;
        self.inner.store.clear_all().await?;
        self.inner.reports.lock().clear();
        self.inner.tombstones.lock().clear();
        Ok(())
    }

    /// Run a user-initiated (non-silent) reconciliation pass now.
    pub async fn sync_now(&self) {
        self.run_pass(false).await;
    }

    /// Begin background syncing, to be called once authenticated: an
    /// immediate non-silent pass, then silent passes on the poll interval,
    /// plus a settle-then-sync on every reconnect.
    pub async fn start(&self) -> SyncHandle {
        self.run_pass(false).await;

        let poller = self.clone();
        let poll_interval = self.inner.config.poll_interval;
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                poller.run_pass(true).await;
            }
        });

        let settler = self.clone();
        let settle = self.inner.config.reconnect_settle_delay;
        let subscription = self.inner.monitor.subscribe(move |online| {
            if !online {
                return;
            }
            let orchestrator = settler.clone();
            tokio::spawn(async move {
                tokio::time::sleep(settle).await;
                orchestrator.run_pass(true).await;
                orchestrator.inner.queue.drain().await;
            });
        });

        SyncHandle {
            task,
            monitor: self.inner.monitor.clone(),
            subscription,
        }
    }

    /// One reconciliation pass. Never propagates an error: silent failures
    /// are logged, non-silent ones surface on the status channel.
    async fn run_pass(&self, silent: bool) {
        if !silent {
            self.set_status(SyncStatus::Syncing);
        }

        let local = self.inner.reports.lock().clone();
        let tombstones = self.inner.tombstones.lock().clone();

        match self.inner.reconciler.reconcile(&local, &tombstones).await {
            Ok(merged) => {
                *self.inner.reports.lock() = merged.clone();
                match self.persist_reports(&merged).await {
                    Ok(()) => {
                        if !silent {
                            self.set_status(SyncStatus::Idle);
                        }
                    }
                    Err(error) => self.surface_failure(silent, &error),
                }
            }
            Err(error) => self.surface_failure(silent, &error),
        }
    }

    fn surface_failure(&self, silent: bool, error: &SyncError) {
        if silent {
            tracing::warn!(%error, "silent sync pass failed");
        } else if !matches!(&*self.inner.status_tx.borrow(), SyncStatus::QuotaWarning) {
            self.set_status(SyncStatus::Error(error.to_string()));
        }
    }

    /// Persist the report set. On quota exhaustion, purge the oldest
    /// reports beyond the retention threshold and retry once; the quota
    /// warning stays up until a save goes through.
    async fn persist_reports(&self, reports: &[Report]) -> SyncResult<()> {
        match self.inner.store.save_reports(reports).await {
            Ok(()) => {
                self.clear_quota_warning();
                Ok(())
            }
            Err(punchlist_core::Error::QuotaExceeded) => {
                let keep = self.inner.config.quota_purge_keep;
                tracing::warn!(keep, "local storage full, purging oldest reports");

                let trimmed = purge_oldest(reports, keep);
                match self.inner.store.save_reports(&trimmed).await {
                    Ok(()) => {
                        *self.inner.reports.lock() = trimmed;
                        self.clear_quota_warning();
                        Ok(())
                    }
                    Err(error) => {
                        self.set_status(SyncStatus::QuotaWarning);
                        Err(error.into())
                    }
                }
            }
            Err(error) => Err(error.into()),
        }
    }

    fn clear_quota_warning(&self) {
        if matches!(&*self.inner.status_tx.borrow(), SyncStatus::QuotaWarning) {
            self.set_status(SyncStatus::Idle);
        }
    }

    fn set_status(&self, status: SyncStatus) {
        self.inner.status_tx.send_replace(status);
    }
}

/// Keep the `keep` most recently modified reports, dropping the rest.
fn purge_oldest(reports: &[Report], keep: usize) -> Vec<Report> {
    let mut sorted = reports.to_vec();
    sorted.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
    sorted.truncate(keep);
    sorted
}
