//! Durable operation queue.
//!
//! At-least-once delivery of report mutations to the remote service,
//! tolerant of restarts and partial failures. The queue is persisted as a
//! single versioned blob and fully rewritten after every mutation and after
//! every drain pass.
//!
//! Draining is guarded by a single `AtomicBool` rather than a lock: in this
//! cooperative model it is the only mutual exclusion in the subsystem, and
//! it is released by a `Drop` guard so an error anywhere inside a pass can
//! never stall the queue permanently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use punchlist_core::models::now_ms;
use punchlist_core::{LocalStore, Report, ReportId};

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteService;

const QUEUE_VERSION: u32 = 1;

/// Kind of pending remote mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Upsert the full report.
    Save(Report),
    /// Delete by report id.
    Delete,
}

/// One pending remote mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Operation identifier; distinct from the report id so historical
    /// operations for the same report can coexist until superseded.
    pub op_id: Uuid,
    /// Report this operation applies to.
    pub report_id: ReportId,
    pub kind: OperationKind,
    /// Creation time (Unix ms), for diagnostics.
    pub queued_at: i64,
    /// Failed attempts so far.
    pub retries: u32,
}

impl QueuedOperation {
    fn save(report: Report) -> Self {
        Self {
            op_id: Uuid::now_v7(),
            report_id: report.id,
            kind: OperationKind::Save(report),
            queued_at: now_ms(),
            retries: 0,
        }
    }

    fn delete(report_id: ReportId) -> Self {
        Self {
            op_id: Uuid::now_v7(),
            report_id,
            kind: OperationKind::Delete,
            queued_at: now_ms(),
            retries: 0,
        }
    }

    fn is_save(&self) -> bool {
        matches!(self.kind, OperationKind::Save(_))
    }
}

/// Persisted queue envelope. Unknown versions are discarded on load.
#[derive(Debug, Serialize, Deserialize)]
struct QueueEnvelope {
    version: u32,
    ops: Vec<QueuedOperation>,
}

struct QueueInner {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteService>,
    monitor: ConnectivityMonitor,
    config: SyncConfig,
    ops: Mutex<Vec<QueuedOperation>>,
    draining: AtomicBool,
}

/// Releases the drain guard on every exit path, including early returns and
/// errors mid-pass.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Durable FIFO-ish queue of pending remote mutations.
#[derive(Clone)]
pub struct OperationQueue {
    inner: Arc<QueueInner>,
}

impl OperationQueue {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteService>,
        monitor: ConnectivityMonitor,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                store,
                remote,
                monitor,
                config,
                ops: Mutex::new(Vec::new()),
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// Restore the persisted queue, typically once at startup. A blob with
    /// an unknown version or unreadable contents is discarded with a
    /// warning rather than failing startup.
    pub async fn load(&self) -> SyncResult<()> {
        let Some(blob) = self.inner.store.load_queue().await? else {
            return Ok(());
        };

        match serde_json::from_value::<QueueEnvelope>(blob) {
            Ok(envelope) if envelope.version == QUEUE_VERSION => {
                let count = envelope.ops.len();
                *self.inner.ops.lock() = envelope.ops;
                tracing::debug!(count, "restored persisted operation queue");
            }
            Ok(envelope) => {
                tracing::warn!(
                    version = envelope.version,
                    "discarding queue blob with unknown version"
                );
            }
            Err(error) => {
                tracing::warn!(%error, "discarding unreadable queue blob");
            }
        }
        Ok(())
    }

    /// Queue a save. Any earlier queued save for the same report is
    /// superseded so only the latest state is ever sent. Returns once the
    /// queue is persisted - "accepted", not "delivered".
    pub async fn enqueue_save(&self, report: Report) -> SyncResult<()> {
        {
            let mut ops = self.inner.ops.lock();
            ops.retain(|op| !(op.report_id == report.id && op.is_save()));
            ops.push(QueuedOperation::save(report));
        }
        self.persist().await?;
        self.drain_in_background();
        Ok(())
    }

    /// Queue a delete. Removes any pending save for the id (a delete makes
    /// it moot); a second delete for the same id is a no-op.
    pub async fn enqueue_delete(&self, report_id: ReportId) -> SyncResult<()> {
        let changed = {
            let mut ops = self.inner.ops.lock();
            let before = ops.len();
            ops.retain(|op| !(op.report_id == report_id && op.is_save()));
            let removed_save = ops.len() != before;

            let already_queued = ops
                .iter()
                .any(|op| op.report_id == report_id && op.kind == OperationKind::Delete);
            if already_queued {
                removed_save
            } else {
                ops.push(QueuedOperation::delete(report_id));
                true
            }
        };

        if changed {
            self.persist().await?;
            self.drain_in_background();
        }
        Ok(())
    }

    /// Attempt delivery of every queued operation, in insertion order.
    ///
    /// No-op when offline, empty, or a drain is already running. Failed
    /// operations stay queued with an incremented retry count and are
    /// dropped permanently after `max_retries` failures. A missing access
    /// token aborts the pass without consuming retries. If work remains
    /// after the pass and we are still online, another pass is scheduled
    /// after a flat delay.
    pub async fn drain(&self) {
        if !self.inner.monitor.is_online() {
            return;
        }
        if self.inner.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        let _guard = DrainGuard(&self.inner.draining);

        let snapshot: Vec<QueuedOperation> = self.inner.ops.lock().clone();
        if snapshot.is_empty() {
            return;
        }

        tracing::debug!(count = snapshot.len(), "draining operation queue");

        let mut awaiting_auth = false;
        for (position, op) in snapshot.iter().enumerate() {
            if position > 0 {
                // Space out requests instead of bursting the service
                tokio::time::sleep(self.inner.config.inter_op_delay).await;
            }

            let outcome = self.attempt(op).await;

            // Mutate the live queue, never the stale snapshot
            let mut ops = self.inner.ops.lock();
            match outcome {
                Ok(()) => {
                    ops.retain(|candidate| candidate.op_id != op.op_id);
                }
                Err(SyncError::Unauthenticated) => {
                    // Not a delivery failure: leave the queue intact and
                    // wait for the app to authenticate
                    tracing::debug!("not authenticated, keeping queue for later");
                    awaiting_auth = true;
                    break;
                }
                Err(error) => {
                    let retries = ops
                        .iter_mut()
                        .find(|candidate| candidate.op_id == op.op_id)
                        .map(|entry| {
                            entry.retries += 1;
                            entry.retries
                        });

                    if let Some(retries) = retries {
                        if retries >= self.inner.config.max_retries {
                            tracing::warn!(
                                report_id = %op.report_id,
                                retries,
                                %error,
                                "retry budget exhausted, dropping queued operation"
                            );
                            ops.retain(|candidate| candidate.op_id != op.op_id);
                        } else {
                            tracing::warn!(
                                report_id = %op.report_id,
                                retries,
                                %error,
                                "queued operation failed, will retry"
                            );
                        }
                    }
                }
            }
        }

        let remaining = match self.persist().await {
            Ok(remaining) => remaining,
            Err(error) => {
                tracing::warn!(%error, "failed to persist queue after drain pass");
                self.len()
            }
        };

        if remaining > 0 && !awaiting_auth && self.inner.monitor.is_online() {
            self.schedule_drain(self.inner.config.drain_retry_delay);
        }
    }

    /// Spawn a delayed drain pass. Kept out of `drain` itself so the
    /// compiler can resolve the recursive future's auto traits.
    fn schedule_drain(&self, delay: std::time::Duration) {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.drain().await;
        });
    }

    /// Number of pending operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.ops.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.ops.lock().is_empty()
    }

    /// Whether a drain pass is currently running.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }

    /// Read-only copy of the pending operations, for diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> Vec<QueuedOperation> {
        self.inner.ops.lock().clone()
    }

    /// Administrative wipe; used only by clear-all-local-data flows.
    pub async fn clear(&self) -> SyncResult<()> {
        self.inner.ops.lock().clear();
        self.persist().await?;
        Ok(())
    }

    async fn attempt(&self, op: &QueuedOperation) -> SyncResult<()> {
        match &op.kind {
            OperationKind::Save(report) => self.inner.remote.save_report(report).await,
            OperationKind::Delete => self.inner.remote.delete_report(op.report_id).await,
        }
    }

    fn drain_in_background(&self) {
        if !self.inner.monitor.is_online() {
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            queue.drain().await;
        });
    }

    async fn persist(&self) -> SyncResult<usize> {
        let (blob, remaining) = {
            let ops = self.inner.ops.lock();
            let envelope = QueueEnvelope {
                version: QUEUE_VERSION,
                ops: ops.clone(),
            };
            let blob = serde_json::to_value(&envelope).map_err(punchlist_core::Error::from)?;
            (blob, ops.len())
        };
        self.inner.store.save_queue(&blob).await?;
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use punchlist_core::MemoryStore;

    #[derive(Default)]
    struct ScriptedRemote {
        fail_all: AtomicBool,
        fail_auth: AtomicBool,
        save_attempts: AtomicUsize,
        delete_attempts: AtomicUsize,
        delivered: Mutex<Vec<(ReportId, &'static str)>>,
    }

    impl ScriptedRemote {
        fn set_failing(&self, failing: bool) {
            self.fail_all.store(failing, Ordering::SeqCst);
        }

        fn set_unauthenticated(&self, missing: bool) {
            self.fail_auth.store(missing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl RemoteService for ScriptedRemote {
        async fn fetch_reports(&self) -> SyncResult<Vec<Report>> {
            Ok(Vec::new())
        }

        async fn save_report(&self, report: &Report) -> SyncResult<()> {
            self.save_attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_auth.load(Ordering::SeqCst) {
                return Err(SyncError::Unauthenticated);
            }
            if self.fail_all.load(Ordering::SeqCst) {
                return Err(SyncError::Offline);
            }
            self.delivered.lock().push((report.id, "save"));
            Ok(())
        }

        async fn delete_report(&self, id: ReportId) -> SyncResult<()> {
            self.delete_attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_all.load(Ordering::SeqCst) {
                return Err(SyncError::Offline);
            }
            self.delivered.lock().push((id, "delete"));
            Ok(())
        }
    }

    fn offline_queue(remote: Arc<ScriptedRemote>) -> (OperationQueue, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let monitor = ConnectivityMonitor::new(false);
        let queue = OperationQueue::new(store.clone(), remote, monitor, SyncConfig::default());
        (queue, store)
    }

    #[tokio::test]
    async fn save_supersedes_earlier_save_for_same_report() {
        let remote = Arc::new(ScriptedRemote::default());
        let (queue, _store) = offline_queue(remote);

        let mut report = Report::new("Harbour Tower");
        report.last_modified = 100;
        queue.enqueue_save(report.clone()).await.unwrap();

        report.last_modified = 200;
        queue.enqueue_save(report.clone()).await.unwrap();

        let ops = queue.snapshot();
        assert_eq!(ops.len(), 1);
        match &ops[0].kind {
            OperationKind::Save(queued) => assert_eq!(queued.last_modified, 200),
            OperationKind::Delete => panic!("expected a save operation"),
        }
    }

    #[tokio::test]
    async fn saves_for_different_reports_coexist() {
        let remote = Arc::new(ScriptedRemote::default());
        let (queue, _store) = offline_queue(remote);

        queue.enqueue_save(Report::new("A")).await.unwrap();
        queue.enqueue_save(Report::new("B")).await.unwrap();

        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn delete_dominates_pending_save() {
        let remote = Arc::new(ScriptedRemote::default());
        let (queue, _store) = offline_queue(remote);

        let report = Report::new("Harbour Tower");
        queue.enqueue_save(report.clone()).await.unwrap();
        queue.enqueue_delete(report.id).await.unwrap();

        let ops = queue.snapshot();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::Delete);
        assert_eq!(ops[0].report_id, report.id);
    }

    #[tokio::test]
    async fn duplicate_delete_is_a_no_op() {
        let remote = Arc::new(ScriptedRemote::default());
        let (queue, _store) = offline_queue(remote);

        let id = ReportId::new();
        queue.enqueue_delete(id).await.unwrap();
        queue.enqueue_delete(id).await.unwrap();

        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn queue_survives_restart() {
        let remote = Arc::new(ScriptedRemote::default());
        let (queue, store) = offline_queue(remote.clone());

        queue.enqueue_save(Report::new("Harbour Tower")).await.unwrap();
        queue.enqueue_delete(ReportId::new()).await.unwrap();

        // Fresh instance over the same store, as after a process restart
        let monitor = ConnectivityMonitor::new(false);
        let restored = OperationQueue::new(store, remote, monitor, SyncConfig::default());
        restored.load().await.unwrap();

        assert_eq!(restored.snapshot(), queue.snapshot());
    }

    #[tokio::test]
    async fn unknown_queue_version_is_discarded() {
        let remote = Arc::new(ScriptedRemote::default());
        let (queue, store) = offline_queue(remote);

        store
            .save_queue(&serde_json::json!({ "version": 99, "ops": [] }))
            .await
            .unwrap();
        queue.load().await.unwrap();

        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_delivers_in_insertion_order() {
        let remote = Arc::new(ScriptedRemote::default());
        let store = Arc::new(MemoryStore::new());
        let monitor = ConnectivityMonitor::new(false);
        let queue = OperationQueue::new(
            store,
            remote.clone(),
            monitor.clone(),
            SyncConfig::default(),
        );

        let first = Report::new("A");
        let second = Report::new("B");
        let gone = ReportId::new();
        queue.enqueue_save(first.clone()).await.unwrap();
        queue.enqueue_save(second.clone()).await.unwrap();
        queue.enqueue_delete(gone).await.unwrap();

        monitor.set_online(true);
        queue.drain().await;

        assert!(queue.is_empty());
        let delivered = remote.delivered.lock().clone();
        assert_eq!(
            delivered,
            vec![
                (first.id, "save"),
                (second.id, "save"),
                (gone, "delete")
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_drops_operation_after_three_failures() {
        let remote = Arc::new(ScriptedRemote::default());
        remote.set_failing(true);
        let store = Arc::new(MemoryStore::new());
        let monitor = ConnectivityMonitor::new(false);
        let queue = OperationQueue::new(
            store,
            remote.clone(),
            monitor.clone(),
            SyncConfig::default(),
        );

        queue.enqueue_save(Report::new("Harbour Tower")).await.unwrap();
        monitor.set_online(true);

        queue.drain().await;
        // Scheduled re-drains run off the paused clock; give them room for
        // well past the two remaining attempts
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;

        assert_eq!(remote.save_attempts.load(Ordering::SeqCst), 3);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pass_releases_guard_and_keeps_operation() {
        let remote = Arc::new(ScriptedRemote::default());
        remote.set_failing(true);
        let store = Arc::new(MemoryStore::new());
        let monitor = ConnectivityMonitor::new(true);
        let queue = OperationQueue::new(
            store,
            remote.clone(),
            monitor,
            SyncConfig::default(),
        );

        let report = Report::new("Harbour Tower");
        {
            let mut ops = queue.inner.ops.lock();
            ops.push(QueuedOperation::save(report.clone()));
        }

        queue.drain().await;

        // The guard must be released even though every attempt failed
        assert!(!queue.is_draining());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.snapshot()[0].retries, 1);

        // And the queue still works once the remote recovers
        remote.set_failing(false);
        queue.drain().await;
        assert!(queue.is_empty());
        assert_eq!(remote.delivered.lock().last(), Some(&(report.id, "save")));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_token_keeps_queue_without_spending_retries() {
        let remote = Arc::new(ScriptedRemote::default());
        remote.set_unauthenticated(true);
        let store = Arc::new(MemoryStore::new());
        let monitor = ConnectivityMonitor::new(true);
        let queue = OperationQueue::new(
            store,
            remote.clone(),
            monitor,
            SyncConfig::default(),
        );

        let report = Report::new("Harbour Tower");
        queue.enqueue_save(report.clone()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;

        // Only the pass the enqueue kicked off ran; nothing was rescheduled
        // and the retry budget is untouched
        assert_eq!(remote.save_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.snapshot()[0].retries, 0);

        // Once a token is available the queue drains normally
        remote.set_unauthenticated(false);
        queue.drain().await;
        assert!(queue.is_empty());
        assert_eq!(remote.delivered.lock().last(), Some(&(report.id, "save")));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_is_a_no_op_while_offline() {
        let remote = Arc::new(ScriptedRemote::default());
        let (queue, _store) = offline_queue(remote.clone());

        queue.enqueue_save(Report::new("Harbour Tower")).await.unwrap();
        queue.drain().await;

        assert_eq!(queue.len(), 1);
        assert_eq!(remote.save_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn clear_empties_queue_and_persists() {
        let remote = Arc::new(ScriptedRemote::default());
        let (queue, store) = offline_queue(remote.clone());

        queue.enqueue_save(Report::new("Harbour Tower")).await.unwrap();
        queue.clear().await.unwrap();
        assert!(queue.is_empty());

        let monitor = ConnectivityMonitor::new(false);
        let restored = OperationQueue::new(store, remote, monitor, SyncConfig::default());
        restored.load().await.unwrap();
        assert!(restored.is_empty());
    }
}
