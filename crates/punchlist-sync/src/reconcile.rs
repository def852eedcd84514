//! Reconciliation: merging local and remote report state.
//!
//! The merge itself is a pure function, `merge_reports`, so every policy
//! decision is unit-testable without I/O. `Reconciler` wraps it with the
//! remote fetch, zombie re-deletes, and the concurrent push of
//! locally-newer records.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use punchlist_core::{Report, ReportId};

use crate::error::SyncResult;
use crate::queue::OperationQueue;
use crate::remote::RemoteService;

/// Outcome of a merge: the new authoritative local set, the records that
/// must be pushed to the remote, and the tombstoned ids still present
/// remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// New authoritative local set, sorted by `last_modified` descending.
    pub merged: Vec<Report>,
    /// Records whose local copy won and must be saved remotely.
    pub push: Vec<Report>,
    /// Remote records matching a local tombstone; each needs a remote
    /// delete re-issued.
    pub zombies: Vec<ReportId>,
}

/// Whole-record last-writer-wins merge.
///
/// Policy, in order:
/// - A tombstoned id never appears in the result, whatever either side
///   holds; remote copies of tombstoned ids are reported as zombies.
/// - A local report absent from remote (and not tombstoned) is treated as
///   created offline and kept. Absence from remote never implies remote
///   deletion, so a report deleted server-side through some out-of-band
///   channel is resurrected here; that bias toward preservation is
///   deliberate.
/// - When both sides hold an id, the strictly greater `last_modified`
///   wins; on a tie the remote copy wins and nothing is pushed.
///
/// The result is stably sorted most-recently-modified first, a display
/// contract rather than a correctness one. The merge is idempotent:
/// re-running with the same remote snapshot and no intervening local
/// mutation yields an identical merged set.
#[must_use]
pub fn merge_reports(
    local: &[Report],
    tombstones: &HashSet<ReportId>,
    remote: &[Report],
) -> MergePlan {
    let mut merged: Vec<Report> = Vec::with_capacity(remote.len() + local.len());
    let mut index: HashMap<ReportId, usize> = HashMap::new();
    let mut zombies = Vec::new();

    for report in remote {
        if tombstones.contains(&report.id) {
            zombies.push(report.id);
        } else {
            index.insert(report.id, merged.len());
            merged.push(report.clone());
        }
    }

    let mut push = Vec::new();
    for report in local {
        if tombstones.contains(&report.id) {
            // Pending deletion; a transient local copy must not resurrect it
            continue;
        }
        match index.get(&report.id) {
            None => {
                index.insert(report.id, merged.len());
                merged.push(report.clone());
                push.push(report.clone());
            }
            Some(&at) => {
                if report.last_modified > merged[at].last_modified {
                    merged[at] = report.clone();
                    push.push(report.clone());
                }
            }
        }
    }

    // sort_by is stable, so equal timestamps keep their prior order
    merged.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));

    MergePlan {
        merged,
        push,
        zombies,
    }
}

/// Runs merge passes against the remote service.
#[derive(Clone)]
pub struct Reconciler {
    remote: Arc<dyn RemoteService>,
    queue: OperationQueue,
}

impl Reconciler {
    pub fn new(remote: Arc<dyn RemoteService>, queue: OperationQueue) -> Self {
        Self { remote, queue }
    }

    /// Fetch remote state and merge it with the given local snapshot.
    ///
    /// A failed fetch aborts the whole pass with the error and leaves local
    /// state untouched. Zombie re-deletes are fired without blocking the
    /// pass; pushes run concurrently, and any push that fails is queued for
    /// retry instead of failing the pass.
    pub async fn reconcile(
        &self,
        local: &[Report],
        tombstones: &HashSet<ReportId>,
    ) -> SyncResult<Vec<Report>> {
        let remote_reports = self.remote.fetch_reports().await?;

        let plan = merge_reports(local, tombstones, &remote_reports);

        for id in plan.zombies {
            tracing::debug!(report_id = %id, "re-deleting zombie remote report");
            let remote = self.remote.clone();
            tokio::spawn(async move {
                if let Err(error) = remote.delete_report(id).await {
                    tracing::warn!(report_id = %id, %error, "zombie re-delete failed");
                }
            });
        }

        let pushes = plan.push.into_iter().map(|report| {
            let remote = self.remote.clone();
            async move {
                let result = remote.save_report(&report).await;
                (report, result)
            }
        });

        for (report, result) in futures::future::join_all(pushes).await {
            if let Err(error) = result {
                tracing::warn!(
                    report_id = %report.id,
                    %error,
                    "push failed during reconciliation, queueing for retry"
                );
                if let Err(error) = self.queue.enqueue_save(report).await {
                    tracing::warn!(%error, "failed to queue push for retry");
                }
            }
        }

        Ok(plan.merged)
    }
}
