//! punchlist-sync - Offline-first synchronization for Punchlist
//!
//! The subsystem that decides, for each report, whether the local copy, the
//! cloud copy, or a merge of both is authoritative; persists and retries
//! locally-queued mutations against the remote service; and keeps tombstones
//! so deleted reports cannot be resurrected by stale remote copies.
//!
//! User mutations are two-phase: a synchronous local write that never waits
//! on the network, followed by a queued remote write delivered
//! at-least-once. Conflict resolution is whole-report last-writer-wins on
//! `last_modified`, with remote winning ties.

pub mod config;
pub mod connectivity;
pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod reconcile;
pub mod remote;

pub use config::SyncConfig;
pub use connectivity::{ConnectivityMonitor, SubscriptionId};
pub use error::{SyncError, SyncResult};
pub use orchestrator::{SyncHandle, SyncOrchestrator, SyncStatus};
pub use queue::{OperationKind, OperationQueue, QueuedOperation};
pub use reconcile::{merge_reports, MergePlan, Reconciler};
pub use remote::{AuthProvider, HttpReportService, RemoteService};
