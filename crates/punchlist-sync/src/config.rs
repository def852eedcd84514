//! Sync subsystem configuration.
//!
//! All timing and bound constants live here so tests can shrink them and
//! app shells can tune them without touching the components.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
const DEFAULT_RECONNECT_SETTLE_MS: u64 = 2_000;
const DEFAULT_DRAIN_RETRY_SECS: u64 = 5;
const DEFAULT_INTER_OP_DELAY_MS: u64 = 300;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_QUOTA_PURGE_KEEP: usize = 25;

/// Tuning knobs for the queue, reconciler, and orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between silent background reconciliation passes.
    pub poll_interval: Duration,
    /// Delay after an online transition before syncing, letting the
    /// connection settle.
    pub reconnect_settle_delay: Duration,
    /// Flat delay before re-draining a queue that still has work. Not
    /// exponential.
    pub drain_retry_delay: Duration,
    /// Spacing between individual operation attempts within a drain pass,
    /// to avoid bursting the remote service.
    pub inter_op_delay: Duration,
    /// Failed attempts before an operation is dropped from the queue.
    pub max_retries: u32,
    /// Newest reports kept when purging after a quota-exceeded save.
    pub quota_purge_keep: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            reconnect_settle_delay: Duration::from_millis(DEFAULT_RECONNECT_SETTLE_MS),
            drain_retry_delay: Duration::from_secs(DEFAULT_DRAIN_RETRY_SECS),
            inter_op_delay: Duration::from_millis(DEFAULT_INTER_OP_DELAY_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            quota_purge_keep: DEFAULT_QUOTA_PURGE_KEEP,
        }
    }
}
