//! Connectivity monitor.
//!
//! Single source of truth for "can we reach the network", decoupled from
//! actual request success or failure. Platform online/offline events are
//! injected through [`ConnectivityMonitor::set_online`], which makes
//! transitions fully deterministic under test. No retry or backoff lives
//! here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

/// Handle returned by [`ConnectivityMonitor::subscribe`], used to
/// unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct MonitorInner {
    online: AtomicBool,
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, Listener>>,
}

/// Observable online/offline state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectivityMonitor {
    /// Create a monitor seeded with the runtime's current network status.
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                online: AtomicBool::new(initially_online),
                next_id: AtomicU64::new(0),
                listeners: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Current state. Synchronous, no side effects.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Register a listener invoked with the new state on every transition.
    pub fn subscribe(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners.lock().insert(id, Arc::new(listener));
        SubscriptionId(id)
    }

    /// Remove a previously registered listener.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.listeners.lock().remove(&id.0);
    }

    /// Inject a platform transition event. Listeners are notified only when
    /// the state actually changes.
    pub fn set_online(&self, online: bool) {
        let previous = self.inner.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return;
        }

        tracing::debug!(online, "connectivity transition");

        // Clone the listeners out so callbacks never run under the lock
        let listeners: Vec<Listener> = self.inner.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(online);
        }
    }
}
