//! Lifecycle event fan-out.
//!
//! The observer list is the one structure touched from outside the manager
//! actor, so it uses copy-on-write semantics: mutation replaces the backing
//! vector under a brief lock, delivery iterates a snapshot taken outside it.
//! Observers may add or remove subscriptions from inside a callback; the
//! change takes effect on subsequent events, never the one being delivered.

use std::sync::{Arc, Mutex};

/// Lifecycle events emitted by the peer manager. All methods default to
/// no-ops so observers implement only what they care about.
pub trait PeerObserver: Send + Sync {
    /// The node lost its last connection and considers itself offline.
    fn on_all_connections_lost(&self) {}

    /// The first connection after a full loss; the node is back online.
    fn on_new_connection_after_all_connections_lost(&self) {}

    /// The host returned from standby (a large tick gap was observed).
    fn on_awake_from_standby(&self) {}
}

/// Copy-on-write observer list. Delivery is in registration order.
pub struct ObserverSet {
    inner: Mutex<Arc<Vec<Arc<dyn PeerObserver>>>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Arc::new(Vec::new())) }
    }

    pub fn add(&self, observer: Arc<dyn PeerObserver>) {
        let mut guard = self.inner.lock().expect("observer lock poisoned");
        let mut next = guard.as_ref().clone();
        next.push(observer);
        *guard = Arc::new(next);
    }

    /// Remove a previously added observer, matched by pointer identity.
    /// Returns whether it was present.
    pub fn remove(&self, observer: &Arc<dyn PeerObserver>) -> bool {
        let mut guard = self.inner.lock().expect("observer lock poisoned");
        let before = guard.len();
        let next: Vec<_> = guard
            .iter()
            .filter(|o| !Arc::ptr_eq(o, observer))
            .cloned()
            .collect();
        let removed = next.len() != before;
        *guard = Arc::new(next);
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("observer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<Vec<Arc<dyn PeerObserver>>> {
        self.inner.lock().expect("observer lock poisoned").clone()
    }

    pub fn notify_all_connections_lost(&self) {
        for observer in self.snapshot().iter() {
            observer.on_all_connections_lost();
        }
    }

    pub fn notify_new_connection_after_all_connections_lost(&self) {
        for observer in self.snapshot().iter() {
            observer.on_new_connection_after_all_connections_lost();
        }
    }

    pub fn notify_awake_from_standby(&self) {
        for observer in self.snapshot().iter() {
            observer.on_awake_from_standby();
        }
    }
}

impl Default for ObserverSet {
    fn default() -> Self {
        Self::new()
    }
}
