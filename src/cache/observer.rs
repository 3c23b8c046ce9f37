//! Observer Registry
//!
//! Holds the observers notified after each insertion. The registry has its
//! own lock; the observer list is cloned under it and callbacks run after
//! the lock is released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::ports::{BeaconCacheObserver, ObserverId};

/// Registered observers
#[derive(Default)]
pub struct ObserverRegistry {
    observers: RwLock<Vec<(ObserverId, Arc<dyn BeaconCacheObserver>)>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer and return its handle
    pub fn add(&self, observer: Arc<dyn BeaconCacheObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Deregister an observer. Returns false if the handle is unknown.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut guard = self.observers.write();
        let before = guard.len();
        guard.retain(|(observer_id, _)| *observer_id != id);
        guard.len() != before
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Check if no observer is registered
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Notify every registered observer once
    pub fn notify_all(&self) {
        let snapshot: Vec<Arc<dyn BeaconCacheObserver>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in snapshot {
            observer.on_data_added();
        }
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observer_count", &self.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
