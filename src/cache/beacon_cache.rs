//! Beacon Cache - Concurrent Buffer for Beacon Data
//!
//! Accumulates serialized event and action records for many beacons and
//! hands them to the sending thread in chunks.
//!
//! # Design
//!
//! - One `Mutex` per beacon entry, entries stored in a `DashMap`, so
//!   producers of different beacons do not serialize on each other
//! - Global byte total in an atomic, updated while the entry lock is held
//! - Observers notified after the entry lock is released
//! - Deleted entries are detached under their lock; an inserter that loses
//!   the race re-resolves the key and inserts into a fresh entry

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::drain::DrainSession;
use super::entry::BeaconCacheEntry;
use super::metrics::BeaconCacheMetrics;
use super::observer::ObserverRegistry;
use super::record::{BeaconCacheRecord, RecordKind};
use crate::domain::ports::{BeaconCacheObserver, BeaconKey, ObserverId};
use crate::error::{Error, Result};

type SharedEntry = Arc<Mutex<BeaconCacheEntry>>;

/// Point-in-time view of one beacon's entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryStats {
    /// Records waiting for the next drain cycle
    pub unsent_records: usize,
    /// Records in the sending copy (in flight or queued for the open cycle)
    pub sending_records: usize,
    /// Records emitted in a chunk and not yet committed or reset
    pub in_flight_records: usize,
    /// Bytes held by the entry
    pub bytes: u64,
}

/// Process-wide beacon cache
pub struct BeaconCache {
    /// Per-beacon entries
    beacons: DashMap<BeaconKey, SharedEntry>,
    /// Sum of payload sizes over all live records
    num_bytes: AtomicU64,
    /// Observers notified on insertion
    observers: ObserverRegistry,
    /// Keys with an open drain session
    draining: DashSet<BeaconKey>,
    /// Metrics collector
    metrics: BeaconCacheMetrics,
}

impl Default for BeaconCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            beacons: DashMap::new(),
            num_bytes: AtomicU64::new(0),
            observers: ObserverRegistry::new(),
            draining: DashSet::new(),
            metrics: BeaconCacheMetrics::new(),
        }
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Register an observer notified after every insertion
    pub fn add_observer(&self, observer: Arc<dyn BeaconCacheObserver>) -> ObserverId {
        self.observers.add(observer)
    }

    /// Deregister an observer. Returns false if the handle is unknown.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    // =========================================================================
    // Insertion and inspection
    // =========================================================================

    /// Add serialized event data for a beacon
    pub fn add_event_data(&self, key: BeaconKey, timestamp: i64, data: impl Into<String>) {
        let size = self.add_record(key, RecordKind::Event, BeaconCacheRecord::new(timestamp, data));
        self.metrics.record_event_added(size);
        self.observers.notify_all();
    }

    /// Add serialized action data for a beacon
    pub fn add_action_data(&self, key: BeaconKey, timestamp: i64, data: impl Into<String>) {
        let size = self.add_record(key, RecordKind::Action, BeaconCacheRecord::new(timestamp, data));
        self.metrics.record_action_added(size);
        self.observers.notify_all();
    }

    fn add_record(&self, key: BeaconKey, kind: RecordKind, record: BeaconCacheRecord) -> u64 {
        loop {
            let entry = self.entry_or_insert(key);
            let mut guard = entry.lock();
            if guard.is_detached() {
                // Deleted after lookup, retry against a fresh entry
                continue;
            }
            let size = guard.add(kind, record);
            self.num_bytes.fetch_add(size, Ordering::Relaxed);
            trace!(beacon = key, kind = %kind, size, "Cached record");
            break size;
        }
    }

    /// Delete a beacon and all of its data, including data being sent
    pub fn delete_cache_entry(&self, key: BeaconKey) {
        let Some((_, entry)) = self.beacons.remove(&key) else {
            return;
        };

        let mut guard = entry.lock();
        guard.detach();
        let bytes = guard.total_bytes();
        self.num_bytes.fetch_sub(bytes, Ordering::Relaxed);
        self.metrics.record_entry_deleted();
        debug!(beacon = key, bytes, "Deleted cache entry");
    }

    /// Snapshot of all beacon ids currently in the cache
    pub fn beacon_ids(&self) -> HashSet<BeaconKey> {
        self.beacons.iter().map(|e| *e.key()).collect()
    }

    /// Bytes currently held by all records
    pub fn num_bytes_in_cache(&self) -> u64 {
        self.num_bytes.load(Ordering::Relaxed)
    }

    /// True if the beacon has no entry or its entry holds no data
    pub fn is_empty(&self, key: BeaconKey) -> bool {
        self.with_entry(key, |entry| entry.is_empty()).unwrap_or(true)
    }

    /// Number of beacons in the cache
    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    /// Check if the cache holds no beacons
    pub fn is_cache_empty(&self) -> bool {
        self.beacons.is_empty()
    }

    /// Point-in-time statistics for one beacon
    pub fn entry_stats(&self, key: BeaconKey) -> Option<EntryStats> {
        self.with_entry(key, |entry| EntryStats {
            unsent_records: entry.unsent_len(),
            sending_records: entry.sending_len(),
            in_flight_records: entry.in_flight_len(),
            bytes: entry.total_bytes(),
        })
    }

    /// Metrics collector
    pub fn metrics(&self) -> &BeaconCacheMetrics {
        &self.metrics
    }

    // =========================================================================
    // Chunked draining
    // =========================================================================

    /// Get the next chunk of data to send for a beacon.
    ///
    /// The first call of a drain cycle moves all un-sent records into the
    /// sending copy; later calls continue from where the previous chunk
    /// stopped. Returns an empty string if the beacon does not exist or has
    /// nothing left to send.
    ///
    /// Must only be called by the single sending thread, or through a
    /// [`DrainSession`].
    pub fn get_next_beacon_chunk(
        &self,
        key: BeaconKey,
        prefix: &str,
        max_size: usize,
        delimiter: &str,
    ) -> String {
        let chunk = self
            .with_entry(key, |entry| entry.next_chunk(prefix, max_size, delimiter))
            .unwrap_or_default();

        if !chunk.is_empty() {
            self.metrics.record_chunk();
            trace!(beacon = key, len = chunk.len(), "Built chunk");
        }
        chunk
    }

    /// Discard all data included in chunks after a successful send
    pub fn remove_chunked_data(&self, key: BeaconKey) {
        let released = self
            .with_entry(key, |entry| {
                let released = entry.remove_chunked();
                self.num_bytes.fetch_sub(released.bytes, Ordering::Relaxed);
                released
            })
            .unwrap_or_default();

        if released.records > 0 {
            self.metrics.record_committed(released.records);
            debug!(
                beacon = key,
                records = released.records,
                bytes = released.bytes,
                "Removed sent data"
            );
        }
    }

    /// Return chunked data to the un-sent queues after a failed send
    pub fn reset_chunked_data(&self, key: BeaconKey) {
        let moved = self
            .with_entry(key, |entry| entry.reset_chunked())
            .unwrap_or_default();

        if moved > 0 {
            self.metrics.record_reset(moved);
            debug!(beacon = key, records = moved, "Reset chunked data");
        }
    }

    /// Open an exclusive drain session for a beacon.
    ///
    /// Fails with [`Error::DrainInProgress`] while another session for the
    /// same beacon is alive.
    pub fn begin_drain(&self, key: BeaconKey) -> Result<DrainSession<'_>> {
        if !self.draining.insert(key) {
            return Err(Error::DrainInProgress { key });
        }
        Ok(DrainSession::new(self, key))
    }

    pub(crate) fn end_drain(&self, key: BeaconKey) {
        self.draining.remove(&key);
    }

    // =========================================================================
    // Eviction
    // =========================================================================

    /// Evict un-sent records with a timestamp before `min_timestamp`.
    ///
    /// Scanning stops at the first record that is young enough. Records
    /// being sent are never evicted. Returns the number of evicted records.
    pub fn evict_records_by_age(&self, key: BeaconKey, min_timestamp: i64) -> u32 {
        let released = self
            .with_entry(key, |entry| {
                let released = entry.evict_by_age(min_timestamp);
                self.num_bytes.fetch_sub(released.bytes, Ordering::Relaxed);
                released
            })
            .unwrap_or_default();

        if released.records > 0 {
            self.metrics.record_evicted_by_age(released.records);
            debug!(
                beacon = key,
                records = released.records,
                min_timestamp,
                "Evicted records by age"
            );
        }
        released.records
    }

    /// Evict up to `num_records` of the oldest un-sent records.
    ///
    /// Records being sent are never evicted. Returns the number of evicted
    /// records.
    pub fn evict_records_by_number(&self, key: BeaconKey, num_records: u32) -> u32 {
        let released = self
            .with_entry(key, |entry| {
                let released = entry.evict_by_number(num_records);
                self.num_bytes.fetch_sub(released.bytes, Ordering::Relaxed);
                released
            })
            .unwrap_or_default();

        if released.records > 0 {
            self.metrics.record_evicted_by_number(released.records);
            debug!(
                beacon = key,
                records = released.records,
                "Evicted records by number"
            );
        }
        released.records
    }

    // =========================================================================
    // Entry access
    // =========================================================================

    fn entry_or_insert(&self, key: BeaconKey) -> SharedEntry {
        Arc::clone(
            self.beacons
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(BeaconCacheEntry::new())))
                .value(),
        )
    }

    /// Run `f` on the live entry of `key` under its lock
    fn with_entry<R>(&self, key: BeaconKey, f: impl FnOnce(&mut BeaconCacheEntry) -> R) -> Option<R> {
        let entry = self.beacons.get(&key).map(|e| Arc::clone(e.value()))?;
        let mut guard = entry.lock();
        if guard.is_detached() {
            return None;
        }
        Some(f(&mut guard))
    }
}

impl std::fmt::Debug for BeaconCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeaconCache")
            .field("beacons", &self.beacons.len())
            .field("num_bytes", &self.num_bytes_in_cache())
            .field("observers", &self.observers)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_add_event_and_action_data() {
        let cache = BeaconCache::new();
        cache.add_event_data(1, 1000, "a");
        cache.add_action_data(1, 1001, "bc");
        cache.add_event_data(2, 1002, "def");

        assert_eq!(cache.num_bytes_in_cache(), 6);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.beacon_ids(), HashSet::from([1, 2]));
        assert!(!cache.is_empty(1));

        let stats = cache.entry_stats(1).unwrap();
        assert_eq!(stats.unsent_records, 2);
        assert_eq!(stats.bytes, 3);
    }

    #[test]
    fn test_full_drain_cycle() {
        let cache = BeaconCache::new();
        cache.add_event_data(1, 100, "e1");
        cache.add_event_data(1, 200, "e2");

        assert_eq!(cache.get_next_beacon_chunk(1, "pfx", 1000, "&"), "pfxe1&e2");
        cache.remove_chunked_data(1);

        assert!(cache.is_empty(1));
        assert_eq!(cache.num_bytes_in_cache(), 0);
    }

    #[test]
    fn test_reset_then_resend() {
        let cache = BeaconCache::new();
        cache.add_event_data(2, 50, "a");

        assert_eq!(cache.get_next_beacon_chunk(2, "", 1000, ","), "a");
        cache.reset_chunked_data(2);

        assert_eq!(cache.evict_records_by_age(2, 0), 0);
        assert_eq!(cache.get_next_beacon_chunk(2, "", 1000, ","), "a");
        assert_eq!(cache.num_bytes_in_cache(), 1);
    }

    #[test]
    fn test_operations_on_unknown_key() {
        let cache = BeaconCache::new();

        for _ in 0..2 {
            cache.delete_cache_entry(42);
            assert_eq!(cache.evict_records_by_age(42, i64::MAX), 0);
            assert_eq!(cache.evict_records_by_number(42, 10), 0);
            assert_eq!(cache.get_next_beacon_chunk(42, "pfx", 100, "&"), "");
            cache.remove_chunked_data(42);
            cache.reset_chunked_data(42);
            assert!(cache.is_empty(42));
            assert!(cache.entry_stats(42).is_none());
        }
        assert_eq!(cache.num_bytes_in_cache(), 0);
        assert!(cache.is_cache_empty());
    }

    #[test]
    fn test_delete_subtracts_sending_copy() {
        let cache = BeaconCache::new();
        cache.add_event_data(1, 1, "aaaa");
        cache.add_event_data(1, 2, "bbbb");
        cache.get_next_beacon_chunk(1, "", 5, "&");
        cache.add_event_data(1, 3, "cc");
        cache.add_event_data(2, 3, "zz");

        cache.delete_cache_entry(1);

        assert_eq!(cache.num_bytes_in_cache(), 2);
        assert_eq!(cache.beacon_ids(), HashSet::from([2]));
        assert_eq!(cache.metrics().snapshot().entries_deleted, 1);
    }

    #[test]
    fn test_commit_after_delete_is_noop() {
        let cache = BeaconCache::new();
        cache.add_event_data(1, 1, "abc");
        cache.get_next_beacon_chunk(1, "", 100, "&");
        cache.delete_cache_entry(1);

        cache.remove_chunked_data(1);
        assert_eq!(cache.num_bytes_in_cache(), 0);
    }

    #[test]
    fn test_insert_after_delete_creates_new_entry() {
        let cache = BeaconCache::new();
        cache.add_event_data(1, 1, "old");
        cache.delete_cache_entry(1);
        cache.add_event_data(1, 2, "new");

        assert_eq!(cache.get_next_beacon_chunk(1, "", 100, "&"), "new");
        assert_eq!(cache.num_bytes_in_cache(), 3);
    }

    #[test]
    fn test_observer_called_once_per_insert() {
        let cache = BeaconCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        cache.add_observer(Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));

        cache.add_event_data(1, 1, "a");
        cache.add_action_data(1, 2, "b");
        cache.get_next_beacon_chunk(1, "", 100, "&");
        cache.remove_chunked_data(1);
        cache.evict_records_by_number(1, 1);
        cache.delete_cache_entry(1);

        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_observer_can_reenter_cache() {
        let cache = Arc::new(BeaconCache::new());
        let weak = Arc::downgrade(&cache);
        cache.add_observer(Arc::new(move || {
            if let Some(cache) = weak.upgrade() {
                assert!(cache.num_bytes_in_cache() > 0);
                cache.evict_records_by_number(7, 1);
            }
        }));

        cache.add_event_data(7, 1, "x");
        assert!(cache.is_empty(7));
        assert_eq!(cache.num_bytes_in_cache(), 0);
    }

    #[test]
    fn test_remove_observer_stops_notifications() {
        let cache = BeaconCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = cache.add_observer(Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
        assert_eq!(cache.observer_count(), 1);

        cache.add_event_data(1, 1, "a");
        assert!(cache.remove_observer(id));
        cache.add_event_data(1, 2, "b");

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(cache.observer_count(), 0);
    }

    #[test]
    fn test_eviction_updates_bytes_and_metrics() {
        let cache = BeaconCache::new();
        cache.add_event_data(1, 10, "aa");
        cache.add_event_data(1, 20, "bb");
        cache.add_action_data(1, 30, "cc");

        assert_eq!(cache.evict_records_by_age(1, 15), 1);
        assert_eq!(cache.num_bytes_in_cache(), 4);
        assert_eq!(cache.evict_records_by_number(1, 5), 2);
        assert_eq!(cache.num_bytes_in_cache(), 0);

        let snapshot = cache.metrics().snapshot();
        assert_eq!(snapshot.evicted_by_age, 1);
        assert_eq!(snapshot.evicted_by_number, 2);
    }

    #[test]
    fn test_begin_drain_is_exclusive() {
        let cache = BeaconCache::new();
        cache.add_event_data(1, 1, "a");

        let session = cache.begin_drain(1).unwrap();
        assert!(matches!(
            cache.begin_drain(1),
            Err(Error::DrainInProgress { key: 1 })
        ));
        // Other keys are independent
        assert!(cache.begin_drain(2).is_ok());

        session.commit();
        assert!(cache.begin_drain(1).is_ok());
    }
}
