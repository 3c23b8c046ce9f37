//! Cache Metrics Collection
//!
//! Lock-free counters for the cache and their Prometheus exposition.

use std::sync::atomic::{AtomicU64, Ordering};

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::error::Result;

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct BeaconCacheMetrics {
    // Insertion
    events_added: AtomicU64,
    actions_added: AtomicU64,
    bytes_added: AtomicU64,

    // Eviction
    evicted_by_age: AtomicU64,
    evicted_by_number: AtomicU64,

    // Drain protocol
    chunks_built: AtomicU64,
    records_committed: AtomicU64,
    records_reset: AtomicU64,

    // Explicit deletion
    entries_deleted: AtomicU64,
}

impl BeaconCacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event_added(&self, bytes: u64) {
        self.events_added.fetch_add(1, Ordering::Relaxed);
        self.bytes_added.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_action_added(&self, bytes: u64) {
        self.actions_added.fetch_add(1, Ordering::Relaxed);
        self.bytes_added.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_evicted_by_age(&self, records: u32) {
        self.evicted_by_age
            .fetch_add(u64::from(records), Ordering::Relaxed);
    }

    pub fn record_evicted_by_number(&self, records: u32) {
        self.evicted_by_number
            .fetch_add(u64::from(records), Ordering::Relaxed);
    }

    pub fn record_chunk(&self) {
        self.chunks_built.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_committed(&self, records: u32) {
        self.records_committed
            .fetch_add(u64::from(records), Ordering::Relaxed);
    }

    pub fn record_reset(&self, records: u32) {
        self.records_reset
            .fetch_add(u64::from(records), Ordering::Relaxed);
    }

    pub fn record_entry_deleted(&self) {
        self.entries_deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_added: self.events_added.load(Ordering::Relaxed),
            actions_added: self.actions_added.load(Ordering::Relaxed),
            bytes_added: self.bytes_added.load(Ordering::Relaxed),
            evicted_by_age: self.evicted_by_age.load(Ordering::Relaxed),
            evicted_by_number: self.evicted_by_number.load(Ordering::Relaxed),
            chunks_built: self.chunks_built.load(Ordering::Relaxed),
            records_committed: self.records_committed.load(Ordering::Relaxed),
            records_reset: self.records_reset.load(Ordering::Relaxed),
            entries_deleted: self.entries_deleted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of all cache metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_added: u64,
    pub actions_added: u64,
    pub bytes_added: u64,
    pub evicted_by_age: u64,
    pub evicted_by_number: u64,
    pub chunks_built: u64,
    pub records_committed: u64,
    pub records_reset: u64,
    pub entries_deleted: u64,
}

impl MetricsSnapshot {
    /// Total records inserted
    pub fn records_added(&self) -> u64 {
        self.events_added + self.actions_added
    }

    /// Total records evicted by either primitive
    pub fn records_evicted(&self) -> u64 {
        self.evicted_by_age + self.evicted_by_number
    }
}

// =============================================================================
// Prometheus Exposition
// =============================================================================

/// Mirrors cache metrics into a Prometheus registry.
///
/// Counters only ever move forward, so `update` adds the difference between
/// the snapshot and what was already exported.
#[derive(Clone)]
pub struct PrometheusExporter {
    bytes: IntGauge,
    entries: IntGauge,
    records_added: IntCounter,
    records_evicted: IntCounterVec,
    chunks: IntCounter,
    commits: IntCounter,
    resets: IntCounter,
}

impl PrometheusExporter {
    /// Create the metric families and register them with `registry`
    pub fn register(registry: &Registry) -> Result<Self> {
        let exporter = Self {
            bytes: IntGauge::new("beacon_cache_bytes", "Bytes currently held in the beacon cache")?,
            entries: IntGauge::new("beacon_cache_entries", "Number of beacons held in the cache")?,
            records_added: IntCounter::new(
                "beacon_cache_records_added_total",
                "Total number of records inserted",
            )?,
            records_evicted: IntCounterVec::new(
                Opts::new(
                    "beacon_cache_records_evicted_total",
                    "Total number of records evicted",
                ),
                &["reason"],
            )?,
            chunks: IntCounter::new("beacon_cache_chunks_total", "Total number of chunks built")?,
            commits: IntCounter::new(
                "beacon_cache_commits_total",
                "Total number of records committed after a successful send",
            )?,
            resets: IntCounter::new(
                "beacon_cache_resets_total",
                "Total number of records returned after a failed send",
            )?,
        };

        registry.register(Box::new(exporter.bytes.clone()))?;
        registry.register(Box::new(exporter.entries.clone()))?;
        registry.register(Box::new(exporter.records_added.clone()))?;
        registry.register(Box::new(exporter.records_evicted.clone()))?;
        registry.register(Box::new(exporter.chunks.clone()))?;
        registry.register(Box::new(exporter.commits.clone()))?;
        registry.register(Box::new(exporter.resets.clone()))?;

        Ok(exporter)
    }

    /// Publish the current cache state
    pub fn update(&self, snapshot: &MetricsSnapshot, bytes: u64, entries: usize) {
        self.bytes.set(bytes as i64);
        self.entries.set(entries as i64);

        advance(&self.records_added, snapshot.records_added());
        advance(
            &self.records_evicted.with_label_values(&["age"]),
            snapshot.evicted_by_age,
        );
        advance(
            &self.records_evicted.with_label_values(&["number"]),
            snapshot.evicted_by_number,
        );
        advance(&self.chunks, snapshot.chunks_built);
        advance(&self.commits, snapshot.records_committed);
        advance(&self.resets, snapshot.records_reset);
    }
}

fn advance(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}

// =============================================================================
// Tests
// =============================================================================
