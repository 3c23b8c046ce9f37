//! Beacon Cache
//!
//! In-process buffer between instrumented sessions (producers) and the
//! beacon sender (single consumer).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                            BeaconCache                                   │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  DashMap<BeaconKey, Mutex<Entry>>          AtomicU64 byte total          │
//! │  ┌────────────────────────────────────┐    ObserverRegistry              │
//! │  │ Entry                              │                                  │
//! │  │  events  [e1 e2 e3]  (un-sent)     │                                  │
//! │  │  actions [a1 a2]     (un-sent)     │                                  │
//! │  │  sending copy: in flight | pending │                                  │
//! │  └────────────────────────────────────┘                                  │
//! └──────────────────────────────────────────────────────────────────────────┘
//!      ▲ add_event_data / add_action_data          │ get_next_beacon_chunk
//!      │ (many producer threads)                   ▼ remove / reset (sender)
//! ```
//!
//! # Chunk format
//!
//! `prefix + payload_1 + delimiter + payload_2 + ... + payload_n`. Payloads
//! are never split; at least one is emitted when data is available.

mod beacon_cache;
mod drain;
mod entry;
mod metrics;
mod observer;
mod record;

#[cfg(test)]
mod proptest;

pub use beacon_cache::{BeaconCache, EntryStats};
pub use drain::DrainSession;
pub use metrics::{BeaconCacheMetrics, MetricsSnapshot, PrometheusExporter};
pub use observer::ObserverRegistry;
pub use record::{BeaconCacheRecord, RecordKind};
