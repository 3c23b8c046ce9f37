//! Beacon Cache - In-Process Telemetry Buffer
//!
//! Buffers serialized beacon data (event and action records) produced by many
//! instrumented sessions and hands it in chunks to a single beacon sender.
//!
//! # Architecture
//!
//! ```text
//! Producers (sessions) → BeaconCache → Sender (chunk → commit | reset)
//!                            │
//!                            └─ observer → Evictor (time / space strategies)
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Cache engine, entries, drain sessions, metrics
//! - [`config`] - Eviction limits
//! - [`domain`] - Beacon key, observer and clock ports
//! - [`error`] - Error types
//! - [`eviction`] - Eviction strategies and the background evictor
//!
//! # Example
//!
//! ```
//! use beacon_cache::BeaconCache;
//!
//! let cache = BeaconCache::new();
//! cache.add_event_data(1, 100, "e1");
//! cache.add_event_data(1, 200, "e2");
//!
//! assert_eq!(cache.get_next_beacon_chunk(1, "pfx", 1000, "&"), "pfxe1&e2");
//! cache.remove_chunked_data(1);
//! assert!(cache.is_empty(1));
//! ```

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod eviction;

// Re-export commonly used types
pub use cache::{BeaconCache, DrainSession, EntryStats, PrometheusExporter};
pub use config::BeaconCacheConfig;
pub use domain::{BeaconCacheObserver, BeaconKey, ObserverId, SystemTimingProvider, TimingProvider};
pub use error::{Error, Result};
pub use eviction::{BeaconCacheEvictor, EvictionStrategy, SpaceEvictionStrategy, TimeEvictionStrategy};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
