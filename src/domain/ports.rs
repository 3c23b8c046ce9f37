//! Domain Ports
//!
//! Trait abstractions the cache calls outward through. Callers implement
//! these to plug in their own notification targets and clocks.
//!
//! ```text
//! ┌──────────────────────────┐        ┌───────────────────────────┐
//! │       BeaconCache        │──────▶ │   BeaconCacheObserver     │
//! │  (insert → notify)       │        │   (evictor, sender, ...)  │
//! └──────────────────────────┘        └───────────────────────────┘
//!              ▲
//!              │ now_millis()
//! ┌──────────────────────────┐
//! │      TimingProvider      │
//! └──────────────────────────┘
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

// =============================================================================
// Value Objects
// =============================================================================

/// Beacon (session) identifier used to partition the cache.
///
/// Keys are assigned externally and never validated by the cache.
pub type BeaconKey = i32;

/// Handle returned when registering an observer, used to deregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub(crate) u64);

impl ObserverId {
    /// Raw numeric value of the handle.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

// =============================================================================
// Observer Port
// =============================================================================

/// Receives a signal after every successful insertion into the cache.
///
/// The signal carries no payload. It runs synchronously on the producer's
/// thread with no cache lock held, so implementations must return quickly.
/// Calling back into the cache from here is allowed.
pub trait BeaconCacheObserver: Send + Sync {
    /// Called once per inserted event or action record.
    fn on_data_added(&self);
}

impl<F> BeaconCacheObserver for F
where
    F: Fn() + Send + Sync,
{
    fn on_data_added(&self) {
        self()
    }
}

// =============================================================================
// Timing Port
// =============================================================================

/// Source of the current time in milliseconds.
///
/// Record timestamps and eviction thresholds share this clock.
pub trait TimingProvider: Send + Sync {
    /// Current time in milliseconds.
    fn now_millis(&self) -> i64;
}

/// Wall clock based on [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimingProvider;

impl TimingProvider for SystemTimingProvider {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

// =============================================================================
// Tests
// =============================================================================
