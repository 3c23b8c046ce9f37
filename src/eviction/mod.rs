//! Beacon Cache Eviction
//!
//! Strategies that keep the cache bounded in age and size, and the
//! background evictor that runs them after data was added.
//!
//! ```text
//!   add_event_data ──▶ observer ──▶ Notify ──▶ evictor task
//!                                                 │
//!                                   ┌─────────────┴─────────────┐
//!                                   ▼                           ▼
//!                         TimeEvictionStrategy        SpaceEvictionStrategy
//!                       evict_records_by_age()      evict_records_by_number()
//! ```
//!
//! The cache itself never evicts on insert; it only exposes the two
//! primitives these strategies call.

mod evictor;
mod space;
mod time;

pub use evictor::BeaconCacheEvictor;
pub use space::SpaceEvictionStrategy;
pub use time::TimeEvictionStrategy;

use tokio_util::sync::CancellationToken;

use crate::cache::BeaconCache;

/// A policy deciding which records to evict.
///
/// Strategies are executed sequentially by the evictor and must check
/// `shutdown` between beacons so that stopping the evictor stays prompt.
pub trait EvictionStrategy: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Evict whatever the policy requires right now
    fn execute(&mut self, cache: &BeaconCache, shutdown: &CancellationToken);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicI64, Ordering};

    use crate::domain::ports::TimingProvider;

    /// Clock advanced by hand
    #[derive(Debug, Default)]
    pub struct ManualClock(AtomicI64);

    impl ManualClock {
        pub fn at(millis: i64) -> Self {
            Self(AtomicI64::new(millis))
        }

        pub fn set(&self, millis: i64) {
            self.0.store(millis, Ordering::SeqCst);
        }
    }

    impl TimingProvider for ManualClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }
}
