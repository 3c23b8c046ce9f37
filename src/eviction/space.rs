//! Space-Based Eviction
//!
//! Once the cache grows beyond the upper bound, evicts the oldest record of
//! every beacon in round-robin passes until the cache is back at or below
//! the lower bound.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::EvictionStrategy;
use crate::cache::BeaconCache;

/// Evicts records round-robin across beacons while the cache is too large
#[derive(Debug, Clone)]
pub struct SpaceEvictionStrategy {
    /// Stop evicting at or below this many bytes
    lower_bound: i64,
    /// Start evicting above this many bytes
    upper_bound: i64,
    /// Disabled notice already logged
    disabled_logged: bool,
}

impl SpaceEvictionStrategy {
    /// Create a new strategy
    pub fn new(lower_bound: i64, upper_bound: i64) -> Self {
        Self {
            lower_bound,
            upper_bound,
            disabled_logged: false,
        }
    }

    /// Whether the bounds make the strategy a no-op
    pub fn is_disabled(&self) -> bool {
        self.lower_bound <= 0 || self.upper_bound <= 0 || self.upper_bound < self.lower_bound
    }

    fn should_run(&self, cache: &BeaconCache) -> bool {
        cache.num_bytes_in_cache() as i64 > self.upper_bound
    }

    fn above_lower_bound(&self, cache: &BeaconCache) -> bool {
        cache.num_bytes_in_cache() as i64 > self.lower_bound
    }
}

impl EvictionStrategy for SpaceEvictionStrategy {
    fn name(&self) -> &'static str {
        "space"
    }

    fn execute(&mut self, cache: &BeaconCache, shutdown: &CancellationToken) {
        if self.is_disabled() {
            if !self.disabled_logged {
                info!(
                    lower_bound = self.lower_bound,
                    upper_bound = self.upper_bound,
                    "Space based eviction disabled"
                );
                self.disabled_logged = true;
            }
            return;
        }

        if !self.should_run(cache) {
            return;
        }

        let start_bytes = cache.num_bytes_in_cache();
        let mut total_evicted = 0u64;

        while !shutdown.is_cancelled() && self.above_lower_bound(cache) {
            let mut pass_evicted = 0u64;
            for key in cache.beacon_ids() {
                if shutdown.is_cancelled() || !self.above_lower_bound(cache) {
                    break;
                }
                pass_evicted += u64::from(cache.evict_records_by_number(key, 1));
            }

            if pass_evicted == 0 {
                // Everything left is being sent
                warn!(
                    bytes = cache.num_bytes_in_cache(),
                    lower_bound = self.lower_bound,
                    "Space eviction cannot reach lower bound, remaining data is in flight"
                );
                break;
            }
            total_evicted += pass_evicted;
        }

        debug!(
            evicted = total_evicted,
            before = start_bytes,
            after = cache.num_bytes_in_cache(),
            "Space eviction finished"
        );
    }
}

// =============================================================================
// Tests
// =============================================================================
