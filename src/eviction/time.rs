//! Time-Based Eviction
//!
//! Drops records older than the configured maximum age. Runs at most once
//! per maximum age interval.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::EvictionStrategy;
use crate::cache::BeaconCache;
use crate::domain::ports::TimingProvider;

/// Evicts records whose timestamp is older than `now - max_record_age`
pub struct TimeEvictionStrategy {
    /// Maximum record age in milliseconds, non-positive disables the strategy
    max_record_age_ms: i64,
    /// Clock shared with record producers
    timing: Arc<dyn TimingProvider>,
    /// Time of the last run, set on first execution
    last_run: Option<i64>,
    /// Disabled notice already logged
    disabled_logged: bool,
}

impl TimeEvictionStrategy {
    /// Create a new strategy
    pub fn new(max_record_age_ms: i64, timing: Arc<dyn TimingProvider>) -> Self {
        Self {
            max_record_age_ms,
            timing,
            last_run: None,
            disabled_logged: false,
        }
    }

    /// Whether the strategy never evicts
    pub fn is_disabled(&self) -> bool {
        self.max_record_age_ms <= 0
    }

    /// Time of the last run, `None` before the first execution
    pub fn last_run(&self) -> Option<i64> {
        self.last_run
    }

    fn should_run(&self, now: i64, last_run: i64) -> bool {
        now - last_run >= self.max_record_age_ms
    }
}

impl EvictionStrategy for TimeEvictionStrategy {
    fn name(&self) -> &'static str {
        "time"
    }

    fn execute(&mut self, cache: &BeaconCache, shutdown: &CancellationToken) {
        if self.is_disabled() {
            if !self.disabled_logged {
                info!(
                    max_record_age_ms = self.max_record_age_ms,
                    "Time based eviction disabled"
                );
                self.disabled_logged = true;
            }
            return;
        }

        let now = self.timing.now_millis();
        let Some(last_run) = self.last_run else {
            self.last_run = Some(now);
            return;
        };
        if !self.should_run(now, last_run) {
            return;
        }

        let min_timestamp = now - self.max_record_age_ms;
        for key in cache.beacon_ids() {
            if shutdown.is_cancelled() {
                break;
            }
            let evicted = cache.evict_records_by_age(key, min_timestamp);
            if evicted > 0 {
                debug!(
                    beacon = key,
                    evicted, "Time eviction removed records older than {}", min_timestamp
                );
            }
        }

        self.last_run = Some(self.timing.now_millis());
    }
}

// =============================================================================
// Tests
// =============================================================================
