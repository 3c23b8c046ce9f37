//! Drain Sessions
//!
//! Exclusive handle over one beacon's get → (commit | reset) cycle. Only one
//! session per beacon can be open at a time; dropping a session that was
//! neither committed nor reset resets it, so data is never left stuck in the
//! sending copy.

use tracing::warn;

use super::beacon_cache::BeaconCache;
use crate::domain::ports::BeaconKey;

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Open,
    Committed,
    Reset,
}

/// Open drain cycle for a single beacon
#[must_use = "dropping a drain session resets its chunked data"]
pub struct DrainSession<'a> {
    cache: &'a BeaconCache,
    key: BeaconKey,
    chunks: usize,
    outcome: Outcome,
}

impl<'a> DrainSession<'a> {
    pub(crate) fn new(cache: &'a BeaconCache, key: BeaconKey) -> Self {
        Self {
            cache,
            key,
            chunks: 0,
            outcome: Outcome::Open,
        }
    }

    /// Beacon this session drains
    pub fn key(&self) -> BeaconKey {
        self.key
    }

    /// Number of non-empty chunks handed out so far
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Next chunk of the open cycle, or an empty string when exhausted
    pub fn next_chunk(&mut self, prefix: &str, max_size: usize, delimiter: &str) -> String {
        let chunk = self
            .cache
            .get_next_beacon_chunk(self.key, prefix, max_size, delimiter);
        if !chunk.is_empty() {
            self.chunks += 1;
        }
        chunk
    }

    /// The chunks were delivered: discard their records
    pub fn commit(mut self) {
        self.cache.remove_chunked_data(self.key);
        self.outcome = Outcome::Committed;
    }

    /// Delivery failed: return the records to the front of the un-sent data
    pub fn reset(mut self) {
        self.cache.reset_chunked_data(self.key);
        self.outcome = Outcome::Reset;
    }
}

impl Drop for DrainSession<'_> {
    fn drop(&mut self) {
        if self.outcome == Outcome::Open {
            if self.chunks > 0 {
                warn!(
                    beacon = self.key,
                    chunks = self.chunks,
                    "Drain session dropped without commit, resetting chunked data"
                );
            }
            self.cache.reset_chunked_data(self.key);
        }
        self.cache.end_drain(self.key);
    }
}

impl std::fmt::Debug for DrainSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainSession")
            .field("key", &self.key)
            .field("chunks", &self.chunks)
            .field("outcome", &self.outcome)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
