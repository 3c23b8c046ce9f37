//! Beacon Cache Configuration
//!
//! Limits used by the eviction strategies. Loaded from YAML or built in code.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default maximum record age (1h 45min)
pub const DEFAULT_MAX_RECORD_AGE: Duration = Duration::from_secs(105 * 60);

/// Default lower memory bound (80 MiB)
pub const DEFAULT_LOWER_MEMORY_BOUNDARY: i64 = 80 * 1024 * 1024;

/// Default upper memory bound (100 MiB)
pub const DEFAULT_UPPER_MEMORY_BOUNDARY: i64 = 100 * 1024 * 1024;

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BeaconCacheConfig {
    /// Records older than this are evicted. Non-positive disables time
    /// based eviction.
    pub max_record_age_ms: i64,
    /// Space eviction stops once the cache is at or below this size
    pub cache_size_lower_bound: i64,
    /// Space eviction starts once the cache grows beyond this size
    pub cache_size_upper_bound: i64,
}

impl Default for BeaconCacheConfig {
    fn default() -> Self {
        Self {
            max_record_age_ms: DEFAULT_MAX_RECORD_AGE.as_millis() as i64,
            cache_size_lower_bound: DEFAULT_LOWER_MEMORY_BOUNDARY,
            cache_size_upper_bound: DEFAULT_UPPER_MEMORY_BOUNDARY,
        }
    }
}

impl BeaconCacheConfig {
    /// Create a configuration from explicit limits
    pub fn new(max_record_age: Duration, lower_bound: i64, upper_bound: i64) -> Self {
        Self {
            max_record_age_ms: max_record_age.as_millis() as i64,
            cache_size_lower_bound: lower_bound,
            cache_size_upper_bound: upper_bound,
        }
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Reject limits the space strategy cannot work with.
    ///
    /// Disabled strategies (non-positive values) are accepted.
    pub fn validate(&self) -> Result<()> {
        if self.is_space_eviction_enabled()
            && self.cache_size_upper_bound < self.cache_size_lower_bound
        {
            return Err(Error::InvalidConfig {
                field: "cache_size_upper_bound".to_string(),
                reason: format!(
                    "upper bound {} is below lower bound {}",
                    self.cache_size_upper_bound, self.cache_size_lower_bound
                ),
            });
        }
        Ok(())
    }

    /// Maximum record age as a duration, `None` if time eviction is disabled
    pub fn max_record_age(&self) -> Option<Duration> {
        (self.max_record_age_ms > 0).then(|| Duration::from_millis(self.max_record_age_ms as u64))
    }

    /// Whether both memory bounds are set
    pub fn is_space_eviction_enabled(&self) -> bool {
        self.cache_size_lower_bound > 0 && self.cache_size_upper_bound > 0
    }
}

// =============================================================================
// Tests
// =============================================================================
