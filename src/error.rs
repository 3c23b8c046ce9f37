//! Error types for the beacon cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur around the beacon cache.
///
/// Cache operations themselves never fail; absent keys and empty entries
/// degrade to no-ops. These variants cover configuration, drain sessions,
/// metrics registration and evictor lifecycle.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration values are inconsistent
    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Another drain session is open for the key
    #[error("Drain already in progress for beacon {key}")]
    DrainInProgress { key: i32 },

    /// Prometheus registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
