//! Cache Record
//!
//! Smallest unit of cached beacon data: a timestamp and a serialized payload.

/// Kind of data a record carries.
///
/// Events are always chunked before actions of the same beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Event data (session start/end, reported values, errors, ...)
    Event,
    /// Action data
    Action,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Event => write!(f, "event"),
            RecordKind::Action => write!(f, "action"),
        }
    }
}

/// A single timestamped payload.
///
/// Timestamp and payload are fixed at creation; whether the record is being
/// sent is decided by where its entry keeps it, not by the record itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconCacheRecord {
    timestamp: i64,
    data: String,
}

impl BeaconCacheRecord {
    /// Create a new record
    pub fn new(timestamp: i64, data: impl Into<String>) -> Self {
        Self {
            timestamp,
            data: data.into(),
        }
    }

    /// Producer timestamp in milliseconds
    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Serialized payload
    #[inline]
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Payload size in bytes (UTF-8 encoded length)
    #[inline]
    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

// =============================================================================
// Tests
// =============================================================================
