//! Per-Beacon Cache Entry
//!
//! Holds every record of one beacon and drives the send state machine:
//!
//! ```text
//!            snapshot                     commit (all emitted)
//!   Unsent ───────────────▶ Sending ─────────────────────────▶ Unsent
//!     ▲                      │   │
//!     │        reset         │   │ commit (some never emitted)
//!     └──────────────────────┘   └──────────▶ Sending (remaining)
//! ```
//!
//! A record lives in exactly one place: one of the un-sent queues, or the
//! sending copy. The sending copy is split into records already emitted in
//! a chunk (in flight) and records snapshotted but not yet emitted.

use std::collections::VecDeque;

use super::record::{BeaconCacheRecord, RecordKind};

/// Records moved out of the un-sent queues for one drain cycle.
#[derive(Debug, Default)]
struct SendingCopy {
    /// Emitted in a chunk, waiting for commit or reset
    in_flight: Vec<(RecordKind, BeaconCacheRecord)>,
    /// Snapshotted but not emitted yet, in send order
    pending: VecDeque<(RecordKind, BeaconCacheRecord)>,
    /// Total bytes of `in_flight`
    in_flight_bytes: u64,
}

impl SendingCopy {
    fn len(&self) -> usize {
        self.in_flight.len() + self.pending.len()
    }
}

/// Send state of an entry
#[derive(Debug, Default)]
enum SendState {
    /// No drain cycle open
    #[default]
    Unsent,
    /// A snapshot was taken and not yet fully committed or reset
    Sending(SendingCopy),
}

/// Outcome of a mutation that released records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Released {
    /// Number of records released
    pub records: u32,
    /// Bytes released
    pub bytes: u64,
}

impl Released {
    fn add(&mut self, record: &BeaconCacheRecord) {
        self.records += 1;
        self.bytes += record.size_bytes();
    }
}

/// All cached data of one beacon
#[derive(Debug, Default)]
pub(crate) struct BeaconCacheEntry {
    /// Un-sent event records in insertion order
    event_data: VecDeque<BeaconCacheRecord>,
    /// Un-sent action records in insertion order
    action_data: VecDeque<BeaconCacheRecord>,
    /// Send state machine
    state: SendState,
    /// Bytes held by this entry (un-sent and sending copy)
    total_bytes: u64,
    /// Set once the entry was removed from the cache map
    detached: bool,
}

impl BeaconCacheEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the un-sent queue of `kind` and return its size.
    pub fn add(&mut self, kind: RecordKind, record: BeaconCacheRecord) -> u64 {
        let size = record.size_bytes();
        match kind {
            RecordKind::Event => self.event_data.push_back(record),
            RecordKind::Action => self.action_data.push_back(record),
        }
        self.total_bytes += size;
        size
    }

    /// True if neither un-sent nor sending data exists
    pub fn is_empty(&self) -> bool {
        self.event_data.is_empty() && self.action_data.is_empty() && self.sending_len() == 0
    }

    /// Bytes held by this entry
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Number of un-sent records (events and actions)
    pub fn unsent_len(&self) -> usize {
        self.event_data.len() + self.action_data.len()
    }

    /// Number of records in the sending copy
    pub fn sending_len(&self) -> usize {
        match &self.state {
            SendState::Unsent => 0,
            SendState::Sending(copy) => copy.len(),
        }
    }

    /// Number of records emitted in a chunk and not yet committed or reset
    pub fn in_flight_len(&self) -> usize {
        match &self.state {
            SendState::Unsent => 0,
            SendState::Sending(copy) => copy.in_flight.len(),
        }
    }

    /// Mark this entry as removed from the map
    pub fn detach(&mut self) {
        self.detached = true;
    }

    /// Whether the entry was removed from the map
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    // =========================================================================
    // Drain protocol
    // =========================================================================

    /// Move all un-sent records into a new sending copy, events first.
    ///
    /// Does nothing while a sending copy exists or when there is nothing
    /// to send.
    fn snapshot(&mut self) {
        if matches!(self.state, SendState::Sending(_)) || self.unsent_len() == 0 {
            return;
        }

        let mut pending = VecDeque::with_capacity(self.unsent_len());
        pending.extend(self.event_data.drain(..).map(|r| (RecordKind::Event, r)));
        pending.extend(self.action_data.drain(..).map(|r| (RecordKind::Action, r)));

        self.state = SendState::Sending(SendingCopy {
            pending,
            ..SendingCopy::default()
        });
    }

    /// Serialize the next chunk of the sending copy.
    ///
    /// The first pending payload is always emitted; each further payload is
    /// emitted only while the chunk stays below `max_size`. Returns an empty
    /// string when nothing is left to emit.
    pub fn next_chunk(&mut self, prefix: &str, max_size: usize, delimiter: &str) -> String {
        self.snapshot();

        let copy = match &mut self.state {
            SendState::Sending(copy) if !copy.pending.is_empty() => copy,
            _ => return String::new(),
        };

        let mut chunk = String::from(prefix);

        let mut emitted = 0usize;
        while let Some((kind, record)) = copy.pending.pop_front() {
            if emitted > 0 {
                let next_len = chunk.len() + delimiter.len() + record.data().len();
                if next_len >= max_size {
                    copy.pending.push_front((kind, record));
                    break;
                }
                chunk.push_str(delimiter);
            }
            chunk.push_str(record.data());
            copy.in_flight_bytes += record.size_bytes();
            copy.in_flight.push((kind, record));
            emitted += 1;
        }

        chunk
    }

    /// Drop every in-flight record.
    ///
    /// Records of the sending copy that were never emitted stay queued for
    /// the next chunk.
    pub fn remove_chunked(&mut self) -> Released {
        let copy = match &mut self.state {
            SendState::Sending(copy) => copy,
            SendState::Unsent => return Released::default(),
        };

        let released = Released {
            records: copy.in_flight.len() as u32,
            bytes: copy.in_flight_bytes,
        };
        copy.in_flight.clear();
        copy.in_flight_bytes = 0;

        if copy.pending.is_empty() {
            self.state = SendState::Unsent;
        }
        self.total_bytes -= released.bytes;
        released
    }

    /// Return the whole sending copy to the front of the un-sent queues.
    ///
    /// Returns the number of records moved back.
    pub fn reset_chunked(&mut self) -> u32 {
        let copy = match std::mem::take(&mut self.state) {
            SendState::Sending(copy) => copy,
            SendState::Unsent => return 0,
        };

        let moved = copy.len() as u32;
        let mut events = Vec::new();
        let mut actions = Vec::new();
        for (kind, record) in copy.in_flight.into_iter().chain(copy.pending) {
            match kind {
                RecordKind::Event => events.push(record),
                RecordKind::Action => actions.push(record),
            }
        }

        for record in events.into_iter().rev() {
            self.event_data.push_front(record);
        }
        for record in actions.into_iter().rev() {
            self.action_data.push_front(record);
        }

        moved
    }

    // =========================================================================
    // Eviction
    // =========================================================================

    /// Evict un-sent records older than `min_timestamp` from the queue fronts.
    pub fn evict_by_age(&mut self, min_timestamp: i64) -> Released {
        let mut released = Released::default();
        for queue in [&mut self.event_data, &mut self.action_data] {
            while queue.front().is_some_and(|r| r.timestamp() < min_timestamp) {
                if let Some(record) = queue.pop_front() {
                    released.add(&record);
                }
            }
        }
        self.total_bytes -= released.bytes;
        released
    }

    /// Evict up to `num_records` of the oldest un-sent records.
    pub fn evict_by_number(&mut self, num_records: u32) -> Released {
        let mut released = Released::default();
        while released.records < num_records {
            let take_action = match (self.event_data.front(), self.action_data.front()) {
                (Some(event), Some(action)) => action.timestamp() < event.timestamp(),
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (None, None) => break,
            };
            let queue = if take_action {
                &mut self.action_data
            } else {
                &mut self.event_data
            };
            if let Some(record) = queue.pop_front() {
                released.add(&record);
            }
        }
        self.total_bytes -= released.bytes;
        released
    }
}

// =============================================================================
// Tests
// =============================================================================
