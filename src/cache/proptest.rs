//! Property-Based Tests for the Beacon Cache
//!
//! # Test Properties
//!
//! 1. **Byte Accounting**: the byte total always equals the payload bytes
//!    that can still be drained
//! 2. **Chunk Ordering**: chunks of one cycle reproduce events then actions,
//!    each in insertion order
//! 3. **No Loss on Reset**: get → reset keeps every record, ahead of new data
//! 4. **Eviction Confinement**: eviction never shrinks the sending copy

#![cfg(test)]

use proptest::prelude::*;

use super::BeaconCache;

// =============================================================================
// Property Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    AddEvent(i32, i64, String),
    AddAction(i32, i64, String),
    Chunk(i32, usize),
    Commit(i32),
    Reset(i32),
    EvictByAge(i32, i64),
    EvictByNumber(i32, u32),
    Delete(i32),
}

fn key_strategy() -> impl Strategy<Value = i32> {
    0i32..3
}

fn payload_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (key_strategy(), 0i64..100, payload_strategy()).prop_map(|(k, t, d)| Op::AddEvent(k, t, d)),
        4 => (key_strategy(), 0i64..100, payload_strategy()).prop_map(|(k, t, d)| Op::AddAction(k, t, d)),
        2 => (key_strategy(), 1usize..20).prop_map(|(k, m)| Op::Chunk(k, m)),
        1 => key_strategy().prop_map(Op::Commit),
        1 => key_strategy().prop_map(Op::Reset),
        1 => (key_strategy(), 0i64..100).prop_map(|(k, t)| Op::EvictByAge(k, t)),
        1 => (key_strategy(), 0u32..3).prop_map(|(k, n)| Op::EvictByNumber(k, n)),
        1 => key_strategy().prop_map(Op::Delete),
    ]
}

fn apply(cache: &BeaconCache, op: &Op) {
    match op {
        Op::AddEvent(k, t, d) => cache.add_event_data(*k, *t, d.as_str()),
        Op::AddAction(k, t, d) => cache.add_action_data(*k, *t, d.as_str()),
        Op::Chunk(k, m) => {
            cache.get_next_beacon_chunk(*k, "", *m, "|");
        }
        Op::Commit(k) => cache.remove_chunked_data(*k),
        Op::Reset(k) => cache.reset_chunked_data(*k),
        Op::EvictByAge(k, t) => {
            cache.evict_records_by_age(*k, *t);
        }
        Op::EvictByNumber(k, n) => {
            cache.evict_records_by_number(*k, *n);
        }
        Op::Delete(k) => cache.delete_cache_entry(*k),
    }
}

/// Reset and fully drain one beacon, returning its payloads in send order
fn drain_all(cache: &BeaconCache, key: i32) -> Vec<String> {
    cache.reset_chunked_data(key);
    let chunk = cache.get_next_beacon_chunk(key, "", usize::MAX, "|");
    cache.remove_chunked_data(key);
    if chunk.is_empty() {
        Vec::new()
    } else {
        chunk.split('|').map(str::to_string).collect()
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: byte total matches the data that is still reachable.
    #[test]
    fn prop_byte_accounting(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let cache = BeaconCache::new();
        for op in &ops {
            apply(&cache, op);

            let per_entry: u64 = cache
                .beacon_ids()
                .into_iter()
                .filter_map(|k| cache.entry_stats(k))
                .map(|s| s.bytes)
                .sum();
            prop_assert_eq!(cache.num_bytes_in_cache(), per_entry);
        }

        let reachable: u64 = cache
            .beacon_ids()
            .into_iter()
            .flat_map(|k| drain_all(&cache, k))
            .map(|p| p.len() as u64)
            .sum();
        prop_assert_eq!(reachable, per_entry_bytes_before_drain(&ops));
        prop_assert_eq!(cache.num_bytes_in_cache(), 0);
    }

    /// Property: chunks of one cycle reproduce events then actions in order.
    #[test]
    fn prop_chunk_ordering(
        events in prop::collection::vec(payload_strategy(), 0..20),
        actions in prop::collection::vec(payload_strategy(), 0..20),
        max_size in 1usize..30,
    ) {
        let cache = BeaconCache::new();
        for (i, data) in actions.iter().enumerate() {
            cache.add_action_data(1, i as i64, data.as_str());
        }
        for (i, data) in events.iter().enumerate() {
            cache.add_event_data(1, i as i64, data.as_str());
        }

        let mut sent = Vec::new();
        loop {
            let chunk = cache.get_next_beacon_chunk(1, "", max_size, "|");
            if chunk.is_empty() {
                break;
            }
            // Every chunk carries at least one payload
            prop_assert!(!chunk.starts_with('|'));
            if chunk.contains('|') {
                prop_assert!(chunk.len() < max_size);
            }
            sent.extend(chunk.split('|').map(str::to_string));
        }
        cache.remove_chunked_data(1);

        let expected: Vec<String> = events.iter().chain(actions.iter()).cloned().collect();
        prop_assert_eq!(sent, expected);
        prop_assert!(cache.is_empty(1));
    }

    /// Property: get → reset loses nothing and re-queues ahead of new data.
    #[test]
    fn prop_reset_keeps_everything(
        before in prop::collection::vec(payload_strategy(), 1..15),
        after in prop::collection::vec(payload_strategy(), 0..5),
        chunks in 1usize..4,
        max_size in 1usize..20,
    ) {
        let cache = BeaconCache::new();
        for (i, data) in before.iter().enumerate() {
            cache.add_event_data(5, i as i64, data.as_str());
        }
        let bytes = cache.num_bytes_in_cache();

        for _ in 0..chunks {
            cache.get_next_beacon_chunk(5, "", max_size, "|");
        }
        for (i, data) in after.iter().enumerate() {
            cache.add_event_data(5, 100 + i as i64, data.as_str());
        }
        cache.reset_chunked_data(5);

        let added: u64 = after.iter().map(|d| d.len() as u64).sum();
        prop_assert_eq!(cache.num_bytes_in_cache(), bytes + added);

        let expected: Vec<String> = before.iter().chain(after.iter()).cloned().collect();
        prop_assert_eq!(drain_all(&cache, 5), expected);
    }

    /// Property: eviction during an open cycle never touches the sending copy.
    #[test]
    fn prop_eviction_confined_to_unsent(
        sent in prop::collection::vec(payload_strategy(), 1..10),
        fresh in prop::collection::vec(payload_strategy(), 0..10),
        max_size in 1usize..20,
        min_timestamp in 0i64..1000,
        num in 0u32..20,
    ) {
        let cache = BeaconCache::new();
        for (i, data) in sent.iter().enumerate() {
            cache.add_event_data(3, i as i64, data.as_str());
        }
        cache.get_next_beacon_chunk(3, "", max_size, "|");
        for (i, data) in fresh.iter().enumerate() {
            cache.add_action_data(3, i as i64, data.as_str());
        }

        let before = cache.entry_stats(3).unwrap();
        let by_age = cache.evict_records_by_age(3, min_timestamp);
        let by_number = cache.evict_records_by_number(3, num);
        let after = cache.entry_stats(3).unwrap();

        prop_assert_eq!(after.sending_records, before.sending_records);
        prop_assert_eq!(after.in_flight_records, before.in_flight_records);
        prop_assert_eq!(
            after.unsent_records,
            before.unsent_records - (by_age + by_number) as usize
        );
    }
}

/// Replays `ops` against a plain model to compute the bytes that must
/// remain reachable at the end.
fn per_entry_bytes_before_drain(ops: &[Op]) -> u64 {
    use std::collections::{HashMap, VecDeque};

    #[derive(Default)]
    struct Model {
        events: VecDeque<(i64, u64)>,
        actions: VecDeque<(i64, u64)>,
        in_flight: Vec<(bool, (i64, u64))>,
        pending: VecDeque<(bool, (i64, u64))>,
        sending: bool,
    }

    let mut model: HashMap<i32, Model> = HashMap::new();
    for op in ops {
        match op {
            Op::AddEvent(k, t, d) => model.entry(*k).or_default().events.push_back((*t, d.len() as u64)),
            Op::AddAction(k, t, d) => model.entry(*k).or_default().actions.push_back((*t, d.len() as u64)),
            Op::Chunk(k, max) => {
                let Some(m) = model.get_mut(k) else { continue };
                if !m.sending && !(m.events.is_empty() && m.actions.is_empty()) {
                    m.pending.extend(m.events.drain(..).map(|r| (true, r)));
                    m.pending.extend(m.actions.drain(..).map(|r| (false, r)));
                    m.sending = true;
                }
                let mut len = 0u64;
                let mut emitted = 0;
                while let Some(item) = m.pending.front().copied() {
                    let next = if emitted == 0 { len + item.1 .1 } else { len + 1 + item.1 .1 };
                    if emitted > 0 && next >= *max as u64 {
                        break;
                    }
                    len = next;
                    emitted += 1;
                    m.pending.pop_front();
                    m.in_flight.push(item);
                }
            }
            Op::Commit(k) => {
                let Some(m) = model.get_mut(k) else { continue };
                m.in_flight.clear();
                if m.pending.is_empty() {
                    m.sending = false;
                }
            }
            Op::Reset(k) => {
                let Some(m) = model.get_mut(k) else { continue };
                let items: Vec<_> = m.in_flight.drain(..).chain(m.pending.drain(..)).collect();
                for (is_event, r) in items.into_iter().rev() {
                    if is_event {
                        m.events.push_front(r);
                    } else {
                        m.actions.push_front(r);
                    }
                }
                m.sending = false;
            }
            Op::EvictByAge(k, t) => {
                let Some(m) = model.get_mut(k) else { continue };
                while m.events.front().is_some_and(|r| r.0 < *t) {
                    m.events.pop_front();
                }
                while m.actions.front().is_some_and(|r| r.0 < *t) {
                    m.actions.pop_front();
                }
            }
            Op::EvictByNumber(k, n) => {
                let Some(m) = model.get_mut(k) else { continue };
                for _ in 0..*n {
                    let take_action = match (m.events.front(), m.actions.front()) {
                        (Some(e), Some(a)) => a.0 < e.0,
                        (Some(_), None) => false,
                        (None, Some(_)) => true,
                        (None, None) => break,
                    };
                    if take_action {
                        m.actions.pop_front();
                    } else {
                        m.events.pop_front();
                    }
                }
            }
            Op::Delete(k) => {
                model.remove(k);
            }
        }
    }

    model
        .values()
        .map(|m| {
            m.events.iter().chain(m.actions.iter()).map(|r| r.1).sum::<u64>()
                + m.in_flight.iter().chain(m.pending.iter()).map(|(_, r)| r.1).sum::<u64>()
        })
        .sum()
}
