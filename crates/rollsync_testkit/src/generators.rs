//! Property-based test generators using proptest.
//!
//! Batches produced here honour the Export API contract: ascending by
//! ordering key, every key strictly newer than the cursor the batch answers.

use crate::fixtures::{deleted_resource, event, resource};
use proptest::prelude::*;
use rollsync_model::RemoteRecord;

/// Strategy for resource identifiers drawn from a small pool, so batches
/// revisit the same keys.
pub fn resource_id_strategy() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|n| format!("r{n}"))
}

/// Strategy for usernames drawn from a small pool.
pub fn username_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["jdoe", "asmith", "mlee"]).prop_map(str::to_string)
}

/// Strategy for non-decreasing ordering keys greater than `since`.
pub fn ordering_keys_strategy(since: i64, len: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..5, len).prop_map(move |steps| {
        let mut ts = since;
        steps
            .into_iter()
            .map(|step| {
                // The first key must be strictly newer than `since`.
                ts += step.max(i64::from(ts == since));
                ts
            })
            .collect()
    })
}

/// Strategy for a resource batch answering a fetch at `since`.
///
/// Roughly one record in five is a tombstone.
pub fn resource_batch_strategy(since: i64, max_len: usize) -> impl Strategy<Value = Vec<RemoteRecord>> {
    (0..=max_len)
        .prop_flat_map(move |len| {
            (
                ordering_keys_strategy(since, len),
                prop::collection::vec((resource_id_strategy(), prop::bool::weighted(0.2)), len),
            )
        })
        .prop_map(|(keys, records)| {
            keys.into_iter()
                .zip(records)
                .map(|(ts, (id, deleted))| {
                    if deleted {
                        deleted_resource(&id, ts)
                    } else {
                        resource(&id, ts)
                    }
                })
                .collect()
        })
}

/// Strategy for an activity event batch answering a fetch at `since`.
pub fn event_batch_strategy(since: i64, max_len: usize) -> impl Strategy<Value = Vec<RemoteRecord>> {
    (0..=max_len)
        .prop_flat_map(move |len| {
            (
                ordering_keys_strategy(since, len),
                prop::collection::vec(
                    (username_strategy(), resource_id_strategy(), 0i64..4),
                    len,
                ),
            )
        })
        .prop_map(|(keys, events)| {
            keys.into_iter()
                .zip(events)
                .map(|(ts, (user, resource_id, time))| {
                    event(&user, &resource_id, 1_700_000_000 + time, ts)
                })
                .collect()
        })
}
