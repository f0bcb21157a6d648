//! In-process stand-ins for the Export API and the local applier.

use parking_lot::Mutex;
use rollsync_engine::{Applier, ApplyResult, FetchClient, RecordApplyError, SyncError, SyncResult};
use rollsync_model::{Collection, RecordKey, RemoteRecord};
use std::collections::{BTreeMap, VecDeque};

/// A fake Export API holding a server-side dataset.
///
/// `fetch(collection, since)` returns every published record of the
/// collection with an ordering key strictly greater than `since`, ascending,
/// which is exactly what the real endpoints promise. Failures can be queued
/// per collection and are returned before any data.
#[derive(Debug, Default)]
pub struct FakeExportApi {
    records: Mutex<BTreeMap<Collection, Vec<RemoteRecord>>>,
    failures: Mutex<BTreeMap<Collection, VecDeque<SyncError>>>,
    calls: Mutex<Vec<(Collection, i64)>>,
    refreshes: Mutex<u32>,
}

impl FakeExportApi {
    /// Creates an API with no data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a record. A record with the same natural key replaces the
    /// previous version.
    pub fn publish(&self, record: RemoteRecord) {
        let mut records = self.records.lock();
        let list = records.entry(record.collection()).or_default();
        let key = record.key();
        list.retain(|r| r.key() != key);
        list.push(record);
        // Stable: equal timestamps keep publication order.
        list.sort_by_key(RemoteRecord::ordering_key);
    }

    /// Publishes several records.
    pub fn publish_all(&self, records: impl IntoIterator<Item = RemoteRecord>) {
        for record in records {
            self.publish(record);
        }
    }

    /// Queues a failure for the next fetch of `collection`.
    pub fn fail_next(&self, collection: Collection, error: SyncError) {
        self.failures
            .lock()
            .entry(collection)
            .or_default()
            .push_back(error);
    }

    /// Returns what a fetch at `since` would return, without recording a
    /// call.
    pub fn records_since(&self, collection: Collection, since: i64) -> Vec<RemoteRecord> {
        self.records
            .lock()
            .get(&collection)
            .map(|list| {
                list.iter()
                    .filter(|r| r.ordering_key() > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns every `(collection, since)` pair fetched so far.
    pub fn calls(&self) -> Vec<(Collection, i64)> {
        self.calls.lock().clone()
    }

    /// Returns how many times credentials were refreshed.
    pub fn credential_refreshes(&self) -> u32 {
        *self.refreshes.lock()
    }
}

impl FetchClient for FakeExportApi {
    fn fetch(&self, collection: Collection, since: i64) -> SyncResult<Vec<RemoteRecord>> {
        self.calls.lock().push((collection, since));
        if let Some(error) = self
            .failures
            .lock()
            .get_mut(&collection)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        Ok(self.records_since(collection, since))
    }

    fn refresh_credentials(&self) -> SyncResult<()> {
        *self.refreshes.lock() += 1;
        Ok(())
    }
}

/// Encodes records as the Export API sends them: a bare JSON array of the
/// collection's record objects.
pub fn wire_body(records: &[RemoteRecord]) -> Vec<u8> {
    let values: Vec<serde_json::Value> = records
        .iter()
        .map(|record| match record {
            RemoteRecord::Resource(r) => serde_json::to_value(r),
            RemoteRecord::ActivityEvent(e) => serde_json::to_value(e),
        })
        .collect::<Result<_, _>>()
        .expect("records always serialize");
    serde_json::to_vec(&values).expect("values always serialize")
}

/// An applier that delegates to another but rejects chosen keys.
pub struct FlakyApplier<A: Applier> {
    inner: A,
    failing: Mutex<Vec<RecordKey>>,
    attempts: Mutex<Vec<RecordKey>>,
}

impl<A: Applier> FlakyApplier<A> {
    /// Wraps `inner`; no key fails until [`fail_on`](Self::fail_on).
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            failing: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Makes every apply of `key` fail.
    pub fn fail_on(&self, key: RecordKey) {
        self.failing.lock().push(key);
    }

    /// Stops all injected failures.
    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    /// Returns every key passed to `apply`, in order.
    pub fn attempts(&self) -> Vec<RecordKey> {
        self.attempts.lock().clone()
    }

    /// Returns the wrapped applier.
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: Applier> Applier for FlakyApplier<A> {
    fn apply(&self, record: &RemoteRecord) -> Result<ApplyResult, RecordApplyError> {
        let key = record.key();
        self.attempts.lock().push(key.clone());
        if self.failing.lock().contains(&key) {
            return Err(RecordApplyError::new(key, "injected failure"));
        }
        self.inner.apply(record)
    }
}
