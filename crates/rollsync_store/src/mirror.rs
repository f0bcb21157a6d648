//! Mirrored record storage.

use crate::error::StoreResult;
use parking_lot::RwLock;
use rollsync_model::{Collection, RecordKey, RemoteRecord};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Local storage for mirrored records.
///
/// Records are keyed by their natural key; a `put` replaces whatever was
/// stored under that key. Each `put` is atomic: it is either fully visible or
/// not at all, and a failing `put` never affects other keys.
///
/// Deleted resources are stored like any other record (with their `deleted`
/// flag set) and are never physically removed.
pub trait MirrorStore: Send + Sync {
    /// Returns the record stored under `key`.
    fn get(&self, key: &RecordKey) -> StoreResult<Option<RemoteRecord>>;

    /// Stores `record` under its natural key.
    fn put(&self, record: &RemoteRecord) -> StoreResult<()>;

    /// Returns every record of `collection`, ordered by key.
    fn records(&self, collection: Collection) -> StoreResult<Vec<RemoteRecord>>;

    /// Returns the number of records of `collection`, deleted ones included.
    fn len(&self, collection: Collection) -> StoreResult<usize>;
}

impl<T: MirrorStore + ?Sized> MirrorStore for Arc<T> {
    fn get(&self, key: &RecordKey) -> StoreResult<Option<RemoteRecord>> {
        (**self).get(key)
    }

    fn put(&self, record: &RemoteRecord) -> StoreResult<()> {
        (**self).put(record)
    }

    fn records(&self, collection: Collection) -> StoreResult<Vec<RemoteRecord>> {
        (**self).records(collection)
    }

    fn len(&self, collection: Collection) -> StoreResult<usize> {
        (**self).len(collection)
    }
}

/// An in-memory mirror store.
#[derive(Debug, Default)]
pub struct MemoryMirrorStore {
    records: RwLock<BTreeMap<RecordKey, RemoteRecord>>,
}

impl MemoryMirrorStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MirrorStore for MemoryMirrorStore {
    fn get(&self, key: &RecordKey) -> StoreResult<Option<RemoteRecord>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn put(&self, record: &RemoteRecord) -> StoreResult<()> {
        self.records.write().insert(record.key(), record.clone());
        Ok(())
    }

    fn records(&self, collection: Collection) -> StoreResult<Vec<RemoteRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|(key, _)| key.collection() == collection)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn len(&self, collection: Collection) -> StoreResult<usize> {
        Ok(self
            .records
            .read()
            .keys()
            .filter(|key| key.collection() == collection)
            .count())
    }
}
