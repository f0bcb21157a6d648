//! Idempotent application of remote records to the local mirror.

use crate::error::RecordApplyError;
use rollsync_model::{RecordKey, RemoteRecord};
use rollsync_store::MirrorStore;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// What applying one record did to the local mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyResult {
    /// No local copy existed; the record was stored.
    Inserted,
    /// The local copy was replaced.
    Updated,
    /// The local copy already matched the record.
    Unchanged,
    /// The local copy was flagged as deleted (or a tombstone was stored).
    MarkedDeleted,
    /// The local copy carries a newer ordering key and was kept.
    Stale,
}

impl fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplyResult::Inserted => "inserted",
            ApplyResult::Updated => "updated",
            ApplyResult::Unchanged => "unchanged",
            ApplyResult::MarkedDeleted => "marked_deleted",
            ApplyResult::Stale => "stale",
        };
        f.write_str(name)
    }
}

/// Applies remote records to local state.
///
/// Implementations must be idempotent: applying the same record twice leaves
/// the same local state as applying it once. Each call is atomic with respect
/// to the local store; a failure names the offending record's key and leaves
/// previously applied records intact.
pub trait Applier: Send + Sync {
    /// Applies one record.
    fn apply(&self, record: &RemoteRecord) -> Result<ApplyResult, RecordApplyError>;
}

impl<T: Applier + ?Sized> Applier for Arc<T> {
    fn apply(&self, record: &RemoteRecord) -> Result<ApplyResult, RecordApplyError> {
        (**self).apply(record)
    }
}

/// An [`Applier`] that upserts into a [`MirrorStore`] by natural key.
pub struct MirrorApplier<M: MirrorStore> {
    mirror: M,
}

impl<M: MirrorStore> MirrorApplier<M> {
    /// Creates an applier writing to `mirror`.
    pub fn new(mirror: M) -> Self {
        Self { mirror }
    }

    /// Returns the underlying mirror store.
    pub fn mirror(&self) -> &M {
        &self.mirror
    }

    fn put(&self, key: &RecordKey, record: &RemoteRecord) -> Result<(), RecordApplyError> {
        self.mirror
            .put(record)
            .map_err(|e| RecordApplyError::new(key.clone(), e.to_string()))
    }
}

/// Rejects records the mirror must never hold.
pub fn validate_record(record: &RemoteRecord) -> Result<(), RecordApplyError> {
    let reject = |reason: &str| Err(RecordApplyError::new(record.key(), reason));

    if record.ordering_key() < 0 {
        return reject("negative ordering key");
    }
    match record {
        RemoteRecord::Resource(resource) => {
            if resource.resource_id.is_empty() {
                return reject("empty resourceId");
            }
        }
        RemoteRecord::ActivityEvent(event) => {
            if event.username.is_empty() {
                return reject("empty username");
            }
            if event.resource_id.is_empty() {
                return reject("empty resourceId");
            }
            if event.duration < 0 {
                return reject("negative duration");
            }
        }
    }
    Ok(())
}

/// Builds the local form of a deletion: the existing copy's fields, flagged
/// deleted, at the tombstone's ordering key.
fn mark_deleted(existing: &RemoteRecord, tombstone: &RemoteRecord) -> RemoteRecord {
    match existing {
        RemoteRecord::Resource(resource) => {
            let mut marked = resource.clone();
            marked.deleted = true;
            marked.ts = tombstone.ordering_key();
            RemoteRecord::Resource(marked)
        }
        // Only resources carry a deletion flag.
        RemoteRecord::ActivityEvent(_) => tombstone.clone(),
    }
}

impl<M: MirrorStore> Applier for MirrorApplier<M> {
    fn apply(&self, record: &RemoteRecord) -> Result<ApplyResult, RecordApplyError> {
        validate_record(record)?;

        let key = record.key();
        let existing = self
            .mirror
            .get(&key)
            .map_err(|e| RecordApplyError::new(key.clone(), e.to_string()))?;

        let result = match existing {
            None => {
                self.put(&key, record)?;
                if record.is_deleted() {
                    ApplyResult::MarkedDeleted
                } else {
                    ApplyResult::Inserted
                }
            }
            Some(existing) if record.ordering_key() < existing.ordering_key() => {
                ApplyResult::Stale
            }
            Some(existing) if record.is_deleted() => {
                if existing.is_deleted() && existing.ordering_key() == record.ordering_key() {
                    ApplyResult::Unchanged
                } else {
                    self.put(&key, &mark_deleted(&existing, record))?;
                    ApplyResult::MarkedDeleted
                }
            }
            Some(existing) if existing == *record => ApplyResult::Unchanged,
            Some(_) => {
                self.put(&key, record)?;
                ApplyResult::Updated
            }
        };

        trace!(%key, %result, ts = record.ordering_key(), "record applied");
        Ok(result)
    }
}
