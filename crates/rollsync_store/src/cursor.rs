//! Cursor persistence.

use crate::dir::StateDir;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use rollsync_model::Collection;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const CURSOR_FILE: &str = "cursors.json";

/// Persists the last successfully applied timestamp per collection.
///
/// A missing cursor reads as `0`, which asks the API for the full history.
pub trait CursorStore: Send + Sync {
    /// Returns the cursor for `collection`, or `0` if none was stored.
    fn get(&self, collection: Collection) -> StoreResult<i64>;

    /// Stores the cursor for `collection`.
    ///
    /// Callers must not assume the update happened unless this returns `Ok`.
    fn set(&self, collection: Collection, timestamp: i64) -> StoreResult<()>;
}

impl<T: CursorStore + ?Sized> CursorStore for Arc<T> {
    fn get(&self, collection: Collection) -> StoreResult<i64> {
        (**self).get(collection)
    }

    fn set(&self, collection: Collection, timestamp: i64) -> StoreResult<()> {
        (**self).set(collection, timestamp)
    }
}

/// Rejects negative and backwards cursor writes.
fn check_advance(collection: Collection, current: i64, attempted: i64) -> StoreResult<()> {
    if attempted < 0 {
        return Err(StoreError::InvalidCursor {
            collection,
            value: attempted,
        });
    }
    if attempted < current {
        return Err(StoreError::CursorRegression {
            collection,
            current,
            attempted,
        });
    }
    Ok(())
}

/// An in-memory cursor store.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: RwLock<BTreeMap<Collection, i64>>,
}

impl MemoryCursorStore {
    /// Creates an empty store (every cursor reads as `0`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with preset cursors.
    pub fn with_cursors(cursors: impl IntoIterator<Item = (Collection, i64)>) -> Self {
        Self {
            cursors: RwLock::new(cursors.into_iter().collect()),
        }
    }
}

impl CursorStore for MemoryCursorStore {
    fn get(&self, collection: Collection) -> StoreResult<i64> {
        Ok(self.cursors.read().get(&collection).copied().unwrap_or(0))
    }

    fn set(&self, collection: Collection, timestamp: i64) -> StoreResult<()> {
        let mut cursors = self.cursors.write();
        let current = cursors.get(&collection).copied().unwrap_or(0);
        check_advance(collection, current, timestamp)?;
        cursors.insert(collection, timestamp);
        Ok(())
    }
}

/// A cursor store backed by `cursors.json` in a [`StateDir`].
///
/// # Durability
///
/// Every `set` rewrites the whole file through [`StateDir::write_atomic`]; the
/// cached value is only updated after the write returned successfully, so a
/// failed write never becomes visible.
#[derive(Debug)]
pub struct FileCursorStore {
    dir: Arc<StateDir>,
    cursors: RwLock<BTreeMap<Collection, i64>>,
}

impl FileCursorStore {
    /// Opens (creating if needed) a state directory and loads its cursors.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::new(Arc::new(StateDir::open(path, true)?))
    }

    /// Loads the cursors of an already opened state directory.
    pub fn new(dir: Arc<StateDir>) -> StoreResult<Self> {
        let cursors = match dir.read_file(CURSOR_FILE)? {
            Some(data) if !data.is_empty() => {
                let cursors: BTreeMap<Collection, i64> = serde_json::from_slice(&data)
                    .map_err(|e| StoreError::Corrupted(format!("{CURSOR_FILE}: {e}")))?;
                if let Some((collection, value)) = cursors.iter().find(|(_, v)| **v < 0) {
                    return Err(StoreError::Corrupted(format!(
                        "{CURSOR_FILE}: negative cursor {value} for {collection}"
                    )));
                }
                cursors
            }
            _ => BTreeMap::new(),
        };

        Ok(Self {
            dir,
            cursors: RwLock::new(cursors),
        })
    }
}

impl CursorStore for FileCursorStore {
    fn get(&self, collection: Collection) -> StoreResult<i64> {
        Ok(self.cursors.read().get(&collection).copied().unwrap_or(0))
    }

    fn set(&self, collection: Collection, timestamp: i64) -> StoreResult<()> {
        // Held across the write: both collections share one file.
        let mut cursors = self.cursors.write();
        let current = cursors.get(&collection).copied().unwrap_or(0);
        check_advance(collection, current, timestamp)?;
        if current == timestamp && cursors.contains_key(&collection) {
            return Ok(());
        }

        let mut next = cursors.clone();
        next.insert(collection, timestamp);
        let data = serde_json::to_vec_pretty(&next)?;
        self.dir.write_atomic(CURSOR_FILE, &data)?;

        *cursors = next;
        debug!(%collection, timestamp, "cursor persisted");
        Ok(())
    }
}
