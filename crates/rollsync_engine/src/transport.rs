//! Fetch layer abstraction.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use rollsync_model::{Collection, RemoteRecord};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Retrieves batches of records newer than a cursor.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process fakes for testing, etc.).
///
/// # Contract
///
/// - A successful call returns one complete batch, ascending by ordering key.
///   There is no further pagination beyond the timestamp.
/// - An empty batch is a success, distinct from a transport failure.
/// - Transport failures and timeouts are [`SyncError::TransientFetch`];
///   rejected credentials are [`SyncError::Auth`]; other client errors are
///   [`SyncError::Request`].
pub trait FetchClient: Send + Sync {
    /// Fetches the records of `collection` newer than `since`.
    fn fetch(&self, collection: Collection, since: i64) -> SyncResult<Vec<RemoteRecord>>;

    /// Drops any cached credential so the next fetch acquires a fresh one.
    fn refresh_credentials(&self) -> SyncResult<()> {
        Ok(())
    }
}

impl<T: FetchClient + ?Sized> FetchClient for Arc<T> {
    fn fetch(&self, collection: Collection, since: i64) -> SyncResult<Vec<RemoteRecord>> {
        (**self).fetch(collection, since)
    }

    fn refresh_credentials(&self) -> SyncResult<()> {
        (**self).refresh_credentials()
    }
}

/// A scripted fetch client for testing.
///
/// Responses are queued per collection and handed out in order; once a
/// queue runs dry every fetch returns an empty batch.
#[derive(Debug, Default)]
pub struct MockFetchClient {
    responses: Mutex<BTreeMap<Collection, VecDeque<SyncResult<Vec<RemoteRecord>>>>>,
    calls: Mutex<Vec<(Collection, i64)>>,
    credential_refreshes: Mutex<u32>,
}

impl MockFetchClient {
    /// Creates a mock with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful batch.
    pub fn push_batch(&self, collection: Collection, records: Vec<RemoteRecord>) {
        self.push_result(collection, Ok(records));
    }

    /// Queues a failure.
    pub fn push_error(&self, collection: Collection, error: SyncError) {
        self.push_result(collection, Err(error));
    }

    fn push_result(&self, collection: Collection, result: SyncResult<Vec<RemoteRecord>>) {
        self.responses
            .lock()
            .entry(collection)
            .or_default()
            .push_back(result);
    }

    /// Returns every `(collection, since)` pair fetched so far.
    pub fn calls(&self) -> Vec<(Collection, i64)> {
        self.calls.lock().clone()
    }

    /// Returns how many times credentials were refreshed.
    pub fn credential_refreshes(&self) -> u32 {
        *self.credential_refreshes.lock()
    }
}

impl FetchClient for MockFetchClient {
    fn fetch(&self, collection: Collection, since: i64) -> SyncResult<Vec<RemoteRecord>> {
        self.calls.lock().push((collection, since));
        self.responses
            .lock()
            .get_mut(&collection)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn refresh_credentials(&self) -> SyncResult<()> {
        *self.credential_refreshes.lock() += 1;
        Ok(())
    }
}
