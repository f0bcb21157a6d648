//! Per-collection sync state and statistics.

use crate::applier::ApplyResult;
use rollsync_model::Collection;
use serde::Serialize;
use std::time::{Duration, SystemTime};

/// Where a collection's cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No cycle is running.
    Idle,
    /// Waiting for the Export API.
    Fetching,
    /// Applying the fetched batch.
    Applying,
    /// Persisting the new cursor.
    Advancing,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncState::Idle => "idle",
            SyncState::Fetching => "fetching",
            SyncState::Applying => "applying",
            SyncState::Advancing => "advancing",
        };
        f.write_str(name)
    }
}

/// Tally of [`ApplyResult`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyCounts {
    /// Records stored for the first time.
    pub inserted: u64,
    /// Records that replaced a local copy.
    pub updated: u64,
    /// Records identical to the local copy.
    pub unchanged: u64,
    /// Records that flagged a resource deleted.
    pub marked_deleted: u64,
    /// Records older than the local copy.
    pub stale: u64,
}

impl ApplyCounts {
    /// Counts one result.
    pub fn record(&mut self, result: ApplyResult) {
        match result {
            ApplyResult::Inserted => self.inserted += 1,
            ApplyResult::Updated => self.updated += 1,
            ApplyResult::Unchanged => self.unchanged += 1,
            ApplyResult::MarkedDeleted => self.marked_deleted += 1,
            ApplyResult::Stale => self.stale += 1,
        }
    }

    /// Total number of records counted.
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.unchanged + self.marked_deleted + self.stale
    }
}

/// Outcome of one successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Collection synced.
    pub collection: Collection,
    /// Cursor before the cycle.
    pub previous_cursor: i64,
    /// Cursor after the cycle. Equal to `previous_cursor` for an empty
    /// batch.
    pub cursor: i64,
    /// Number of records fetched.
    pub fetched: usize,
    /// What applying them did.
    pub applied: ApplyCounts,
    /// Wall time of the cycle.
    pub duration: Duration,
}

impl CycleReport {
    /// Returns true if the cursor moved.
    pub fn advanced(&self) -> bool {
        self.cursor != self.previous_cursor
    }
}

/// Observable status of one collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionStatus {
    /// Collection described.
    pub collection: Collection,
    /// Current state.
    pub state: SyncState,
    /// Failed cycles since the last success.
    pub consecutive_failures: u32,
    /// Message of the most recent failure, cleared on success.
    pub last_error: Option<String>,
    /// Successful cycles since start.
    pub cycles_completed: u64,
    /// Records applied by successful cycles since start.
    pub records_applied: u64,
    /// When the last successful cycle finished.
    pub last_success: Option<SystemTime>,
}

impl CollectionStatus {
    pub(crate) fn new(collection: Collection) -> Self {
        Self {
            collection,
            state: SyncState::Idle,
            consecutive_failures: 0,
            last_error: None,
            cycles_completed: 0,
            records_applied: 0,
            last_success: None,
        }
    }
}
