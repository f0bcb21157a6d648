//! The per-collection sync cycle.
//!
//! A cycle reads the collection's cursor, fetches everything newer, applies
//! it record by record and, only if every record applied, advances the cursor
//! to the ordering key of the last record in the batch.
//!
//! ```text
//! Idle -> Fetching -> Applying -> Advancing -> Idle
//!            |           |           |
//!            +-----------+-----------+--> Idle (error, cursor unchanged)
//! ```

use crate::applier::Applier;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::state::{ApplyCounts, CollectionStatus, CycleReport, SyncState};
use crate::transport::FetchClient;
use parking_lot::{Mutex, RwLock};
use rollsync_model::{Collection, RemoteRecord};
use rollsync_store::CursorStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime};
use tracing::{debug, error, info, warn};

/// Computes the cursor after a successfully applied batch.
///
/// The new cursor is the ordering key of the *last* record, which the API
/// guarantees is the batch maximum. An empty batch keeps `current`.
///
/// # Errors
///
/// Returns [`SyncError::Protocol`] if the last record is older than
/// `current`: the API broke its ordering contract and nothing may be
/// persisted.
pub fn next_cursor(current: i64, batch: &[RemoteRecord]) -> SyncResult<i64> {
    match batch.last() {
        None => Ok(current),
        Some(last) => {
            let next = last.ordering_key();
            if next < current {
                Err(SyncError::Protocol(format!(
                    "batch ends at {next}, before cursor {current}"
                )))
            } else {
                Ok(next)
            }
        }
    }
}

/// Cycle bookkeeping for one collection.
struct Session {
    collection: Collection,
    running: Mutex<()>,
    cancelled: AtomicBool,
    status: RwLock<CollectionStatus>,
}

impl Session {
    fn new(collection: Collection) -> Self {
        Self {
            collection,
            running: Mutex::new(()),
            cancelled: AtomicBool::new(false),
            status: RwLock::new(CollectionStatus::new(collection)),
        }
    }

    fn set_state(&self, state: SyncState) {
        self.status.write().state = state;
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Drives sync cycles for both collections.
///
/// The two collections are fully independent: each has its own cursor, its
/// own lock and its own status, and an error in one never touches the other.
pub struct SyncOrchestrator<F: FetchClient, C: CursorStore, A: Applier> {
    config: SyncConfig,
    fetcher: F,
    cursors: C,
    applier: A,
    resources: Session,
    activity_events: Session,
}

impl<F: FetchClient, C: CursorStore, A: Applier> SyncOrchestrator<F, C, A> {
    /// Creates an orchestrator.
    pub fn new(config: SyncConfig, fetcher: F, cursors: C, applier: A) -> Self {
        Self {
            config,
            fetcher,
            cursors,
            applier,
            resources: Session::new(Collection::Resources),
            activity_events: Session::new(Collection::ActivityEvents),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the fetch client.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Returns the cursor store.
    pub fn cursors(&self) -> &C {
        &self.cursors
    }

    /// Returns the applier.
    pub fn applier(&self) -> &A {
        &self.applier
    }

    fn session(&self, collection: Collection) -> &Session {
        match collection {
            Collection::Resources => &self.resources,
            Collection::ActivityEvents => &self.activity_events,
        }
    }

    /// Returns the persisted cursor of `collection`.
    pub fn cursor(&self, collection: Collection) -> SyncResult<i64> {
        Ok(self.cursors.get(collection)?)
    }

    /// Returns the current state of `collection`.
    pub fn state(&self, collection: Collection) -> SyncState {
        self.session(collection).status.read().state
    }

    /// Returns a snapshot of `collection`'s status.
    pub fn status(&self, collection: Collection) -> CollectionStatus {
        self.session(collection).status.read().clone()
    }

    /// Returns the status of every collection.
    pub fn statuses(&self) -> Vec<CollectionStatus> {
        Collection::ALL.iter().map(|&c| self.status(c)).collect()
    }

    /// Requests cancellation of `collection`'s cycle.
    ///
    /// The running cycle stops at its next checkpoint (before fetching,
    /// between records, before advancing) with [`SyncError::Cancelled`]. If no
    /// cycle is running the request applies to the next one. Either way the
    /// request is consumed when that cycle ends.
    pub fn cancel(&self, collection: Collection) {
        debug!(%collection, "cancellation requested");
        self.session(collection).cancelled.store(true, Ordering::SeqCst);
    }

    /// Requests cancellation of every collection's cycle.
    pub fn cancel_all(&self) {
        for collection in Collection::ALL {
            self.cancel(collection);
        }
    }

    /// Runs one sync cycle for `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::CycleInProgress`] immediately if a cycle for the
    /// same collection is already running. Any other error leaves the cursor
    /// where it was; records applied before the failure stay applied.
    pub fn run_cycle(&self, collection: Collection) -> SyncResult<CycleReport> {
        let session = self.session(collection);
        let Some(_running) = session.running.try_lock() else {
            debug!(%collection, "cycle already running");
            return Err(SyncError::CycleInProgress(collection));
        };

        let result = self.cycle(session);
        session.cancelled.store(false, Ordering::SeqCst);
        self.finish(session, &result);
        result
    }

    /// Runs one cycle for each collection concurrently.
    ///
    /// Results are returned in [`Collection::ALL`] order and are independent:
    /// one collection failing does not affect the other.
    pub fn run_all(&self) -> Vec<(Collection, SyncResult<CycleReport>)> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = Collection::ALL
                .iter()
                .map(|&collection| (collection, scope.spawn(move || self.run_cycle(collection))))
                .collect();

            handles
                .into_iter()
                .map(|(collection, handle)| match handle.join() {
                    Ok(result) => (collection, result),
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn cycle(&self, session: &Session) -> SyncResult<CycleReport> {
        let start = Instant::now();
        let collection = session.collection;

        let cursor = self.cursors.get(collection)?;
        session.check_cancelled()?;

        session.set_state(SyncState::Fetching);
        let batch = self.fetch(session, cursor)?;

        if batch.is_empty() {
            debug!(%collection, cursor, "no new records");
            return Ok(CycleReport {
                collection,
                previous_cursor: cursor,
                cursor,
                fetched: 0,
                applied: ApplyCounts::default(),
                duration: start.elapsed(),
            });
        }

        // Checked before applying so a batch that breaks the ordering
        // contract leaves no trace.
        let next = next_cursor(cursor, &batch)?;
        if let Some(stray) = batch.iter().find(|r| r.collection() != collection) {
            return Err(SyncError::Protocol(format!(
                "{collection} batch contains {}",
                stray.key()
            )));
        }

        session.set_state(SyncState::Applying);
        let mut applied = ApplyCounts::default();
        for record in &batch {
            session.check_cancelled()?;
            applied.record(self.applier.apply(record)?);
        }

        session.check_cancelled()?;
        session.set_state(SyncState::Advancing);
        if next > cursor {
            self.cursors.set(collection, next)?;
        }

        Ok(CycleReport {
            collection,
            previous_cursor: cursor,
            cursor: next,
            fetched: batch.len(),
            applied,
            duration: start.elapsed(),
        })
    }

    /// Fetches once, refreshing the credential and retrying once on an
    /// authentication failure.
    fn fetch(&self, session: &Session, cursor: i64) -> SyncResult<Vec<RemoteRecord>> {
        let collection = session.collection;
        match self.fetcher.fetch(collection, cursor) {
            Err(e) if e.requires_reauth() => {
                warn!(%collection, error = %e, "credential rejected, re-authenticating");
                self.fetcher.refresh_credentials()?;
                session.check_cancelled()?;
                self.fetcher.fetch(collection, cursor)
            }
            other => other,
        }
    }

    fn finish(&self, session: &Session, result: &SyncResult<CycleReport>) {
        let collection = session.collection;
        let mut status = session.status.write();
        status.state = SyncState::Idle;

        match result {
            Ok(report) => {
                status.consecutive_failures = 0;
                status.last_error = None;
                status.cycles_completed += 1;
                status.records_applied += report.applied.total();
                status.last_success = Some(SystemTime::now());

                if report.advanced() {
                    info!(
                        %collection,
                        from = report.previous_cursor,
                        to = report.cursor,
                        fetched = report.fetched,
                        inserted = report.applied.inserted,
                        updated = report.applied.updated,
                        deleted = report.applied.marked_deleted,
                        "cursor advanced"
                    );
                }
            }
            Err(SyncError::Cancelled) => {
                info!(%collection, "sync cycle cancelled");
            }
            Err(e) => {
                status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                status.last_error = Some(e.to_string());

                let failures = status.consecutive_failures;
                if failures >= self.config.failure_alert_threshold {
                    error!(%collection, failures, error = %e, "sync keeps failing");
                } else {
                    warn!(%collection, failures, error = %e, "sync cycle failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::MirrorApplier;
    use crate::error::RecordApplyError;
    use crate::transport::MockFetchClient;
    use rollsync_model::{Format, RecordKey, Resource};
    use rollsync_store::{MemoryCursorStore, MemoryMirrorStore, MirrorStore};

    type TestOrchestrator =
        SyncOrchestrator<MockFetchClient, MemoryCursorStore, MirrorApplier<MemoryMirrorStore>>;

    fn resource(id: &str, ts: i64) -> RemoteRecord {
        RemoteRecord::Resource(Resource {
            resource_id: id.into(),
            format: Format::Article,
            kind: "post".into(),
            title: id.into(),
            theme: None,
            subject: None,
            thumbnail_location: None,
            length: None,
            publication_date: None,
            deleted: false,
            ts,
        })
    }

    fn orchestrator() -> TestOrchestrator {
        SyncOrchestrator::new(
            SyncConfig::default(),
            MockFetchClient::new(),
            MemoryCursorStore::new(),
            MirrorApplier::new(MemoryMirrorStore::new()),
        )
    }

    #[test]
    fn next_cursor_uses_last_record() {
        assert_eq!(next_cursor(5, &[]).unwrap(), 5);
        assert_eq!(
            next_cursor(5, &[resource("a", 7), resource("b", 9)]).unwrap(),
            9
        );
        assert_eq!(next_cursor(9, &[resource("a", 9)]).unwrap(), 9);
        assert!(matches!(
            next_cursor(10, &[resource("a", 12), resource("b", 8)]),
            Err(SyncError::Protocol(_))
        ));
    }

    #[test]
    fn successful_cycle_advances_cursor() {
        let orch = orchestrator();
        orch.fetcher()
            .push_batch(Collection::Resources, vec![resource("a", 3), resource("b", 4)]);

        let report = orch.run_cycle(Collection::Resources).unwrap();
        assert_eq!(report.cursor, 4);
        assert_eq!(report.applied.inserted, 2);
        assert_eq!(orch.cursor(Collection::Resources).unwrap(), 4);

        let status = orch.status(Collection::Resources);
        assert_eq!(status.state, SyncState::Idle);
        assert_eq!(status.cycles_completed, 1);
        assert!(status.last_success.is_some());
    }

    #[test]
    fn empty_batch_is_noop_success() {
        let orch = orchestrator();
        orch.cursors().set(Collection::Resources, 50).unwrap();

        let report = orch.run_cycle(Collection::Resources).unwrap();
        assert!(!report.advanced());
        assert_eq!(orch.cursor(Collection::Resources).unwrap(), 50);
        assert_eq!(orch.fetcher().calls(), vec![(Collection::Resources, 50)]);
    }

    #[test]
    fn auth_failure_refreshes_once_then_retries() {
        let orch = orchestrator();
        orch.fetcher()
            .push_error(Collection::Resources, SyncError::Auth("expired".into()));
        orch.fetcher()
            .push_batch(Collection::Resources, vec![resource("a", 1)]);

        orch.run_cycle(Collection::Resources).unwrap();
        assert_eq!(orch.fetcher().credential_refreshes(), 1);
        assert_eq!(orch.cursor(Collection::Resources).unwrap(), 1);
    }

    #[test]
    fn second_auth_failure_aborts() {
        let orch = orchestrator();
        for _ in 0..2 {
            orch.fetcher()
                .push_error(Collection::Resources, SyncError::Auth("revoked".into()));
        }

        let err = orch.run_cycle(Collection::Resources).unwrap_err();
        assert!(matches!(err, SyncError::Auth(_)));
        assert_eq!(orch.fetcher().credential_refreshes(), 1);
        assert_eq!(orch.cursor(Collection::Resources).unwrap(), 0);
    }

    #[test]
    fn failures_are_counted_and_reset() {
        let orch = orchestrator();
        for _ in 0..3 {
            orch.fetcher().push_error(
                Collection::ActivityEvents,
                SyncError::TransientFetch("timeout".into()),
            );
            assert!(orch.run_cycle(Collection::ActivityEvents).is_err());
        }

        let status = orch.status(Collection::ActivityEvents);
        assert_eq!(status.consecutive_failures, 3);
        assert!(status.last_error.unwrap().contains("timeout"));
        // The other collection is untouched.
        assert_eq!(orch.status(Collection::Resources).consecutive_failures, 0);

        orch.run_cycle(Collection::ActivityEvents).unwrap();
        let status = orch.status(Collection::ActivityEvents);
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.last_error.is_none());
    }

    #[test]
    fn protocol_breach_persists_nothing() {
        let orch = orchestrator();
        orch.cursors().set(Collection::Resources, 100).unwrap();
        orch.fetcher()
            .push_batch(Collection::Resources, vec![resource("a", 150), resource("b", 90)]);

        let err = orch.run_cycle(Collection::Resources).unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert_eq!(orch.cursor(Collection::Resources).unwrap(), 100);
        assert_eq!(
            orch.applier().mirror().len(Collection::Resources).unwrap(),
            0
        );
    }

    #[test]
    fn cancel_before_cycle_stops_it_and_is_consumed() {
        let orch = orchestrator();
        orch.fetcher()
            .push_batch(Collection::Resources, vec![resource("a", 1)]);

        orch.cancel(Collection::Resources);
        assert!(matches!(
            orch.run_cycle(Collection::Resources),
            Err(SyncError::Cancelled)
        ));
        assert!(orch.fetcher().calls().is_empty());
        assert_eq!(orch.status(Collection::Resources).consecutive_failures, 0);

        orch.run_cycle(Collection::Resources).unwrap();
        assert_eq!(orch.cursor(Collection::Resources).unwrap(), 1);
    }

    #[test]
    fn held_lock_reports_cycle_in_progress() {
        let orch = orchestrator();
        let _guard = orch.resources.running.lock();

        assert!(matches!(
            orch.run_cycle(Collection::Resources),
            Err(SyncError::CycleInProgress(Collection::Resources))
        ));
        // The other collection is not blocked.
        assert!(orch.run_cycle(Collection::ActivityEvents).is_ok());
    }

    struct RejectingApplier;

    impl Applier for RejectingApplier {
        fn apply(
            &self,
            record: &RemoteRecord,
        ) -> Result<crate::applier::ApplyResult, RecordApplyError> {
            Err(RecordApplyError::new(record.key(), "rejected"))
        }
    }

    #[test]
    fn apply_failure_keeps_cursor() {
        let orch = SyncOrchestrator::new(
            SyncConfig::default(),
            MockFetchClient::new(),
            MemoryCursorStore::new(),
            RejectingApplier,
        );
        orch.fetcher()
            .push_batch(Collection::Resources, vec![resource("a", 5)]);

        match orch.run_cycle(Collection::Resources).unwrap_err() {
            SyncError::RecordApply(e) => assert_eq!(e.key, RecordKey::Resource("a".into())),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(orch.cursor(Collection::Resources).unwrap(), 0);
    }

    #[test]
    fn run_all_syncs_both_collections() {
        let orch = orchestrator();
        orch.fetcher()
            .push_batch(Collection::Resources, vec![resource("a", 8)]);
        orch.fetcher().push_error(
            Collection::ActivityEvents,
            SyncError::TransientFetch("reset".into()),
        );

        let results = orch.run_all();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, Collection::Resources);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert_eq!(orch.cursor(Collection::Resources).unwrap(), 8);
    }
}
