//! Record builders and state fixtures.

use rollsync_engine::{FetchClient, MirrorApplier, SyncConfig, SyncOrchestrator};
use rollsync_model::{ActivityEvent, Format, RemoteRecord, Resource, Scalar};
use rollsync_store::{
    FileCursorStore, FileMirrorStore, MemoryCursorStore, MemoryMirrorStore, StateDir,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Builds a live resource.
pub fn resource(id: &str, ts: i64) -> RemoteRecord {
    RemoteRecord::Resource(Resource {
        resource_id: id.to_string(),
        format: Format::Video,
        kind: "lecture".to_string(),
        title: format!("Resource {id}"),
        theme: Some("Engineering".to_string()),
        subject: None,
        thumbnail_location: None,
        length: Some(Scalar::Int(600)),
        publication_date: None,
        deleted: false,
        ts,
    })
}

/// Builds a resource tombstone.
pub fn deleted_resource(id: &str, ts: i64) -> RemoteRecord {
    match resource(id, ts) {
        RemoteRecord::Resource(mut r) => {
            r.deleted = true;
            RemoteRecord::Resource(r)
        }
        other => other,
    }
}

/// Builds an activity event.
pub fn event(username: &str, resource_id: &str, event_time: i64, ts: i64) -> RemoteRecord {
    RemoteRecord::ActivityEvent(ActivityEvent {
        event_time: Scalar::Int(event_time),
        username: username.to_string(),
        resource_id: resource_id.to_string(),
        format: Format::Course,
        length: None,
        duration: 300,
        title: format!("Resource {resource_id}"),
        theme: None,
        subject: None,
        kind: "module".to_string(),
        ts,
    })
}

/// Orchestrator over in-memory stores.
pub type MemoryOrchestrator<F> =
    SyncOrchestrator<F, MemoryCursorStore, MirrorApplier<MemoryMirrorStore>>;

/// Builds an orchestrator over fresh in-memory stores.
pub fn memory_orchestrator<F: FetchClient>(fetcher: F) -> MemoryOrchestrator<F> {
    SyncOrchestrator::new(
        SyncConfig::default(),
        fetcher,
        MemoryCursorStore::new(),
        MirrorApplier::new(MemoryMirrorStore::new()),
    )
}

/// File-backed cursor and mirror stores in a temporary directory.
pub struct TestState {
    /// Cursor store.
    pub cursors: Arc<FileCursorStore>,
    /// Mirror store.
    pub mirror: Arc<FileMirrorStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestState {
    /// Opens empty stores in a new temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (cursors, mirror) = open_stores(temp_dir.path());
        Self {
            cursors,
            mirror,
            temp_dir,
        }
    }

    /// Returns the state directory path.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Closes and reopens the stores, as a process restart would.
    pub fn reopen(self) -> Self {
        let Self {
            cursors,
            mirror,
            temp_dir,
        } = self;
        drop(cursors);
        drop(mirror);
        let (cursors, mirror) = open_stores(temp_dir.path());
        Self {
            cursors,
            mirror,
            temp_dir,
        }
    }
}

impl Default for TestState {
    fn default() -> Self {
        Self::new()
    }
}

fn open_stores(path: &Path) -> (Arc<FileCursorStore>, Arc<FileMirrorStore>) {
    let dir = Arc::new(StateDir::open(path, true).expect("Failed to open state directory"));
    let cursors = FileCursorStore::new(Arc::clone(&dir)).expect("Failed to open cursor store");
    let mirror = FileMirrorStore::new(dir).expect("Failed to open mirror store");
    (Arc::new(cursors), Arc::new(mirror))
}
