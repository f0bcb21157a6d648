//! Journal-backed mirror store.
//!
//! Each collection is mirrored into one append-only JSON-lines file. Every
//! upsert appends a single line and syncs it before returning; the latest
//! line for a key wins.
//!
//! ## Recovery Policy
//!
//! - **Torn tail** (final line without a trailing newline): a crash mid-append.
//!   The partial line is discarded and truncated away on open.
//! - **Malformed complete line**: actual corruption. Open fails with
//!   [`StoreError::Corrupted`]; no heuristic repair is attempted.
//!
//! Replay is idempotent: replaying the same journal twice yields the same
//! index.
//!
//! A failed append is cut back to the last line boundary. If that cut fails
//! too, or a compaction fails after touching the file, the journal is
//! poisoned and refuses writes with [`StoreError::Poisoned`] until the store
//! is reopened.

use crate::dir::StateDir;
use crate::error::{StoreError, StoreResult};
use crate::mirror::MirrorStore;
use parking_lot::Mutex;
use rollsync_model::{Collection, RecordKey, RemoteRecord};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

fn journal_name(collection: Collection) -> String {
    format!("{}.jsonl", collection.name())
}

/// One collection's open journal and its in-memory index.
#[derive(Debug)]
struct Journal {
    name: String,
    file: File,
    len: u64,
    poisoned: bool,
    lines: u64,
    index: BTreeMap<RecordKey, RemoteRecord>,
}

impl Journal {
    fn open(dir: &StateDir, collection: Collection) -> StoreResult<Self> {
        let name = journal_name(collection);
        let data = dir.read_file(&name)?.unwrap_or_default();
        let (index, valid_len, lines) = replay(collection, &name, &data)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.file_path(&name))?;

        if valid_len < data.len() {
            warn!(
                journal = %name,
                discarded = data.len() - valid_len,
                "discarding torn journal tail"
            );
            file.set_len(valid_len as u64)?;
            file.sync_all()?;
        }

        Ok(Self {
            name,
            file,
            len: valid_len as u64,
            poisoned: false,
            lines,
            index,
        })
    }

    fn append(&mut self, record: &RemoteRecord) -> StoreResult<()> {
        if self.poisoned {
            return Err(StoreError::Poisoned(self.name.clone()));
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let written = self
            .file
            .seek(SeekFrom::Start(self.len))
            .and_then(|_| self.file.write_all(&line))
            .and_then(|()| self.file.sync_data());

        if let Err(e) = written {
            // Cut off whatever part of the line made it to disk.
            if let Err(cut) = self.file.set_len(self.len) {
                error!(
                    journal = %self.name,
                    error = %cut,
                    "failed to cut journal back, poisoning it"
                );
                self.poisoned = true;
            }
            return Err(e.into());
        }

        self.len += line.len() as u64;
        self.lines += 1;
        self.index.insert(record.key(), record.clone());
        Ok(())
    }
}

/// Replays a journal, returning the index, the length of the valid prefix
/// and the number of lines replayed.
fn replay(
    collection: Collection,
    name: &str,
    data: &[u8],
) -> StoreResult<(BTreeMap<RecordKey, RemoteRecord>, usize, u64)> {
    let mut index = BTreeMap::new();
    let mut offset = 0usize;
    let mut lines = 0u64;

    while offset < data.len() {
        let Some(end) = data[offset..].iter().position(|b| *b == b'\n') else {
            break;
        };
        let line = &data[offset..offset + end];
        lines += 1;

        if !line.is_empty() {
            let record: RemoteRecord = serde_json::from_slice(line)
                .map_err(|e| StoreError::Corrupted(format!("{name}:{lines}: {e}")))?;
            if record.collection() != collection {
                return Err(StoreError::Corrupted(format!(
                    "{name}:{lines}: record belongs to {}",
                    record.collection()
                )));
            }
            index.insert(record.key(), record);
        }

        offset += end + 1;
    }

    Ok((index, offset, lines))
}

/// A mirror store persisted as one journal per collection.
///
/// The two collections have independent locks, so resources and activity
/// events can be applied concurrently.
///
/// # Example
///
/// ```no_run
/// use rollsync_store::{FileMirrorStore, MirrorStore};
/// use rollsync_model::Collection;
/// use std::path::Path;
///
/// let store = FileMirrorStore::open(Path::new("state")).unwrap();
/// println!("{} resources", store.len(Collection::Resources).unwrap());
/// ```
#[derive(Debug)]
pub struct FileMirrorStore {
    dir: Arc<StateDir>,
    resources: Mutex<Journal>,
    activity_events: Mutex<Journal>,
}

impl FileMirrorStore {
    /// Opens (creating if needed) a state directory and replays its journals.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::new(Arc::new(StateDir::open(path, true)?))
    }

    /// Replays the journals of an already opened state directory.
    pub fn new(dir: Arc<StateDir>) -> StoreResult<Self> {
        let resources = Journal::open(&dir, Collection::Resources)?;
        let activity_events = Journal::open(&dir, Collection::ActivityEvents)?;
        debug!(
            resources = resources.index.len(),
            activity_events = activity_events.index.len(),
            "mirror journals replayed"
        );

        Ok(Self {
            dir,
            resources: Mutex::new(resources),
            activity_events: Mutex::new(activity_events),
        })
    }

    fn journal(&self, collection: Collection) -> &Mutex<Journal> {
        match collection {
            Collection::Resources => &self.resources,
            Collection::ActivityEvents => &self.activity_events,
        }
    }

    /// Returns the number of lines in a collection's journal.
    ///
    /// The gap between this and [`MirrorStore::len`] is what
    /// [`compact`](Self::compact) reclaims.
    pub fn journal_lines(&self, collection: Collection) -> u64 {
        self.journal(collection).lock().lines
    }

    /// Rewrites a collection's journal with one line per key.
    pub fn compact(&self, collection: Collection) -> StoreResult<()> {
        let mut journal = self.journal(collection).lock();
        if journal.poisoned {
            return Err(StoreError::Poisoned(journal.name.clone()));
        }

        let mut data = Vec::new();
        for record in journal.index.values() {
            serde_json::to_writer(&mut data, record)?;
            data.push(b'\n');
        }

        // The rename may already have happened when this fails, leaving the
        // old handle on an unlinked file.
        let file = match self.dir.replace_file(&journal.name, &data) {
            Ok(file) => file,
            Err(e) => {
                error!(
                    journal = %journal.name,
                    error = %e,
                    "compaction failed, poisoning journal"
                );
                journal.poisoned = true;
                return Err(e);
            }
        };

        journal.file = file;
        journal.len = data.len() as u64;
        journal.lines = journal.index.len() as u64;

        debug!(journal = %journal.name, records = journal.lines, "journal compacted");
        Ok(())
    }
}

impl MirrorStore for FileMirrorStore {
    fn get(&self, key: &RecordKey) -> StoreResult<Option<RemoteRecord>> {
        Ok(self.journal(key.collection()).lock().index.get(key).cloned())
    }

    fn put(&self, record: &RemoteRecord) -> StoreResult<()> {
        self.journal(record.collection()).lock().append(record)
    }

    fn records(&self, collection: Collection) -> StoreResult<Vec<RemoteRecord>> {
        Ok(self
            .journal(collection)
            .lock()
            .index
            .values()
            .cloned()
            .collect())
    }

    fn len(&self, collection: Collection) -> StoreResult<usize> {
        Ok(self.journal(collection).lock().index.len())
    }
}
