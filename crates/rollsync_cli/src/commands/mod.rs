//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod status;
pub mod sync;

use rollsync_store::{FileCursorStore, FileMirrorStore, StateDir};
use std::path::Path;
use std::sync::Arc;

/// Opens both stores of a state directory under one lock.
pub fn open_stores(
    path: &Path,
    create_if_missing: bool,
) -> Result<(FileCursorStore, FileMirrorStore), Box<dyn std::error::Error>> {
    let dir = Arc::new(StateDir::open(path, create_if_missing)?);
    let cursors = FileCursorStore::new(Arc::clone(&dir))?;
    let mirror = FileMirrorStore::new(dir)?;
    Ok((cursors, mirror))
}
