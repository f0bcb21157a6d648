//! Dump command implementation.

use rollsync_model::{Collection, RemoteRecord};
use rollsync_store::{FileMirrorStore, MirrorStore};
use std::io::Write;
use std::path::Path;

/// Selects the records to print, in key order.
pub fn select(
    mirror: &FileMirrorStore,
    collection: Collection,
    include_deleted: bool,
    limit: Option<usize>,
) -> Result<Vec<RemoteRecord>, Box<dyn std::error::Error>> {
    Ok(mirror
        .records(collection)?
        .into_iter()
        .filter(|r| include_deleted || !r.is_deleted())
        .take(limit.unwrap_or(usize::MAX))
        .collect())
}

/// Encodes a record in the API's wire form.
pub fn to_json_line(record: &RemoteRecord) -> serde_json::Result<String> {
    match record {
        RemoteRecord::Resource(r) => serde_json::to_string(r),
        RemoteRecord::ActivityEvent(e) => serde_json::to_string(e),
    }
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    collection: &str,
    include_deleted: bool,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let collection: Collection = collection.parse()?;
    let (_cursors, mirror) = super::open_stores(path, false)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for record in select(&mirror, collection, include_deleted, limit)? {
        writeln!(out, "{}", to_json_line(&record)?)?;
    }

    Ok(())
}
