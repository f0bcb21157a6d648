//! Status command implementation.

use rollsync_model::Collection;
use rollsync_store::{CursorStore, FileCursorStore, FileMirrorStore, MirrorStore};
use serde::Serialize;
use std::path::Path;

/// Persisted state of one collection.
#[derive(Debug, Serialize)]
pub struct CollectionReport {
    /// Collection name.
    pub collection: Collection,
    /// Last applied timestamp.
    pub cursor: i64,
    /// Mirrored records, deleted ones included.
    pub records: usize,
    /// Resources marked deleted.
    pub deleted: usize,
    /// Lines in the journal.
    pub journal_lines: u64,
}

/// Reads the report of every collection.
pub fn gather(
    cursors: &FileCursorStore,
    mirror: &FileMirrorStore,
) -> Result<Vec<CollectionReport>, Box<dyn std::error::Error>> {
    let mut reports = Vec::with_capacity(Collection::ALL.len());
    for collection in Collection::ALL {
        let records = mirror.records(collection)?;
        reports.push(CollectionReport {
            collection,
            cursor: cursors.get(collection)?,
            records: records.len(),
            deleted: records.iter().filter(|r| r.is_deleted()).count(),
            journal_lines: mirror.journal_lines(collection),
        });
    }
    Ok(reports)
}

/// Runs the status command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (cursors, mirror) = super::open_stores(path, false)?;
    let reports = gather(&cursors, &mirror)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        _ => {
            println!("State directory: {}", path.display());
            println!();
            for report in &reports {
                println!("{}:", report.collection);
                println!("  Cursor:        {}", report.cursor);
                println!("  Records:       {}", report.records);
                println!("  Deleted:       {}", report.deleted);
                println!("  Journal lines: {}", report.journal_lines);
            }
        }
    }

    Ok(())
}
