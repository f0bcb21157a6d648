//! Compact command implementation.

use rollsync_model::Collection;
use rollsync_store::{FileMirrorStore, MirrorStore};
use std::path::Path;
use tracing::info;

/// Journal size of one collection before and after compaction.
#[derive(Debug, PartialEq, Eq)]
pub struct CompactStats {
    /// Collection compacted.
    pub collection: Collection,
    /// Journal lines before.
    pub lines_before: u64,
    /// Journal lines after (one per record).
    pub lines_after: u64,
}

/// Compacts the journals of `collections`, or only measures them on a dry
/// run.
pub fn compact(
    mirror: &FileMirrorStore,
    collections: &[Collection],
    dry_run: bool,
) -> Result<Vec<CompactStats>, Box<dyn std::error::Error>> {
    let mut stats = Vec::with_capacity(collections.len());
    for &collection in collections {
        let lines_before = mirror.journal_lines(collection);
        let lines_after = mirror.len(collection)? as u64;
        if !dry_run && lines_before != lines_after {
            mirror.compact(collection)?;
            info!(%collection, lines_before, lines_after, "journal compacted");
        }
        stats.push(CompactStats {
            collection,
            lines_before,
            lines_after,
        });
    }
    Ok(stats)
}

/// Runs the compact command.
pub fn run(
    path: &Path,
    collection: Option<&str>,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let collections = match collection {
        Some(name) => vec![name.parse::<Collection>()?],
        None => Collection::ALL.to_vec(),
    };
    let (_cursors, mirror) = super::open_stores(path, false)?;

    println!("Compacting journals at {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    for stat in compact(&mirror, &collections, dry_run)? {
        println!(
            "  {:<16} {} lines -> {} lines",
            stat.collection.to_string(),
            stat.lines_before,
            stat.lines_after
        );
    }

    Ok(())
}
