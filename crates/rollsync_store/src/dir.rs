//! State directory management.
//!
//! This module handles the file system layout for a mirror:
//!
//! ```text
//! <state_dir>/
//! ├─ LOCK                  # Advisory lock for single-writer
//! ├─ cursors.json          # Last applied timestamp per collection
//! ├─ resources.jsonl       # Resource journal
//! └─ activityEvents.jsonl  # Activity event journal
//! ```
//!
//! The LOCK file ensures only one process can mirror into the directory at a
//! time. Files that must never be observed half-written are replaced with a
//! write-then-rename.

use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const TEMP_SUFFIX: &str = ".tmp";

/// An exclusively locked state directory.
///
/// # Thread Safety
///
/// Only one `StateDir` can exist per directory across processes. Share it
/// between stores with an `Arc`.
#[derive(Debug)]
pub struct StateDir {
    path: PathBuf,
    _lock_file: File,
}

impl StateDir {
    /// Opens or creates a state directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `Locked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> StoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StoreError::MissingDirectory(path.to_path_buf()));
            }
        }

        if !path.is_dir() {
            return Err(StoreError::MissingDirectory(path.to_path_buf()));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of a file inside the directory.
    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Reads a file, returning `None` if it does not exist.
    pub fn read_file(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.file_path(name)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces a file atomically.
    ///
    /// 1. Write to `<name>.tmp`
    /// 2. Sync the temporary file to disk
    /// 3. Rename it over `<name>`
    /// 4. Fsync the directory so the rename itself is durable
    pub fn write_atomic(&self, name: &str, data: &[u8]) -> StoreResult<()> {
        self.replace_file(name, data).map(drop)
    }

    /// Replaces a file atomically and returns a read-write handle to the new
    /// content.
    ///
    /// The handle is opened before the rename, so it always refers to the
    /// file that now sits at `<name>`.
    pub fn replace_file(&self, name: &str, data: &[u8]) -> StoreResult<File> {
        let target = self.file_path(name);
        let temp = self.file_path(&format!("{name}{TEMP_SUFFIX}"));

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;

        fs::rename(&temp, &target)?;
        self.sync_directory()?;
        Ok(file)
    }

    /// Syncs the directory so created or renamed entries survive a crash.
    #[cfg(unix)]
    pub fn sync_directory(&self) -> StoreResult<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    /// Syncs the directory so created or renamed entries survive a crash.
    ///
    /// NTFS journals metadata, so there is nothing to do on Windows.
    #[cfg(not(unix))]
    pub fn sync_directory(&self) -> StoreResult<()> {
        Ok(())
    }
}
