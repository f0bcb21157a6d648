//! # rollsync store
//!
//! Local persistence for the rollsync client.
//!
//! This crate provides the two pieces of local state a sync client owns:
//!
//! - [`CursorStore`] - the last applied timestamp per collection
//! - [`MirrorStore`] - the mirrored records, keyed by natural key
//!
//! ## Available Backends
//!
//! - [`MemoryCursorStore`] / [`MemoryMirrorStore`] - for tests and ephemeral use
//! - [`FileCursorStore`] - `cursors.json`, replaced atomically on every write
//! - [`FileMirrorStore`] - one append-only JSON-lines journal per collection
//!
//! Both file backends live in a [`StateDir`], which holds an exclusive
//! advisory lock so only one process mirrors into a directory at a time.
//!
//! ## Durability
//!
//! - A cursor write is all-or-nothing: after a crash the previous or the new
//!   value is observed, never a torn or regressed one.
//! - A mirror upsert is all-or-nothing per record: a torn trailing journal
//!   line is discarded on replay.
//!
//! ## Example
//!
//! ```rust
//! use rollsync_model::Collection;
//! use rollsync_store::{CursorStore, MemoryCursorStore};
//!
//! let cursors = MemoryCursorStore::new();
//! assert_eq!(cursors.get(Collection::Resources).unwrap(), 0);
//! cursors.set(Collection::Resources, 1727890123).unwrap();
//! assert_eq!(cursors.get(Collection::Resources).unwrap(), 1727890123);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod dir;
mod error;
mod journal;
mod mirror;

pub use cursor::{CursorStore, FileCursorStore, MemoryCursorStore};
pub use dir::StateDir;
pub use error::{StoreError, StoreResult};
pub use journal::FileMirrorStore;
pub use mirror::{MemoryMirrorStore, MirrorStore};
