//! # rollsync engine
//!
//! Rolling-window sync engine for the learning-platform Export API.
//!
//! This crate provides:
//! - Per-collection sync state machine (idle → fetching → applying → advancing)
//! - Cursor advancement with all-or-nothing semantics
//! - Idempotent application of records to a local mirror
//! - HTTP fetch client with bearer credentials
//! - Scheduling with exponential backoff
//!
//! ## Architecture
//!
//! Each collection is synced by a **rolling window**: the client asks for
//! every record newer than its cursor, applies the batch, then moves the
//! cursor to the ordering key of the batch's last record.
//!
//! 1. Read the cursor from the [`rollsync_store::CursorStore`]
//! 2. Fetch the batch through a [`FetchClient`]
//! 3. Apply every record through an [`Applier`]
//! 4. Persist the new cursor
//!
//! ## Key Invariants
//!
//! - The cursor never moves backwards
//! - The cursor only moves after every record of the batch applied
//! - Applying a record twice has the same effect as applying it once
//! - Deleted resources are flagged, never removed
//! - The two collections never block or fail each other

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod config;
mod credentials;
mod error;
mod http;
mod orchestrator;
mod scheduler;
mod state;
mod transport;

pub use applier::{validate_record, ApplyResult, Applier, MirrorApplier};
pub use config::{ConfigFile, RetryConfig, SyncConfig};
pub use credentials::{AccessToken, PasswordGrant, StaticToken, TokenProvider, TOKEN_PATH};
pub use error::{RecordApplyError, SyncError, SyncResult};
pub use http::{HttpClient, HttpFailure, HttpFetchClient, HttpResponse, ReqwestClient};
pub use orchestrator::{next_cursor, SyncOrchestrator};
pub use scheduler::{next_delay, SchedulerHandle, SyncScheduler};
pub use state::{ApplyCounts, CollectionStatus, CycleReport, SyncState};
pub use transport::{FetchClient, MockFetchClient};
