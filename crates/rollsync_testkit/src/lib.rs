//! # rollsync testkit
//!
//! Test utilities for rollsync.
//!
//! This crate provides:
//! - Record builders and file-backed state fixtures
//! - Property-based test generators using proptest
//! - A scripted, in-process stand-in for the Export API
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rollsync_testkit::prelude::*;
//!
//! #[test]
//! fn syncs_new_resources() {
//!     let api = FakeExportApi::new();
//!     api.publish(resource("a", 10));
//!     let orch = memory_orchestrator(api);
//!     orch.run_cycle(Collection::Resources).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fake_api;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fake_api::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use rollsync_model::Collection;
}

pub use fake_api::*;
pub use fixtures::*;
pub use generators::*;
