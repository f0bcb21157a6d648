//! # rollsync model
//!
//! Record types exchanged with the learning-platform Export API.
//!
//! This crate provides:
//! - [`Collection`] - the two mirrored collections and their endpoints
//! - [`Resource`] and [`ActivityEvent`] - the wire records
//! - [`RemoteRecord`] - a record of either collection
//! - [`RecordKey`] - the natural key used for idempotent upserts
//! - [`Format`] - an open enumeration of resource formats
//!
//! ## Ordering
//!
//! Every record carries an ordering key (`ts` for resources, `_ts` for
//! activity events) in Unix epoch seconds. The API returns each batch sorted
//! ascending by that key.
//!
//! ## Example
//!
//! ```rust
//! use rollsync_model::{decode_batch, Collection};
//!
//! let body = br#"[{"resourceId":"a","format":"Video","type":"lecture","title":"Intro","ts":10}]"#;
//! let records = decode_batch(Collection::Resources, body).unwrap();
//! assert_eq!(records[0].ordering_key(), 10);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod error;
mod format;
mod key;
mod record;

pub use collection::Collection;
pub use error::{ModelError, ModelResult};
pub use format::Format;
pub use key::RecordKey;
pub use record::{decode_batch, ActivityEvent, RemoteRecord, Resource, Scalar};
