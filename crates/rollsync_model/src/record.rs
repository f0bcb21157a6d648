//! Wire records returned by the Export API.

use crate::collection::Collection;
use crate::error::{ModelError, ModelResult};
use crate::format::Format;
use crate::key::RecordKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A loosely typed scalar field.
///
/// Some fields (`length`, `publicationDate`, `eventTime`) are sent either as
/// numbers or as strings depending on the producing system. Any JSON number
/// is accepted; integers that fit an `i64` land in [`Scalar::Int`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// An integer value.
    Int(i64),
    /// Any other number: fractional, or an integer beyond `i64`.
    Number(serde_json::Number),
    /// A textual value.
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(value) => write!(f, "{value}"),
            Scalar::Number(value) => write!(f, "{value}"),
            Scalar::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

/// A learning resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Unique resource identifier.
    pub resource_id: String,
    /// Resource format.
    pub format: Format,
    /// Sub-type within the format.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Theme, if classified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    /// Subject, if classified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Thumbnail URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_location: Option<String>,
    /// Duration of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<Scalar>,
    /// Publication date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<Scalar>,
    /// Whether the resource was deleted upstream.
    #[serde(default)]
    pub deleted: bool,
    /// Sync timestamp (ordering key).
    pub ts: i64,
}

/// A user activity event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// When the activity happened.
    pub event_time: Scalar,
    /// User that produced the event.
    pub username: String,
    /// Resource the event refers to. Advisory only: the resource may not
    /// have been mirrored yet.
    pub resource_id: String,
    /// Format of the referenced resource.
    pub format: Format,
    /// Length of the referenced resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<Scalar>,
    /// Time spent, in seconds.
    pub duration: i64,
    /// Title of the referenced resource.
    #[serde(default)]
    pub title: String,
    /// Theme of the referenced resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    /// Subject of the referenced resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Sub-type of the referenced resource.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Sync timestamp (ordering key).
    #[serde(rename = "_ts")]
    pub ts: i64,
}

/// A record of either mirrored collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", content = "body", rename_all = "camelCase")]
pub enum RemoteRecord {
    /// A learning resource.
    Resource(Resource),
    /// A user activity event.
    ActivityEvent(ActivityEvent),
}

impl RemoteRecord {
    /// Returns the collection the record belongs to.
    #[must_use]
    pub fn collection(&self) -> Collection {
        match self {
            RemoteRecord::Resource(_) => Collection::Resources,
            RemoteRecord::ActivityEvent(_) => Collection::ActivityEvents,
        }
    }

    /// Returns the ordering key (`ts` or `_ts`).
    #[must_use]
    pub fn ordering_key(&self) -> i64 {
        match self {
            RemoteRecord::Resource(r) => r.ts,
            RemoteRecord::ActivityEvent(e) => e.ts,
        }
    }

    /// Returns the natural key.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        match self {
            RemoteRecord::Resource(r) => RecordKey::Resource(r.resource_id.clone()),
            RemoteRecord::ActivityEvent(e) => RecordKey::ActivityEvent {
                event_time: e.event_time.to_string(),
                username: e.username.clone(),
                resource_id: e.resource_id.clone(),
            },
        }
    }

    /// Returns true for a resource flagged as deleted upstream.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        matches!(self, RemoteRecord::Resource(r) if r.deleted)
    }

    /// Returns the record's format.
    #[must_use]
    pub fn format(&self) -> &Format {
        match self {
            RemoteRecord::Resource(r) => &r.format,
            RemoteRecord::ActivityEvent(e) => &e.format,
        }
    }
}

impl From<Resource> for RemoteRecord {
    fn from(resource: Resource) -> Self {
        RemoteRecord::Resource(resource)
    }
}

impl From<ActivityEvent> for RemoteRecord {
    fn from(event: ActivityEvent) -> Self {
        RemoteRecord::ActivityEvent(event)
    }
}

/// Decodes a response body (a JSON array) into records of `collection`.
///
/// # Errors
///
/// Returns [`ModelError::Decode`] if the body is not an array of records of
/// the expected shape.
pub fn decode_batch(collection: Collection, body: &[u8]) -> ModelResult<Vec<RemoteRecord>> {
    let decoded = match collection {
        Collection::Resources => serde_json::from_slice::<Vec<Resource>>(body)
            .map(|records| records.into_iter().map(RemoteRecord::Resource).collect()),
        Collection::ActivityEvents => serde_json::from_slice::<Vec<ActivityEvent>>(body)
            .map(|records| records.into_iter().map(RemoteRecord::ActivityEvent).collect()),
    };
    decoded.map_err(|source| ModelError::Decode { collection, source })
}
