//! Mirrored collections.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A remote collection mirrored by the client.
///
/// Each collection has its own cursor and its own local keyspace, so the two
/// never contend with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Collection {
    /// Learning resources (`GET /GetResources`).
    #[serde(rename = "resources")]
    Resources,
    /// User activity events (`GET /GetUserActivityEvents`).
    #[serde(rename = "activityEvents")]
    ActivityEvents,
}

impl Collection {
    /// Both collections, in a fixed order.
    pub const ALL: [Collection; 2] = [Collection::Resources, Collection::ActivityEvents];

    /// Returns the persisted name of the collection.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Resources => "resources",
            Collection::ActivityEvents => "activityEvents",
        }
    }

    /// Returns the Export API path serving this collection.
    #[must_use]
    pub fn endpoint(&self) -> &'static str {
        match self {
            Collection::Resources => "/GetResources",
            Collection::ActivityEvents => "/GetUserActivityEvents",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resources" => Ok(Collection::Resources),
            "activityEvents" | "activity-events" | "events" => Ok(Collection::ActivityEvents),
            other => Err(ModelError::UnknownCollection(other.to_string())),
        }
    }
}
