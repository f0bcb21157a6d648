//! Natural keys for mirrored records.

use crate::collection::Collection;
use std::fmt;

/// The natural key of a mirrored record.
///
/// Upserts are keyed by this value, which makes re-delivery of the same
/// record a no-op.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKey {
    /// A resource, keyed by `resourceId`.
    Resource(String),
    /// An activity event, keyed by `(eventTime, username, resourceId)`.
    ActivityEvent {
        /// Rendered `eventTime`.
        event_time: String,
        /// User the event belongs to.
        username: String,
        /// Resource the event refers to.
        resource_id: String,
    },
}

impl RecordKey {
    /// Returns the collection this key belongs to.
    #[must_use]
    pub fn collection(&self) -> Collection {
        match self {
            RecordKey::Resource(_) => Collection::Resources,
            RecordKey::ActivityEvent { .. } => Collection::ActivityEvents,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Resource(id) => write!(f, "resource:{id}"),
            RecordKey::ActivityEvent {
                event_time,
                username,
                resource_id,
            } => write!(f, "event:{event_time}|{username}|{resource_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(RecordKey::Resource("a".into()).to_string(), "resource:a");
        let key = RecordKey::ActivityEvent {
            event_time: "1727890123".into(),
            username: "jdoe".into(),
            resource_id: "r1".into(),
        };
        assert_eq!(key.to_string(), "event:1727890123|jdoe|r1");
        assert_eq!(key.collection(), Collection::ActivityEvents);
    }
}
