//! Event record and identifier types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique, time-ordered identifier for an event.
///
/// Generated identifiers are UUIDv7 strings: a 48-bit millisecond
/// timestamp prefix followed by random bits. Their lexicographic order
/// follows creation time, although clock skew between producers can
/// break strict monotonicity.
///
/// Identifiers read back from a log are kept verbatim, so events written
/// by other producers may carry any non-empty string.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Generates a fresh identifier for the current instant.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an existing identifier string.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<EventId> for String {
    fn from(id: EventId) -> Self {
        id.0
    }
}

/// An immutable fact recorded in the log.
///
/// Field order here is the serialized field order, which keeps encoded
/// lines stable enough to hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Time-ordered unique identifier.
    pub id: EventId,
    /// Creation time (serialized as RFC 3339, UTC).
    pub timestamp: DateTime<Utc>,
    /// Free-form type tag, e.g. `email.received`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Topic the event was published under. Informational only: the log
    /// is not partitioned by channel.
    pub channel: String,
    /// Opaque structured payload, stored verbatim.
    pub payload: serde_json::Value,
}

impl Event {
    /// Creates a new event stamped with a fresh id and the current time.
    pub fn new(
        event_type: impl Into<String>,
        channel: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: EventId::generate(),
            timestamp: Utc::now(),
            event_type: event_type.into(),
            channel: channel.into(),
            payload,
        }
    }
}
