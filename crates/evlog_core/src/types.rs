//! Core type definitions for evlog.

use evlog_codec::Event;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A consumer position inside one segment.
///
/// `offset` counts bytes of the segment's decompressed stream and always
/// sits at the end of a complete line. Positions are only meaningful
/// relative to the segment they name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Segment file name, e.g. `events.000001.jsonl.zst`.
    pub segment: String,
    /// Byte offset just past a line in the decompressed stream.
    pub offset: u64,
}

impl Position {
    /// Creates a new position.
    pub fn new(segment: impl Into<String>, offset: u64) -> Self {
        Self {
            segment: segment.into(),
            offset,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.segment, self.offset)
    }
}

/// An event read from the log together with the position just after it.
///
/// Marking a channel at `position` consumes this entry and everything
/// before it.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// The decoded event.
    pub event: Event,
    /// Position just past the event's line.
    pub position: Position,
}
