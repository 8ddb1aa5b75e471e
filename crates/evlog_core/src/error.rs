//! Error types for evlog core.

use evlog_codec::CodecError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// The kind of object a [`CoreError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    /// A segment file.
    Segment,
    /// A channel marker.
    Marker,
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Segment => f.write_str("segment"),
            Self::Marker => f.write_str("marker"),
        }
    }
}

/// Errors that can occur in evlog core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Record codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The log lock could not be acquired within the retry budget.
    #[error("lock timeout: could not lock {} after {attempts} attempts", path.display())]
    LockTimeout {
        /// Path of the lock file.
        path: PathBuf,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A segment or marker does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was looked up.
        kind: NotFoundKind,
        /// Segment file name or channel name.
        name: String,
    },

    /// A marker refers to a segment whose first line has changed.
    #[error(
        "stale marker for channel {channel}: segment {segment} hash is {actual}, marker recorded {expected}"
    )]
    StaleMarker {
        /// Channel owning the marker.
        channel: String,
        /// Segment file the marker points at.
        segment: String,
        /// First-line hash stored in the marker.
        expected: String,
        /// First-line hash the segment has now.
        actual: String,
    },

    /// Segment data disagrees with its metadata.
    #[error("segment corruption: {message}")]
    SegmentCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A metadata, pointer or marker file could not be parsed.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Channel name cannot be used.
    #[error("invalid channel name: {name:?}")]
    InvalidChannel {
        /// The rejected channel name.
        name: String,
    },

    /// Position lies beyond the end of its segment or inside a record.
    #[error("invalid position: offset {offset} of {segment} ({size} bytes) does not end a record")]
    InvalidPosition {
        /// Segment file name.
        segment: String,
        /// Requested offset.
        offset: u64,
        /// Uncompressed segment size.
        size: u64,
    },
}

impl CoreError {
    /// Creates a segment-not-found error.
    pub fn segment_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: NotFoundKind::Segment,
            name: name.into(),
        }
    }

    /// Creates a marker-not-found error.
    pub fn marker_not_found(channel: impl Into<String>) -> Self {
        Self::NotFound {
            kind: NotFoundKind::Marker,
            name: channel.into(),
        }
    }

    /// Creates a segment corruption error.
    pub fn segment_corruption(message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Returns true for [`CoreError::NotFound`].
    ///
    /// Callers use this to default to "start from the earliest segment"
    /// on a channel's first use.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for [`CoreError::StaleMarker`].
    #[must_use]
    pub fn is_stale_marker(&self) -> bool {
        matches!(self, Self::StaleMarker { .. })
    }

    /// Returns true for [`CoreError::LockTimeout`].
    #[must_use]
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// Returns true if this wraps a malformed record error.
    #[must_use]
    pub fn is_malformed_record(&self) -> bool {
        matches!(self, Self::Codec(e) if e.is_malformed())
    }
}
