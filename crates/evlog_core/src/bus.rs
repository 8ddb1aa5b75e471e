//! The event bus: producers add events, channels consume them.
//!
//! `EventBus` composes the segment store and the marker store and holds
//! the log lock across each composite operation, so a `list` never sees
//! a segment mid-rotation and a `mark` captures a hash consistent with
//! the segment it validated.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::lock::LockMode;
use crate::marker::{Marker, MarkerStore};
use crate::segment::{parse_name, FileStatus, SegmentStore};
use crate::types::{Entry, Position};
use chrono::Utc;
use evlog_codec::Event;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Handle to a file-based event log shared by any number of processes.
///
/// The storage directory is passed in explicitly; resolving a default
/// location is left to the caller.
///
/// # Example
///
/// ```rust,ignore
/// use evlog_core::{Config, EventBus};
/// use serde_json::json;
///
/// let bus = EventBus::open(Path::new("/var/lib/mail/events"), Config::default())?;
/// bus.add("email.received", "inbox", json!({"from": "a@b.com"}))?;
///
/// let entries = bus.list("reader", 0)?;
/// if let Some(last) = entries.last() {
///     bus.mark("reader", &last.position)?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    segments: SegmentStore,
    markers: MarkerStore,
}

impl EventBus {
    /// Opens or creates the event log at `path`.
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        let segments = SegmentStore::open(path, config)?;
        let markers = MarkerStore::new(segments.clone());
        Ok(Self { segments, markers })
    }

    /// Returns the log directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.segments.dir().path()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        self.segments.config()
    }

    /// Returns the segment store.
    #[must_use]
    pub fn segments(&self) -> &SegmentStore {
        &self.segments
    }

    /// Returns the marker store.
    #[must_use]
    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    /// Records a new event.
    ///
    /// Either the whole record is committed or, on error, nothing is
    /// visible to later readers.
    pub fn add(
        &self,
        event_type: &str,
        channel: &str,
        payload: serde_json::Value,
    ) -> CoreResult<Event> {
        let event = Event::new(event_type, channel, payload);
        self.segments.append(&event)?;
        Ok(event)
    }

    /// Returns the events `channel` has not consumed yet, oldest first.
    ///
    /// A channel without a marker starts at the first segment. At most
    /// `limit` entries are returned; `0` means no limit. Every call
    /// decompresses the segments it walks.
    ///
    /// # Errors
    ///
    /// Returns `StaleMarker` if the channel's segment was replaced since
    /// it was marked and `NotFound` if that segment is gone.
    pub fn list(&self, channel: &str, limit: usize) -> CoreResult<Vec<Entry>> {
        self.segments
            .mutex()
            .with_lock(LockMode::Shared, || self.list_unlocked(channel, limit))
    }

    fn list_unlocked(&self, channel: &str, limit: usize) -> CoreResult<Vec<Entry>> {
        let start = match self.markers.load_unlocked(channel) {
            Ok(marker) => {
                self.markers.validate_unlocked(&marker)?;
                Some((parse_name(&marker.file)?, marker.offset))
            }
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        let names = self.segments.names_unlocked()?;
        let (first, mut offset) = match start {
            None => (0, 0),
            Some((name, offset)) => {
                let index = names
                    .iter()
                    .position(|&n| n == name)
                    .ok_or_else(|| CoreError::segment_not_found(name.file_name()))?;
                (index, offset)
            }
        };

        let mut entries = Vec::new();
        for &name in &names[first..] {
            let mut batch = self.segments.read_from_unlocked(name, offset)?;
            offset = 0;

            if limit > 0 {
                batch.truncate(limit - entries.len());
            }
            entries.extend(batch);

            if limit > 0 && entries.len() >= limit {
                break;
            }
        }

        debug!(channel, count = entries.len(), "listed entries");
        Ok(entries)
    }

    /// Records that `channel` has consumed everything up to `position`.
    ///
    /// The segment's first-line hash is captured now, never carried over
    /// from an older marker. Marking the same position twice leaves the
    /// stored marker untouched.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the segment does not exist and
    /// `InvalidPosition` if the offset lies past its end or does not fall
    /// on a record boundary.
    pub fn mark(&self, channel: &str, position: &Position) -> CoreResult<Marker> {
        self.segments
            .mutex()
            .with_lock(LockMode::Exclusive, || self.mark_unlocked(channel, position))
    }

    fn mark_unlocked(&self, channel: &str, position: &Position) -> CoreResult<Marker> {
        let name = parse_name(&position.segment)?;
        let status = self.segments.status_unlocked(Some(name))?;

        if position.offset > status.uncompressed_size
            || !self
                .segments
                .is_record_boundary_unlocked(name, position.offset)?
        {
            return Err(CoreError::InvalidPosition {
                segment: status.name,
                offset: position.offset,
                size: status.uncompressed_size,
            });
        }

        let marker = Marker {
            channel: channel.to_string(),
            file: status.name,
            first_line_hash: status.first_line_hash,
            offset: position.offset,
            updated_at: Utc::now(),
        };

        match self.markers.load_unlocked(channel) {
            Ok(existing) if existing.same_position(&marker) => return Ok(existing),
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            // An unreadable marker is replaced by the new one.
            Err(CoreError::InvalidFormat { .. }) => {}
            Err(e) => return Err(e),
        }

        self.markers.save_unlocked(channel, &marker)?;
        Ok(marker)
    }

    /// Returns the marker of `channel`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the channel has never been marked.
    pub fn marker(&self, channel: &str) -> CoreResult<Marker> {
        self.markers.load(channel)
    }

    /// Reports on one segment, or on the latest when `segment` is `None`.
    pub fn status(&self, segment: Option<&str>) -> CoreResult<FileStatus> {
        self.segments.status(segment)
    }

    /// Returns all segment file names, oldest first.
    pub fn list_files(&self) -> CoreResult<Vec<String>> {
        self.segments.list_files()
    }

    /// Returns the names of all channels that have a marker.
    pub fn list_channels(&self) -> CoreResult<BTreeSet<String>> {
        self.markers.list_channels()
    }
}
