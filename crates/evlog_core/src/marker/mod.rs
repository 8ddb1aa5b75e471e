//! Consumer markers.
//!
//! A marker records how far one channel has consumed the log: a segment,
//! an offset in it, and the segment's first-line hash at the time of
//! marking. The hash is what ties the marker to a segment; a file name
//! alone does not survive replacement of the segment.
//!
//! Markers live in `markers/<escaped channel>.json`, one per channel,
//! last writer wins.

mod channel;

pub use channel::{channel_to_stem, marker_file_name, stem_to_channel};

use crate::dir::{is_temp_file, read_optional, write_atomic, LogDir};
use crate::error::{CoreError, CoreResult};
use crate::lock::LockMode;
use crate::segment::{parse_name, SegmentStore};
use crate::types::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persisted consumer state of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    /// Channel name, unescaped.
    #[serde(default)]
    pub channel: String,
    /// Segment file the position refers to.
    pub file: String,
    /// First-line hash of `file` when the marker was saved.
    pub first_line_hash: String,
    /// Offset just past the last consumed line.
    pub offset: u64,
    /// When the marker was saved.
    pub updated_at: DateTime<Utc>,
}

impl Marker {
    /// Returns the marked position.
    #[must_use]
    pub fn position(&self) -> Position {
        Position::new(self.file.clone(), self.offset)
    }

    /// Returns true if both markers point at the same consumed position
    /// of the same segment, ignoring the timestamp.
    #[must_use]
    pub fn same_position(&self, other: &Self) -> bool {
        self.file == other.file
            && self.first_line_hash == other.first_line_hash
            && self.offset == other.offset
    }
}

/// Persists per-channel markers and checks them against the segments.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    dir: LogDir,
    segments: SegmentStore,
}

impl MarkerStore {
    /// Creates a marker store over the same directory as `segments`.
    #[must_use]
    pub fn new(segments: SegmentStore) -> Self {
        Self {
            dir: segments.dir().clone(),
            segments,
        }
    }

    /// Loads a channel's marker.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the channel has never been marked.
    pub fn load(&self, channel: &str) -> CoreResult<Marker> {
        self.segments
            .mutex()
            .with_lock(LockMode::Shared, || self.load_unlocked(channel))
    }

    pub(crate) fn load_unlocked(&self, channel: &str) -> CoreResult<Marker> {
        check_channel(channel)?;
        let path = self.marker_path(channel);
        let data = read_optional(&path)?.ok_or_else(|| CoreError::marker_not_found(channel))?;
        let mut marker = decode_marker(&path, &data)?;
        if marker.channel.is_empty() {
            marker.channel = channel.to_string();
        }
        Ok(marker)
    }

    /// Saves a channel's marker, replacing any previous one.
    pub fn save(&self, channel: &str, marker: &Marker) -> CoreResult<()> {
        self.segments
            .mutex()
            .with_lock(LockMode::Exclusive, || self.save_unlocked(channel, marker))
    }

    pub(crate) fn save_unlocked(&self, channel: &str, marker: &Marker) -> CoreResult<()> {
        check_channel(channel)?;
        fs::create_dir_all(self.dir.markers_dir())?;

        let mut stored = marker.clone();
        stored.channel = channel.to_string();
        let data = serde_json::to_vec_pretty(&stored)
            .map_err(|e| CoreError::invalid_format(e.to_string()))?;
        write_atomic(&self.marker_path(channel), &data)?;

        debug!(channel, file = %stored.file, offset = stored.offset, "saved marker");
        Ok(())
    }

    /// Deletes a channel's marker. Returns false if there was none.
    ///
    /// Markers are never removed implicitly; this exists for tooling.
    pub fn remove(&self, channel: &str) -> CoreResult<bool> {
        check_channel(channel)?;
        self.segments.mutex().with_lock(LockMode::Exclusive, || {
            match fs::remove_file(self.marker_path(channel)) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Returns the names of all channels that have a marker.
    ///
    /// Channels only exist through their markers: events tagged with a
    /// channel name do not make it appear here.
    pub fn list_channels(&self) -> CoreResult<BTreeSet<String>> {
        self.segments
            .mutex()
            .with_lock(LockMode::Shared, || self.list_channels_unlocked())
    }

    pub(crate) fn list_channels_unlocked(&self) -> CoreResult<BTreeSet<String>> {
        let mut channels = BTreeSet::new();
        let entries = match fs::read_dir(self.dir.markers_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(channels),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if is_temp_file(file_name) {
                continue;
            }
            let Some(stem) = file_name.strip_suffix(&format!(".{}", channel::MARKER_EXTENSION))
            else {
                continue;
            };

            let stored = fs::read(entry.path())
                .ok()
                .and_then(|data| serde_json::from_slice::<Marker>(&data).ok())
                .map(|marker| marker.channel)
                .filter(|name| !name.is_empty());

            match stored.or_else(|| stem_to_channel(stem)) {
                Some(name) => {
                    channels.insert(name);
                }
                None => warn!(file = file_name, "ignoring unreadable marker file"),
            }
        }

        Ok(channels)
    }

    /// Checks that a marker still refers to the segment it was taken on.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the segment no longer exists and
    /// `StaleMarker` if its first-line hash changed.
    pub fn validate(&self, marker: &Marker) -> CoreResult<()> {
        self.segments
            .mutex()
            .with_lock(LockMode::Shared, || self.validate_unlocked(marker))
    }

    pub(crate) fn validate_unlocked(&self, marker: &Marker) -> CoreResult<()> {
        let name = parse_name(&marker.file)?;
        let actual = self.segments.first_line_hash_unlocked(name)?;

        // A marker taken on a still-empty segment consumed nothing, so the
        // segment's first line arriving later does not make it stale.
        if marker.first_line_hash.is_empty() && marker.offset == 0 {
            return Ok(());
        }

        if actual != marker.first_line_hash {
            return Err(CoreError::StaleMarker {
                channel: marker.channel.clone(),
                segment: marker.file.clone(),
                expected: marker.first_line_hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    fn marker_path(&self, channel: &str) -> PathBuf {
        self.dir.markers_dir().join(marker_file_name(channel))
    }
}

fn check_channel(channel: &str) -> CoreResult<()> {
    if channel.is_empty() {
        return Err(CoreError::InvalidChannel {
            name: channel.to_string(),
        });
    }
    Ok(())
}

fn decode_marker(path: &Path, data: &[u8]) -> CoreResult<Marker> {
    serde_json::from_slice(data)
        .map_err(|e| CoreError::invalid_format(format!("marker {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use evlog_codec::Event;
    use serde_json::json;
    use tempfile::tempdir;

    fn stores(path: &Path) -> (SegmentStore, MarkerStore) {
        let segments = SegmentStore::open(path, Config::new().sync_on_append(false)).unwrap();
        let markers = MarkerStore::new(segments.clone());
        (segments, markers)
    }

    fn marker_at(segments: &SegmentStore, offset: u64) -> Marker {
        let status = segments.status(None).unwrap();
        Marker {
            channel: String::new(),
            file: status.name,
            first_line_hash: status.first_line_hash,
            offset,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn load_missing_is_not_found() {
        let temp = tempdir().unwrap();
        let (_, markers) = stores(temp.path());
        let err = markers.load("reader").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn save_and_load() {
        let temp = tempdir().unwrap();
        let (segments, markers) = stores(temp.path());
        let pos = segments.append(&Event::new("t", "c", json!(1))).unwrap();

        let marker = marker_at(&segments, pos.offset);
        markers.save("reader", &marker).unwrap();

        let loaded = markers.load("reader").unwrap();
        assert_eq!(loaded.channel, "reader");
        assert!(loaded.same_position(&marker));
        assert_eq!(loaded.position(), pos);
    }

    #[test]
    fn save_overwrites() {
        let temp = tempdir().unwrap();
        let (segments, markers) = stores(temp.path());
        segments.append(&Event::new("t", "c", json!(1))).unwrap();
        let pos = segments.append(&Event::new("t", "c", json!(2))).unwrap();

        markers.save("reader", &marker_at(&segments, 10)).unwrap();
        markers.save("reader", &marker_at(&segments, pos.offset)).unwrap();

        assert_eq!(markers.load("reader").unwrap().offset, pos.offset);
    }

    #[test]
    fn save_recreates_markers_dir() {
        let temp = tempdir().unwrap();
        let (segments, markers) = stores(temp.path());
        fs::remove_dir_all(temp.path().join("markers")).unwrap();

        markers.save("reader", &marker_at(&segments, 0)).unwrap();
        assert!(temp.path().join("markers").join("reader.json").exists());
    }

    #[test]
    fn crafted_channel_stays_inside_markers_dir() {
        let temp = tempdir().unwrap();
        let (segments, markers) = stores(temp.path());

        markers.save("..", &marker_at(&segments, 0)).unwrap();
        markers.save("../escape", &marker_at(&segments, 0)).unwrap();

        assert!(!temp.path().join("escape.json").exists());
        assert_eq!(
            markers.list_channels().unwrap().into_iter().collect::<Vec<_>>(),
            vec!["..".to_string(), "../escape".to_string()]
        );
    }

    #[test]
    fn empty_channel_is_rejected() {
        let temp = tempdir().unwrap();
        let (segments, markers) = stores(temp.path());
        let err = markers.save("", &marker_at(&segments, 0)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidChannel { .. }));
    }

    #[test]
    fn list_channels_reports_marked_channels_only() {
        let temp = tempdir().unwrap();
        let (segments, markers) = stores(temp.path());
        segments
            .append(&Event::new("t", "tagged-but-unmarked", json!(null)))
            .unwrap();

        assert!(markers.list_channels().unwrap().is_empty());

        markers.save("b", &marker_at(&segments, 0)).unwrap();
        markers.save("a/x", &marker_at(&segments, 0)).unwrap();
        fs::write(temp.path().join("markers").join("junk.json.tmp"), b"").unwrap();

        let channels: Vec<String> = markers.list_channels().unwrap().into_iter().collect();
        assert_eq!(channels, vec!["a/x".to_string(), "b".to_string()]);
    }

    #[test]
    fn remove_marker() {
        let temp = tempdir().unwrap();
        let (segments, markers) = stores(temp.path());
        markers.save("reader", &marker_at(&segments, 0)).unwrap();

        assert!(markers.remove("reader").unwrap());
        assert!(!markers.remove("reader").unwrap());
        assert!(markers.load("reader").unwrap_err().is_not_found());
    }

    #[test]
    fn validate_detects_replaced_segment() {
        let temp = tempdir().unwrap();
        let (segments, markers) = stores(temp.path());
        let pos = segments.append(&Event::new("t", "c", json!(1))).unwrap();
        let mut marker = marker_at(&segments, pos.offset);
        marker.channel = "reader".to_string();
        markers.validate(&marker).unwrap();

        marker.first_line_hash = "0000".to_string();
        let err = markers.validate(&marker).unwrap_err();
        assert!(err.is_stale_marker());
    }

    #[test]
    fn validate_missing_segment_is_not_found() {
        let temp = tempdir().unwrap();
        let (segments, markers) = stores(temp.path());
        let mut marker = marker_at(&segments, 0);
        marker.file = "events.000099.jsonl.zst".to_string();
        assert!(markers.validate(&marker).unwrap_err().is_not_found());
    }

    #[test]
    fn marker_on_empty_segment_survives_first_append() {
        let temp = tempdir().unwrap();
        let (segments, markers) = stores(temp.path());
        let marker = marker_at(&segments, 0);
        assert_eq!(marker.first_line_hash, "");

        segments.append(&Event::new("t", "c", json!(1))).unwrap();
        markers.validate(&marker).unwrap();
    }

    #[test]
    fn corrupt_marker_is_format_error() {
        let temp = tempdir().unwrap();
        let (_, markers) = stores(temp.path());
        fs::write(temp.path().join("markers").join("reader.json"), b"{oops").unwrap();
        let err = markers.load("reader").unwrap_err();
        assert!(matches!(err, CoreError::InvalidFormat { .. }));
    }
}
