//! Segment sidecar metadata and status reports.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Sidecar record kept next to every segment.
///
/// The first-line hash is the segment's identity: markers compare it to
/// detect that a file name now refers to a different segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Length of the decompressed stream in bytes, newlines included.
    pub uncompressed_size: u64,
    /// Number of records appended.
    pub line_count: u64,
    /// Hash of the first record line; empty while the segment is empty.
    #[serde(default)]
    pub first_line_hash: String,
    /// Committed length of the compressed file. Bytes past it belong to
    /// an append that never completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<u64>,
}

impl SegmentMeta {
    /// Metadata of a freshly created, empty segment.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            compressed_size: Some(0),
            ..Self::default()
        }
    }

    /// Serializes the sidecar.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CoreError::invalid_format(e.to_string()))
    }

    /// Parses a sidecar.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        serde_json::from_slice(data)
            .map_err(|e| CoreError::invalid_format(format!("segment metadata: {e}")))
    }
}

/// Status of one segment as reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    /// Segment file name.
    pub name: String,
    /// Physical (compressed) file size in bytes.
    pub compressed_size: u64,
    /// Logical (decompressed) size in bytes.
    pub uncompressed_size: u64,
    /// Number of records.
    pub line_count: u64,
    /// Identity hash of the first record.
    pub first_line_hash: String,
    /// Whether this segment is open for append.
    pub is_latest: bool,
}

/// Result of checking a segment's content against its sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentReport {
    /// Segment file name.
    pub name: String,
    /// Sidecar as stored, if present.
    pub recorded: Option<SegmentMeta>,
    /// Metadata recomputed from the segment content.
    pub actual: SegmentMeta,
    /// Lines that failed to decode.
    pub malformed_lines: u64,
}

impl SegmentReport {
    /// Returns true if the sidecar exists and matches the content.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.recorded.as_ref().is_some_and(|recorded| {
            recorded.uncompressed_size == self.actual.uncompressed_size
                && recorded.line_count == self.actual.line_count
                && recorded.first_line_hash == self.actual.first_line_hash
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_roundtrip() {
        let meta = SegmentMeta {
            uncompressed_size: 120,
            line_count: 2,
            first_line_hash: "abcd".to_string(),
            compressed_size: Some(96),
        };
        let decoded = SegmentMeta::decode(&meta.encode().unwrap()).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn sidecar_without_optional_fields() {
        let meta = SegmentMeta::decode(br#"{"uncompressed_size":10,"line_count":1}"#).unwrap();
        assert_eq!(meta.first_line_hash, "");
        assert_eq!(meta.compressed_size, None);
    }

    #[test]
    fn invalid_sidecar_is_format_error() {
        let err = SegmentMeta::decode(b"{not json").unwrap_err();
        assert!(matches!(err, CoreError::InvalidFormat { .. }));
    }

    #[test]
    fn report_consistency() {
        let actual = SegmentMeta {
            uncompressed_size: 10,
            line_count: 1,
            first_line_hash: "h".to_string(),
            compressed_size: Some(30),
        };
        let mut report = SegmentReport {
            name: "events.000001.jsonl.zst".to_string(),
            recorded: Some(actual.clone()),
            actual,
            malformed_lines: 0,
        };
        assert!(report.is_consistent());

        report.recorded.as_mut().unwrap().line_count = 2;
        assert!(!report.is_consistent());

        report.recorded = None;
        assert!(!report.is_consistent());
    }
}
