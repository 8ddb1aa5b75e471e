//! Segment file naming.

use std::fmt;

const PREFIX: &str = "events.";
const DATA_SUFFIX: &str = ".jsonl.zst";
const META_SUFFIX: &str = ".meta.json";
/// Minimum number of digits in a rendered sequence number.
const SEQ_WIDTH: usize = 6;

/// Identity of a segment: its sequence number.
///
/// Sequence numbers start at 1, strictly increase, and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentName(u64);

impl SegmentName {
    /// The first segment of a new log.
    pub const FIRST: Self = Self(1);

    /// Creates a segment name from a sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the sequence number.
    #[must_use]
    pub const fn seq(self) -> u64 {
        self.0
    }

    /// Returns the segment that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the data file name, e.g. `events.000001.jsonl.zst`.
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{PREFIX}{:0width$}{DATA_SUFFIX}", self.0, width = SEQ_WIDTH)
    }

    /// Returns the sidecar metadata file name, e.g. `events.000001.meta.json`.
    #[must_use]
    pub fn meta_file_name(self) -> String {
        format!("{PREFIX}{:0width$}{META_SUFFIX}", self.0, width = SEQ_WIDTH)
    }

    /// Parses a data file name.
    ///
    /// Returns `None` for anything that is not a segment data file. Only
    /// the canonical rendering is accepted, so `events.1.jsonl.zst` is not
    /// an alias of `events.000001.jsonl.zst`.
    #[must_use]
    pub fn parse(file_name: &str) -> Option<Self> {
        let digits = file_name
            .strip_prefix(PREFIX)?
            .strip_suffix(DATA_SUFFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits
            .parse()
            .ok()
            .filter(|&seq| seq > 0)
            .map(Self)
            .filter(|name| name.file_name() == file_name)
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}
