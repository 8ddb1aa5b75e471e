//! Event log configuration.

use std::time::Duration;

/// Default rotation threshold for a segment's uncompressed size (64 MiB).
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 64 * 1024 * 1024;

/// Default slack kept below [`DEFAULT_MAX_SEGMENT_SIZE`] (64 KiB).
///
/// An append rotates first when it would bring the segment within this
/// distance of the maximum, so no segment overshoots the cap by more than
/// one record.
pub const DEFAULT_ROTATION_HEADROOM: u64 = 64 * 1024;

/// Configuration for opening an event log.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum uncompressed size of a segment before rotation.
    pub max_segment_size: u64,

    /// Headroom subtracted from `max_segment_size` when deciding to rotate.
    pub rotation_headroom: u64,

    /// Number of non-blocking lock attempts before giving up.
    pub lock_retry_attempts: u32,

    /// Pause between lock attempts.
    pub lock_retry_interval: Duration,

    /// Whether to fsync segment data on every append (safer but slower).
    pub sync_on_append: bool,

    /// zstd compression level for appended records.
    pub compression_level: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            rotation_headroom: DEFAULT_ROTATION_HEADROOM,
            lock_retry_attempts: 500,
            lock_retry_interval: Duration::from_millis(10),
            sync_on_append: true,
            compression_level: 3,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum segment size.
    #[must_use]
    pub const fn max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets the rotation headroom.
    #[must_use]
    pub const fn rotation_headroom(mut self, size: u64) -> Self {
        self.rotation_headroom = size;
        self
    }

    /// Sets the number of lock attempts.
    #[must_use]
    pub const fn lock_retry_attempts(mut self, attempts: u32) -> Self {
        self.lock_retry_attempts = attempts;
        self
    }

    /// Sets the pause between lock attempts.
    #[must_use]
    pub const fn lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval = interval;
        self
    }

    /// Sets whether to fsync on every append.
    #[must_use]
    pub const fn sync_on_append(mut self, value: bool) -> Self {
        self.sync_on_append = value;
        self
    }

    /// Sets the zstd compression level.
    #[must_use]
    pub const fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Returns true if appending `line_len` more bytes to a segment
    /// currently holding `current_size` bytes requires rotation first.
    #[must_use]
    pub fn needs_rotation(&self, current_size: u64, line_len: u64) -> bool {
        current_size
            .saturating_add(line_len)
            .saturating_add(self.rotation_headroom)
            >= self.max_segment_size
    }
}
