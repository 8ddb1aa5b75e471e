//! Test fixtures and event log helpers.
//!
//! Provides convenience functions for setting up temporary event logs
//! and common test scenarios.

use evlog_core::{Config, EventBus};
use std::path::Path;
use tempfile::TempDir;

/// A test event log with automatic cleanup.
pub struct TestBus {
    /// The bus instance.
    pub bus: EventBus,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestBus {
    /// Creates a test log with default settings, minus per-append fsync.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Creates a test log with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let bus = EventBus::open(temp_dir.path(), config).expect("Failed to open event bus");
        Self { bus, temp_dir }
    }

    /// Creates a test log whose segments rotate after a few hundred bytes.
    pub fn small_segments() -> Self {
        Self::with_config(small_segment_config())
    }

    /// Returns the log directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Opens another handle on the same directory, as a second process would.
    pub fn reopen(&self) -> EventBus {
        EventBus::open(self.path(), self.bus.config().clone()).expect("Failed to reopen event bus")
    }
}

impl Default for TestBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestBus {
    type Target = EventBus;

    fn deref(&self) -> &Self::Target {
        &self.bus
    }
}

/// Default test configuration: no fsync per append.
pub fn test_config() -> Config {
    Config::new().sync_on_append(false)
}

/// Configuration that forces frequent rotation.
pub fn small_segment_config() -> Config {
    test_config().max_segment_size(1024).rotation_headroom(128)
}

/// Runs a test with a temporary event log.
///
/// # Example
///
/// ```rust,ignore
/// use evlog_testkit::with_temp_bus;
///
/// #[test]
/// fn my_test() {
///     with_temp_bus(|bus| {
///         bus.add("t", "c", serde_json::json!(1)).unwrap();
///     });
/// }
/// ```
pub fn with_temp_bus<F, R>(f: F) -> R
where
    F: FnOnce(&EventBus) -> R,
{
    let test_bus = TestBus::new();
    f(&test_bus.bus)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use evlog_core::Event;
    use serde_json::json;

    /// Creates a log holding `count` events on channel `"test"`.
    pub fn populated_bus(count: usize) -> (TestBus, Vec<Event>) {
        populate(TestBus::new(), count)
    }

    /// Creates a log holding `count` events spread over several segments.
    pub fn rotated_bus(count: usize) -> (TestBus, Vec<Event>) {
        populate(TestBus::small_segments(), count)
    }

    /// Creates a log where each of `channels` has marked a different
    /// prefix of ten events: channel `i` has consumed `i + 1` of them.
    pub fn multi_channel_bus(channels: usize) -> (TestBus, Vec<String>) {
        let (test_bus, _) = populated_bus(10);
        let entries = test_bus.list("__all", 0).expect("Failed to list events");

        let names: Vec<String> = (0..channels).map(|i| format!("channel_{i}")).collect();
        for (i, name) in names.iter().enumerate() {
            let entry = &entries[i.min(entries.len() - 1)];
            test_bus
                .mark(name, &entry.position)
                .expect("Failed to mark channel");
        }

        (test_bus, names)
    }

    fn populate(test_bus: TestBus, count: usize) -> (TestBus, Vec<Event>) {
        let events = (0..count)
            .map(|i| {
                test_bus
                    .add("test.event", "test", json!({ "index": i }))
                    .expect("Failed to add event")
            })
            .collect();
        (test_bus, events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bus_is_empty() {
        let test_bus = TestBus::new();
        assert!(test_bus.list("reader", 0).unwrap().is_empty());
        assert_eq!(test_bus.list_files().unwrap().len(), 1);
    }

    #[test]
    fn test_with_temp_bus() {
        let count = with_temp_bus(|bus| {
            bus.add("t", "c", json!(null)).unwrap();
            bus.list("reader", 0).unwrap().len()
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn test_reopen_sees_same_events() {
        let (test_bus, events) = scenarios::populated_bus(3);
        let other = test_bus.reopen();
        let listed: Vec<_> = other
            .list("reader", 0)
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert_eq!(listed, events);
    }

    #[test]
    fn test_rotated_scenario() {
        let (test_bus, events) = scenarios::rotated_bus(30);
        assert!(test_bus.list_files().unwrap().len() > 1);
        assert_eq!(test_bus.list("reader", 0).unwrap().len(), events.len());
    }

    #[test]
    fn test_multi_channel_scenario() {
        let (test_bus, names) = scenarios::multi_channel_bus(3);
        for (i, name) in names.iter().enumerate() {
            assert_eq!(test_bus.list(name, 0).unwrap().len(), 10 - (i + 1));
        }
        assert_eq!(test_bus.list_channels().unwrap().len(), 3);
    }
}
