//! Crash recovery testing for evlog.
//!
//! This module damages a log's files the way an interrupted writer or an
//! outside tool would, and checks that the log recovers.
//!
//! ## Test Strategy
//!
//! 1. **Torn tail** - bytes written past the committed length are dropped
//! 2. **Missing sidecar** - metadata is recomputed from segment content
//! 3. **Lost latest pointer** - the newest segment is picked up again
//! 4. **Malformed line** - the bad line is skipped, its neighbours survive
//! 5. **Replaced segment** - consumers marked on the old content see a stale marker
//!
//! ## Usage
//!
//! ```rust,ignore
//! use evlog_testkit::crash::RecoveryHarness;
//!
//! let mut harness = RecoveryHarness::new();
//! harness.run_all_tests();
//! assert!(harness.all_passed(), "{}", harness.summary());
//! ```

use crate::fixtures::TestBus;
use evlog_codec::encode_event;
use evlog_core::{CoreResult, Event, EventBus, LockMode, SegmentMeta, SegmentName};
use serde_json::json;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Returns the path of a segment file inside the bus directory.
pub fn segment_path(bus: &EventBus, segment: &str) -> PathBuf {
    bus.path().join(segment)
}

/// Returns the path of a segment's metadata sidecar.
pub fn sidecar_path(bus: &EventBus, segment: &str) -> Option<PathBuf> {
    SegmentName::parse(segment).map(|name| bus.path().join(name.meta_file_name()))
}

/// Appends raw bytes to the latest segment without touching its metadata,
/// as a writer that crashed between the data write and the commit would.
pub fn tear_tail(bus: &EventBus, garbage: &[u8]) -> CoreResult<()> {
    let _guard = bus.segments().mutex().acquire(LockMode::Exclusive)?;
    let latest = fs::read_to_string(bus.segments().dir().latest_path())?
        .trim()
        .to_string();
    let mut file = OpenOptions::new()
        .append(true)
        .open(segment_path(bus, &latest))?;
    file.write_all(garbage)?;
    Ok(())
}

/// Appends `line` verbatim as a committed record of the latest segment.
///
/// Unlike `tear_tail` the metadata is rebuilt under the same lock, so
/// readers see the line and no concurrent append can treat it as a torn
/// tail. Use it to plant malformed records.
pub fn append_raw_line(bus: &EventBus, line: &[u8]) -> CoreResult<SegmentMeta> {
    let guard = bus.segments().mutex().acquire(LockMode::Exclusive)?;
    let latest = fs::read_to_string(bus.segments().dir().latest_path())?
        .trim()
        .to_string();

    let mut framed = line.to_vec();
    framed.push(b'\n');
    let frame = zstd::stream::encode_all(framed.as_slice(), bus.config().compression_level)?;
    let mut file = OpenOptions::new()
        .append(true)
        .open(segment_path(bus, &latest))?;
    file.write_all(&frame)?;
    drop(file);

    bus.segments().rebuild_metadata_held(&guard, &latest)
}

/// Overwrites `segment` with `events` and rebuilds its metadata, keeping
/// the file name. Models an external tool rewriting the log.
pub fn replace_segment(bus: &EventBus, segment: &str, events: &[Event]) -> CoreResult<SegmentMeta> {
    let guard = bus.segments().mutex().acquire(LockMode::Exclusive)?;

    let mut plain = Vec::new();
    for event in events {
        plain.extend_from_slice(&encode_event(event)?);
        plain.push(b'\n');
    }
    let data = zstd::stream::encode_all(plain.as_slice(), bus.config().compression_level)?;
    fs::write(segment_path(bus, segment), data)?;

    bus.segments().rebuild_metadata_held(&guard, segment)
}

/// Deletes a segment's metadata sidecar.
pub fn remove_sidecar(bus: &EventBus, segment: &str) -> CoreResult<()> {
    if let Some(path) = sidecar_path(bus, segment) {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Deletes the pointer naming the latest segment.
pub fn remove_latest_pointer(bus: &EventBus) -> CoreResult<()> {
    fs::remove_file(bus.segments().dir().latest_path())?;
    Ok(())
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct RecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected events after recovery.
    pub expected_events: usize,
    /// Actual events after recovery.
    pub actual_events: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl RecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, events: usize) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_events: events,
            actual_events: events,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: usize, actual: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_events: expected,
            actual_events: actual,
            error: Some(error.to_string()),
        }
    }

    fn check(description: &str, expected: usize, outcome: Result<usize, String>) -> Self {
        match outcome {
            Ok(actual) if actual == expected => Self::pass(description, actual),
            Ok(actual) => Self::fail(description, expected, actual, "event count mismatch"),
            Err(e) => Self::fail(description, expected, 0, &e),
        }
    }
}

fn add_events(bus: &EventBus, count: usize) -> Result<(), String> {
    for i in 0..count {
        bus.add("crash.test", "crash", json!({ "i": i }))
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn count_pending(bus: &EventBus) -> Result<usize, String> {
    bus.list("recovery", 0)
        .map(|entries| entries.len())
        .map_err(|e| e.to_string())
}

/// Runs each damage scenario against a fresh log.
#[derive(Debug, Default)]
pub struct RecoveryHarness {
    results: Vec<RecoveryResult>,
}

impl RecoveryHarness {
    /// Creates a harness with no results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the results recorded so far.
    pub fn results(&self) -> &[RecoveryResult] {
        &self.results
    }

    fn record(&mut self, result: RecoveryResult) -> RecoveryResult {
        self.results.push(result.clone());
        result
    }

    /// Bytes past the committed length are invisible and cut on next append.
    pub fn test_torn_tail_discarded(&mut self) -> RecoveryResult {
        let test_bus = TestBus::new();
        let outcome = (|| -> Result<usize, String> {
            add_events(&test_bus, 3)?;
            tear_tail(&test_bus, b"\x28\xb5\x2f\xfd partial frame").map_err(|e| e.to_string())?;

            let reopened = test_bus.reopen();
            if count_pending(&reopened)? != 3 {
                return Err("torn bytes became visible".to_string());
            }
            add_events(&reopened, 1)?;
            count_pending(&reopened)
        })();
        self.record(RecoveryResult::check("torn tail is discarded", 4, outcome))
    }

    /// A lost sidecar is recomputed from the segment.
    pub fn test_missing_sidecar_recomputed(&mut self) -> RecoveryResult {
        let test_bus = TestBus::new();
        let outcome = (|| -> Result<usize, String> {
            add_events(&test_bus, 3)?;
            let latest = test_bus.segments().latest().map_err(|e| e.to_string())?;
            remove_sidecar(&test_bus, &latest).map_err(|e| e.to_string())?;

            let status = test_bus.status(None).map_err(|e| e.to_string())?;
            if status.line_count != 3 {
                return Err(format!("recomputed line count {}", status.line_count));
            }
            add_events(&test_bus, 1)?;
            count_pending(&test_bus)
        })();
        self.record(RecoveryResult::check("missing sidecar is recomputed", 4, outcome))
    }

    /// Losing the latest pointer resumes appends on the newest segment.
    pub fn test_lost_latest_pointer(&mut self) -> RecoveryResult {
        let test_bus = TestBus::small_segments();
        let outcome = (|| -> Result<usize, String> {
            add_events(&test_bus, 20)?;
            let files = test_bus.list_files().map_err(|e| e.to_string())?;
            remove_latest_pointer(&test_bus).map_err(|e| e.to_string())?;

            let reopened = test_bus.reopen();
            let latest = reopened.segments().latest().map_err(|e| e.to_string())?;
            if files.last() != Some(&latest) {
                return Err(format!("latest repointed to {latest}"));
            }
            add_events(&reopened, 1)?;
            count_pending(&reopened)
        })();
        self.record(RecoveryResult::check("lost latest pointer is recovered", 21, outcome))
    }

    /// A malformed record is skipped without hiding its neighbours.
    pub fn test_malformed_line_skipped(&mut self) -> RecoveryResult {
        let test_bus = TestBus::new();
        let outcome = (|| -> Result<usize, String> {
            add_events(&test_bus, 2)?;
            append_raw_line(&test_bus, b"{not json").map_err(|e| e.to_string())?;
            add_events(&test_bus, 1)?;
            count_pending(&test_bus)
        })();
        self.record(RecoveryResult::check("malformed line is skipped", 3, outcome))
    }

    /// Rewriting a marked segment makes its consumers stale.
    pub fn test_replaced_segment_is_stale(&mut self) -> RecoveryResult {
        let test_bus = TestBus::new();
        let outcome = (|| -> Result<usize, String> {
            add_events(&test_bus, 2)?;
            let entries = test_bus.list("recovery", 0).map_err(|e| e.to_string())?;
            let position = &entries[0].position;
            test_bus
                .mark("recovery", position)
                .map_err(|e| e.to_string())?;

            let replacement = vec![Event::new("crash.other", "crash", json!("replaced"))];
            replace_segment(&test_bus, &position.segment, &replacement)
                .map_err(|e| e.to_string())?;

            match test_bus.list("recovery", 0) {
                Err(e) if e.is_stale_marker() => Ok(0),
                Err(e) => Err(e.to_string()),
                Ok(entries) => Ok(entries.len()),
            }
        })();
        self.record(RecoveryResult::check("replaced segment is stale", 0, outcome))
    }

    /// Runs every scenario.
    pub fn run_all_tests(&mut self) -> Vec<RecoveryResult> {
        vec![
            self.test_torn_tail_discarded(),
            self.test_missing_sidecar_recomputed(),
            self.test_lost_latest_pointer(),
            self.test_malformed_line_skipped(),
            self.test_replaced_segment_is_stale(),
        ]
    }

    /// Returns a printable summary of all results.
    pub fn summary(&self) -> String {
        let passed = self.results.iter().filter(|r| r.passed).count();
        let mut out = format!("Recovery tests: {}/{} passed\n", passed, self.results.len());
        for result in &self.results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!(
                "  [{}] {} (expected {}, got {})",
                status, result.description, result.expected_events, result.actual_events
            ));
            if let Some(error) = &result.error {
                out.push_str(&format!(": {}", error));
            }
            out.push('\n');
        }
        out
    }

    /// Returns true if every recorded test passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torn_tail() {
        let result = RecoveryHarness::new().test_torn_tail_discarded();
        assert!(result.passed, "{:?}", result);
    }

    #[test]
    fn test_missing_sidecar() {
        let result = RecoveryHarness::new().test_missing_sidecar_recomputed();
        assert!(result.passed, "{:?}", result);
    }

    #[test]
    fn test_lost_latest() {
        let result = RecoveryHarness::new().test_lost_latest_pointer();
        assert!(result.passed, "{:?}", result);
    }

    #[test]
    fn test_malformed_line() {
        let result = RecoveryHarness::new().test_malformed_line_skipped();
        assert!(result.passed, "{:?}", result);
    }

    #[test]
    fn test_replaced_segment() {
        let result = RecoveryHarness::new().test_replaced_segment_is_stale();
        assert!(result.passed, "{:?}", result);
    }

    #[test]
    fn test_raw_line_survives_concurrent_appends() {
        let test_bus = TestBus::new();
        test_bus.add("t", "c", json!(0)).unwrap();

        let writer = test_bus.reopen();
        let handle = std::thread::spawn(move || {
            for i in 1..=20 {
                writer.add("t", "c", json!(i)).unwrap();
            }
        });
        for _ in 0..5 {
            append_raw_line(&test_bus, b"{not json").unwrap();
        }
        handle.join().unwrap();

        let latest = test_bus.segments().latest().unwrap();
        let report = test_bus.segments().verify(&latest).unwrap();
        assert_eq!(report.malformed_lines, 5);
        assert!(report.is_consistent(), "{:?}", report);
        assert_eq!(test_bus.list("reader", 0).unwrap().len(), 21);
    }

    #[test]
    fn test_run_all() {
        let mut harness = RecoveryHarness::new();
        let results = harness.run_all_tests();
        assert_eq!(results.len(), 5);
        assert!(harness.all_passed(), "{}", harness.summary());
    }
}
