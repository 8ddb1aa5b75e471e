//! Stress tests for evlog.
//!
//! These harnesses drive a log from many producers and consumers at once.
//! Each thread opens its own `EventBus` on the shared directory, so the
//! file lock sees the same contention it would between processes.

use evlog_core::{Config, EventBus};
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Size of the padding string in each payload.
    pub payload_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            payload_size: 128,
        }
    }
}

fn payload(producer: usize, seq: usize, size: usize) -> serde_json::Value {
    json!({
        "producer": producer,
        "seq": seq,
        "pad": "x".repeat(size),
    })
}

/// Run a sequential append stress test.
pub fn stress_sequential_appends(bus: &EventBus, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        match bus.add("stress.append", "stress", payload(0, i, config.payload_size)) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run concurrent producers, each with its own handle on `path`.
pub fn stress_concurrent_producers(
    path: &Path,
    bus_config: &Config,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let path = path.to_path_buf();
            let bus_config = bus_config.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let operations = config.operations;
            let payload_size = config.payload_size;

            thread::spawn(move || {
                let bus = match EventBus::open(&path, bus_config) {
                    Ok(bus) => bus,
                    Err(_) => {
                        failed.fetch_add(operations, Ordering::Relaxed);
                        return;
                    }
                };
                for i in 0..operations {
                    let channel = format!("producer_{t}");
                    match bus.add("stress.produce", &channel, payload(t, i, payload_size)) {
                        Ok(_) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Drains `channel` in batches of `batch`, marking after each batch.
///
/// Returns the consumed `(producer, seq)` pairs in order. Fails if the
/// same event is delivered twice.
pub fn drain_channel(
    bus: &EventBus,
    channel: &str,
    batch: usize,
) -> Result<Vec<(u64, u64)>, String> {
    let mut seen = HashSet::new();
    let mut consumed = Vec::new();

    loop {
        let entries = bus.list(channel, batch).map_err(|e| e.to_string())?;
        let Some(last) = entries.last() else {
            return Ok(consumed);
        };

        for entry in &entries {
            if !seen.insert(entry.event.id.clone()) {
                return Err(format!("event {} delivered twice", entry.event.id));
            }
            let producer = entry.event.payload["producer"].as_u64().unwrap_or(u64::MAX);
            let seq = entry.event.payload["seq"].as_u64().unwrap_or(u64::MAX);
            consumed.push((producer, seq));
        }

        bus.mark(channel, &last.position).map_err(|e| e.to_string())?;
    }
}

/// Checks that every producer's events appear exactly once and in the
/// order that producer added them.
pub fn check_producer_order(
    consumed: &[(u64, u64)],
    producers: usize,
    per_producer: usize,
) -> Result<(), String> {
    let mut next = vec![0u64; producers];
    for &(producer, seq) in consumed {
        let slot = next
            .get_mut(producer as usize)
            .ok_or_else(|| format!("unknown producer {producer}"))?;
        if seq != *slot {
            return Err(format!(
                "producer {producer}: expected seq {}, got {seq}",
                *slot
            ));
        }
        *slot += 1;
    }
    for (producer, &count) in next.iter().enumerate() {
        if count as usize != per_producer {
            return Err(format!(
                "producer {producer}: consumed {count} of {per_producer}"
            ));
        }
    }
    Ok(())
}

/// Run producers and a consumer at the same time, then drain what is left.
///
/// Returns the throughput of the producers and the full consumed sequence.
pub fn stress_produce_while_consuming(
    path: &Path,
    bus_config: &Config,
    config: &StressConfig,
    channel: &str,
) -> (StressTestResult, Result<Vec<(u64, u64)>, String>) {
    let consumer_path = path.to_path_buf();
    let consumer_config = bus_config.clone();
    let consumer_channel = channel.to_string();

    let consumer = thread::spawn(move || -> Result<Vec<(u64, u64)>, String> {
        let bus = EventBus::open(&consumer_path, consumer_config).map_err(|e| e.to_string())?;
        let mut consumed = Vec::new();
        for _ in 0..20 {
            consumed.extend(drain_channel(&bus, &consumer_channel, 16)?);
            thread::sleep(Duration::from_millis(5));
        }
        Ok(consumed)
    });

    let result = stress_concurrent_producers(path, bus_config, config);

    let consumed = consumer
        .join()
        .expect("Thread panicked")
        .and_then(|mut consumed| {
            let bus = EventBus::open(path, bus_config.clone()).map_err(|e| e.to_string())?;
            consumed.extend(drain_channel(&bus, channel, 16)?);
            Ok(consumed)
        });

    (result, consumed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{small_segment_config, TestBus};

    #[test]
    fn test_sequential_appends() {
        let test_bus = TestBus::new();
        let config = StressConfig {
            operations: 200,
            payload_size: 32,
            ..Default::default()
        };

        let result = stress_sequential_appends(&test_bus, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 200);
        assert_eq!(test_bus.list("reader", 0).unwrap().len(), 200);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let test_bus = TestBus::small_segments();
        let config = StressConfig {
            operations: 50,
            threads: 4,
            payload_size: 16,
        };

        let result = stress_concurrent_producers(test_bus.path(), test_bus.config(), &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 200);

        let consumed = drain_channel(&test_bus, "reader", 0).unwrap();
        check_producer_order(&consumed, 4, 50).unwrap();
        assert!(test_bus.list_files().unwrap().len() > 1);
    }

    #[test]
    fn test_produce_while_consuming() {
        let test_bus = TestBus::with_config(small_segment_config());
        let config = StressConfig {
            operations: 40,
            threads: 3,
            payload_size: 16,
        };

        let (result, consumed) =
            stress_produce_while_consuming(test_bus.path(), test_bus.config(), &config, "live");
        assert_eq!(result.failed_ops, 0);
        check_producer_order(&consumed.unwrap(), 3, 40).unwrap();
    }

    #[test]
    fn test_check_producer_order_rejects_gaps() {
        assert!(check_producer_order(&[(0, 0), (0, 2)], 1, 2).is_err());
        assert!(check_producer_order(&[(0, 0)], 1, 2).is_err());
        assert!(check_producer_order(&[(0, 0), (1, 0), (0, 1)], 2, 2).is_err());
        assert!(check_producer_order(&[(0, 0), (1, 0), (0, 1), (1, 1)], 2, 2).is_ok());
    }
}
