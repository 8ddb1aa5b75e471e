//! Event bus operation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use evlog_core::{Config, EventBus};
use rand::Rng;
use serde_json::json;
use tempfile::TempDir;

/// Generate a random hex string of the specified length.
fn random_text(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
        .collect()
}

fn open_bus(config: Config) -> (TempDir, EventBus) {
    let dir = TempDir::new().unwrap();
    let bus = EventBus::open(dir.path(), config).unwrap();
    (dir, bus)
}

fn populate(bus: &EventBus, count: usize, payload_size: usize) {
    let body = random_text(payload_size);
    for i in 0..count {
        bus.add("bench.event", "bench", json!({ "i": i, "body": body }))
            .unwrap();
    }
}

/// Benchmark single appends by payload size.
fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("add");

    for size in [64, 1024, 8192].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (_dir, bus) = open_bus(Config::new().sync_on_append(false));
            let body = random_text(size);

            b.iter(|| {
                let event = bus
                    .add("bench.event", "bench", json!({ "body": black_box(&body) }))
                    .unwrap();
                black_box(event);
            });
        });
    }
    group.finish();
}

/// Benchmark appends with fsync after every record.
fn bench_add_synced(c: &mut Criterion) {
    let (_dir, bus) = open_bus(Config::new());
    let body = random_text(256);

    c.bench_function("add_synced", |b| {
        b.iter(|| {
            bus.add("bench.event", "bench", json!({ "body": &body }))
                .unwrap();
        });
    });
}

/// Benchmark listing a whole channel backlog.
fn bench_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("list");

    for count in [100, 1000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (_dir, bus) = open_bus(Config::new().sync_on_append(false));
            populate(&bus, count, 128);

            b.iter(|| black_box(bus.list("reader", 0).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark listing across many rotated segments.
fn bench_list_rotated(c: &mut Criterion) {
    let config = Config::new()
        .sync_on_append(false)
        .max_segment_size(64 * 1024)
        .rotation_headroom(1024);
    let (_dir, bus) = open_bus(config);
    populate(&bus, 5_000, 128);

    c.bench_function("list_rotated", |b| {
        b.iter(|| black_box(bus.list("reader", 0).unwrap()));
    });
}

/// Benchmark list-then-mark consumer loops with a bounded batch.
fn bench_consume(c: &mut Criterion) {
    let mut group = c.benchmark_group("consume");

    for batch in [10, 100].iter() {
        group.throughput(Throughput::Elements(*batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            let (_dir, bus) = open_bus(Config::new().sync_on_append(false));
            populate(&bus, 1000, 64);
            let mut round = 0usize;

            b.iter(|| {
                // Each round reads from the start on a fresh channel.
                round += 1;
                let channel = format!("consumer_{}", round);
                let entries = bus.list(&channel, batch).unwrap();
                if let Some(last) = entries.last() {
                    bus.mark(&channel, &last.position).unwrap();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_add,
    bench_add_synced,
    bench_list,
    bench_list_rotated,
    bench_consume
);

criterion_main!(benches);
