//! Event line codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use evlog_codec::{decode_event, encode_event, hash_line, Event};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::json;

/// Generate a random alphanumeric string of the specified length.
fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Create an event whose payload carries `size` bytes of text.
fn event_with_payload(size: usize) -> Event {
    Event::new(
        "email.received",
        "inbox",
        json!({ "from": "alice@example.com", "body": random_text(size) }),
    )
}

/// Create a nested payload.
fn nested_payload(depth: usize, width: usize) -> serde_json::Value {
    if depth == 0 {
        json!("leaf")
    } else {
        let map: serde_json::Map<String, serde_json::Value> = (0..width)
            .map(|i| (format!("key_{}", i), nested_payload(depth - 1, width)))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Benchmark encoding by payload size.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in [16, 256, 4096].iter() {
        let event = event_with_payload(*size);
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &event, |b, event| {
            b.iter(|| {
                let line = encode_event(black_box(event)).unwrap();
                black_box(line);
            });
        });
    }
    group.finish();
}

/// Benchmark decoding by payload size.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for size in [16, 256, 4096].iter() {
        let line = encode_event(&event_with_payload(*size)).unwrap();
        group.throughput(Throughput::Bytes(line.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &line, |b, line| {
            b.iter(|| {
                let event = decode_event(black_box(line)).unwrap();
                black_box(event);
            });
        });
    }
    group.finish();
}

/// Benchmark decoding nested payloads.
fn bench_decode_nested(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_nested");

    for (depth, width) in [(2, 4), (3, 4), (4, 4)].iter() {
        let event = Event::new("nested", "bench", nested_payload(*depth, *width));
        let line = encode_event(&event).unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("d{}_w{}", depth, width)),
            &line,
            |b, line| {
                b.iter(|| black_box(decode_event(black_box(line)).unwrap()));
            },
        );
    }
    group.finish();
}

/// Benchmark first-line hashing.
fn bench_hash_line(c: &mut Criterion) {
    let line = encode_event(&event_with_payload(256)).unwrap();
    c.bench_function("hash_line", |b| {
        b.iter(|| black_box(hash_line(black_box(&line))));
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_decode_nested,
    bench_hash_line
);

criterion_main!(benches);
