//! Dispatch benchmarks.
//!
//! Measures the per-record path: framing, decoding and running the rule set.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use heka_exporter::core::{Config, Message, MetricConfig, MetricKind};
use heka_exporter::protocol::{decode_frame, encode_frame, FrameSplitter};
use heka_exporter::receiver::Bridge;

fn rules(count: usize) -> Vec<MetricConfig> {
    (0..count)
        .map(|i| {
            let mut rule = MetricConfig::new(format!("rule_{}", i), MetricKind::Counter);
            rule.labels.insert("code".to_string(), "status".to_string());
            rule.labels.insert("host".to_string(), "@hostname".to_string());
            rule.matcher = Some(format!("Type == 'nginx.access' && status >= {}", 100 * (i % 6)));
            rule
        })
        .collect()
}

fn record(i: i64) -> Message {
    Message::new()
        .with_type("nginx.access")
        .with_hostname(format!("web-{:02}", i % 8))
        .with_field("status", 200 + (i % 4) * 100)
        .with_field("request_time", 0.001 * i as f64)
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let frame = encode_frame(&record(1));
    group.throughput(Throughput::Bytes(frame.len() as u64));

    group.bench_function("split_and_decode", |b| {
        let mut splitter = FrameSplitter::new(64 * 1024);
        b.iter(|| {
            let mut buf = BytesMut::from(&frame[..]);
            let split = splitter.split(&mut buf).and_then(|r| r.frame);
            if let Some(frame) = split {
                black_box(decode_frame(&frame).ok());
            }
        });
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let records: Vec<Message> = (0..64).map(record).collect();

    for count in [1, 10, 50] {
        let mut config = Config::default();
        config.metrics = rules(count);
        let bridge = Bridge::new(&config).unwrap();

        group.throughput(Throughput::Elements(records.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &records, |b, records| {
            b.iter(|| {
                for message in records {
                    black_box(bridge.handle_message(message));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_dispatch);
criterion_main!(benches);
