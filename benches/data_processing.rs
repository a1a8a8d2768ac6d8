//! Benchmarks for the per-tick and per-frame hot paths
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rx868_relay::backend::{FrameDecoder, ReplayDecoder};
use rx868_relay::pipeline::{outbound_messages, EdgeTracker, HandoffSlot};
use rx868_relay::types::{Level, SensorFrame};

fn frame(sensor_type: u8) -> SensorFrame {
    SensorFrame {
        address: 42,
        sensor_type,
        temperature: 21.3,
        humidity: 45.0,
        pressure: 1013,
        wind: 7.5,
        rain_sum: 120,
        rain_detect: true,
    }
}

/// One sampler tick: edge tracking plus the decoder call on edges
fn bench_edge_tracking(c: &mut Criterion) {
    let mut group = c.benchmark_group("edge_tracking");

    // A 12-tick pulse period, close to the 200 us cadence of real telegrams
    let levels: Vec<Level> = (0..1200)
        .map(|i| if i % 12 < 5 { Level::High } else { Level::Low })
        .collect();
    group.throughput(Throughput::Elements(levels.len() as u64));

    group.bench_function("ticks", |b| {
        let mut tracker = EdgeTracker::new();
        let mut decoder = ReplayDecoder::new(vec![frame(1)], 64).unwrap();
        b.iter(|| {
            let mut frames = 0u32;
            for &level in &levels {
                if let Some((len, lo)) = tracker.tick(black_box(level)) {
                    if decoder.pulse(len, lo) {
                        frames += 1;
                    }
                }
            }
            black_box(frames)
        });
    });

    group.finish();
}

fn bench_handoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("handoff_slot");
    let slot = HandoffSlot::new();

    group.bench_function("publish_overwrite", |b| {
        b.iter(|| slot.publish(black_box(frame(7))));
    });

    group.bench_function("publish_take", |b| {
        b.iter(|| {
            slot.publish(black_box(frame(7)));
            black_box(slot.try_take())
        });
    });

    group.bench_function("take_empty", |b| {
        let empty = HandoffSlot::new();
        b.iter(|| black_box(empty.try_take()));
    });

    group.finish();
}

fn bench_message_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("outbound_messages");

    for sensor_type in [1u8, 4, 7, 0] {
        group.bench_with_input(
            BenchmarkId::new("sensor_type", sensor_type),
            &frame(sensor_type),
            |b, frame| {
                b.iter(|| black_box(outbound_messages(black_box(frame), "weatherstation")));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_edge_tracking, bench_handoff, bench_message_planning);

criterion_main!(benches);
