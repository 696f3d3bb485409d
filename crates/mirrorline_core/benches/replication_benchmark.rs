//! # Replication Benchmarks
//!
//! Storage churn, diff encoding and inbound dispatch.
//!
//! Run with: `cargo bench --package mirrorline_core`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mirrorline_core::{EntityContainer, Replicated, Role, SlotStorage, StateSync, WireReader, WireWriter};

#[derive(Clone, Debug)]
struct Body {
    position: [f32; 3],
    velocity: [f32; 3],
}

impl Replicated for Body {
    const KIND: &'static str = "bench.Body";

    fn encode(&self, writer: &mut WireWriter) {
        for v in self.position.iter().chain(&self.velocity) {
            writer.write_f32(*v);
        }
    }

    fn decode(reader: &mut WireReader<'_>) -> Option<Self> {
        Some(Self {
            position: [reader.read_f32()?, reader.read_f32()?, reader.read_f32()?],
            velocity: [reader.read_f32()?, reader.read_f32()?, reader.read_f32()?],
        })
    }
}

fn body(i: usize) -> Body {
    let f = i as f32;
    Body {
        position: [f, f * 0.5, 0.0],
        velocity: [1.0, 0.0, -f * 0.1],
    }
}

fn bench_storage_churn(c: &mut Criterion) {
    c.bench_function("storage_churn_10k", |b| {
        b.iter(|| {
            let mut storage = SlotStorage::new();
            for i in 0..10_000 {
                storage.emplace(body(i));
            }
            for id in (0..10_000).step_by(3) {
                let _ = storage.remove(id);
            }
            for i in 0..3_000 {
                storage.emplace(body(i));
            }
            black_box(storage.live_count())
        });
    });
}

fn bench_snapshot_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_dispatch");

    for count in [100, 1_000, 10_000] {
        let mut server = EntityContainer::new(Role::Authority);
        let _ = server.register::<Body>(StateSync::EveryTick);
        if let Ok(storage) = server.storage_mut::<Body>() {
            for i in 0..count {
                storage.emplace(body(i));
            }
        }
        let _ = server.encode_tick();
        let snapshot = server.encode_snapshot();

        group.bench_with_input(BenchmarkId::new("encode", count), &count, |b, _| {
            b.iter(|| black_box(server.encode_snapshot().len()));
        });
        group.bench_with_input(BenchmarkId::new("dispatch", count), &snapshot, |b, snapshot| {
            b.iter(|| {
                let mut client = EntityContainer::new(Role::Mirror);
                let _ = client.register::<Body>(StateSync::EveryTick);
                black_box(client.dispatch(snapshot).applied)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_storage_churn, bench_snapshot_dispatch);
criterion_main!(benches);
