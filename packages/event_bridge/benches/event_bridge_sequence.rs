//! Measures the overhead the bridges add on top of invoking a listener directly.
//!
//! * `wait_once()` from subscription to settled result
//! * `as_sequence()` with values buffered before they are pulled
//! * `as_sequence()` with a full buffer that keeps dropping its oldest value

#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::rc::Rc;

use criterion::{Criterion, criterion_group, criterion_main};
use event_bridge::{LocalEmitter, as_sequence, wait_once};
use futures::executor::block_on;

criterion_group!(benches, entrypoint);
criterion_main!(benches);

const BATCH_SIZE: u64 = 64;

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_bridge");

    group.bench_function("emit_without_bridge", |b| {
        let emitter = LocalEmitter::<u8, u64>::new();

        b.iter(|| {
            for value in 0..BATCH_SIZE {
                black_box(emitter.emit(&0, vec![black_box(value)]));
            }
        });
    });

    group.bench_function("wait_once_full_cycle", |b| {
        let emitter = Rc::new(LocalEmitter::<u8, u64>::new());

        b.iter(|| {
            let once = wait_once(&emitter, 0, false);
            emitter.emit(&0, vec![black_box(42)]);
            black_box(block_on(once))
        });
    });

    group.bench_function("sequence_emit_then_pull", |b| {
        let emitter = Rc::new(LocalEmitter::<u8, u64>::new());
        let sequence = as_sequence(&emitter, 0, 128);

        b.iter(|| {
            for value in 0..BATCH_SIZE {
                emitter.emit(&0, vec![black_box(value)]);
            }

            block_on(async {
                for _ in 0..BATCH_SIZE {
                    black_box(sequence.next().await);
                }
            });
        });
    });

    group.bench_function("sequence_overflow", |b| {
        let emitter = Rc::new(LocalEmitter::<u8, u64>::new());
        let _sequence = as_sequence(&emitter, 0, 8);

        b.iter(|| {
            for value in 0..BATCH_SIZE {
                emitter.emit(&0, vec![black_box(value)]);
            }
        });
    });

    group.finish();
}
