//! # Triple Buffer Benchmark
//!
//! Measures the cost of the handoff itself, not of the state:
//! 1. `update()` with an empty and a loaded command queue
//! 2. A full render frame (`start_read` + `stop_read`)
//! 3. Update throughput while a reader thread holds frames
//!
//! Target: handoff overhead well under 1µs per cycle.

#![allow(dead_code)]
#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use cadence_core::{RenderState, StateCore, TripleBuffer};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// A render snapshot roughly the size of a small scene.
struct Scene {
    core: StateCore,
    transforms: Vec<[f32; 16]>,
}

impl Scene {
    fn new(objects: usize) -> Self {
        Self {
            core: StateCore::new(),
            transforms: vec![[0.0; 16]; objects],
        }
    }
}

impl RenderState for Scene {
    fn core(&self) -> &StateCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StateCore {
        &mut self.core
    }
}

/// Bare update: no commands, no singletons.
fn bench_update(c: &mut Criterion) {
    let buffer = TripleBuffer::from_fn(|| Scene::new(1_024), Vec::new());

    c.bench_function("triple_buffer_update_empty", |b| {
        b.iter(|| black_box(buffer.update()));
    });
}

/// Update draining N queued commands.
fn bench_update_with_commands(c: &mut Criterion) {
    let mut group = c.benchmark_group("triple_buffer_update_commands");

    for commands in [1_usize, 16, 256] {
        let buffer = TripleBuffer::from_fn(|| Scene::new(1_024), Vec::new());
        group.throughput(Throughput::Elements(commands as u64));

        group.bench_with_input(BenchmarkId::from_parameter(commands), &commands, |b, &n| {
            b.iter(|| {
                for i in 0..n {
                    buffer.add_command(move |scene: &mut Scene| {
                        scene.transforms[i % 1_024][0] += 1.0;
                    });
                }
                // Each command lands once per instance: three updates drain it.
                buffer.update();
                buffer.update();
                buffer.update();
            });
        });
    }

    group.finish();
}

/// One render frame with a fresh frame staged every time.
fn bench_read_frame(c: &mut Criterion) {
    let buffer = TripleBuffer::from_fn(|| Scene::new(1_024), Vec::new());

    c.bench_function("triple_buffer_read_frame", |b| {
        b.iter(|| {
            buffer.update();
            let frame = buffer.start_read();
            black_box(frame.transforms.len());
            black_box(frame.stop_read())
        });
    });
}

/// Writer throughput while a reader continuously holds frames.
fn bench_contended_update(c: &mut Criterion) {
    let buffer = Arc::new(TripleBuffer::from_fn(|| Scene::new(1_024), Vec::new()));
    let running = Arc::new(AtomicBool::new(true));

    let reader = {
        let buffer = Arc::clone(&buffer);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                let frame = buffer.start_read();
                black_box(frame.transforms.first().copied());
                frame.stop_read();
            }
        })
    };

    c.bench_function("triple_buffer_update_contended", |b| {
        b.iter(|| black_box(buffer.update()));
    });

    running.store(false, Ordering::Relaxed);
    let _ = reader.join();
}

criterion_group!(
    benches,
    bench_update,
    bench_update_with_commands,
    bench_read_frame,
    bench_contended_update,
);
criterion_main!(benches);
