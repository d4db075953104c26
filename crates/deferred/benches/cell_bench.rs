// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::thread;

use criterion::{criterion_group, criterion_main, Criterion};
use deferred::{Deferred, Immediate};

fn fill_and_peek(c: &mut Criterion) {
    c.bench_function("deferred_fill_and_peek", |b| {
        b.iter(|| {
            let d: Deferred<i32> = Deferred::new();
            d.fill(1);
            d.peek()
        });
    });
}

fn upon_already_filled(c: &mut Criterion) {
    let d: Deferred<i32> = Deferred::filled(1);
    c.bench_function("deferred_upon_already_filled", |b| {
        b.iter(|| {
            d.upon(Immediate, |_| {});
        });
    });
}

fn upon_then_fill_many_subscribers(c: &mut Criterion) {
    c.bench_function("deferred_upon_then_fill_32_subscribers", |b| {
        b.iter(|| {
            let d: Deferred<i32> = Deferred::new();
            for _ in 0..32 {
                d.upon(Immediate, |_| {});
            }
            d.fill(1);
        });
    });
}

fn concurrent_subscribe_and_fill(c: &mut Criterion) {
    c.bench_function("deferred_concurrent_subscribe_and_fill", |b| {
        b.iter(|| {
            let d: Arc<Deferred<i32>> = Arc::new(Deferred::new());
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let d = Arc::clone(&d);
                    thread::spawn(move || d.upon(Immediate, |_| {}))
                })
                .collect();
            d.fill(1);
            for handle in handles {
                handle.join().unwrap();
            }
        });
    });
}

criterion_group!(
    benches,
    fill_and_peek,
    upon_already_filled,
    upon_then_fill_many_subscribers,
    concurrent_subscribe_and_fill
);
criterion_main!(benches);
