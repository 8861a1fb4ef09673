use criterion::{criterion_group, criterion_main};

mod task;

criterion_group!(
    benches,
    task::frame::bench_decode,
    task::frame::bench_encode,
    task::delivery::bench_drain_response
);
criterion_main!(benches);
