use criterion::{Criterion, criterion_group, criterion_main};
use loadcrab::{CoreMonitor, Monitor, RateLimiter};
use std::hint::black_box;

fn bench_monitor(c: &mut Criterion) {
    let monitor = CoreMonitor::new();
    c.bench_function("monitor_inc_read_success", |b| {
        b.iter(|| {
            monitor.inc_read_success();
        });
    });
    c.bench_function("monitor_record_latency", |b| {
        let mut micros = 1u64;
        b.iter(|| {
            monitor.record_read_latency(black_box(micros));
            micros = micros % 10_000 + 1;
        });
    });
    c.bench_function("monitor_snapshot", |b| {
        b.iter(|| black_box(monitor.snapshot()));
    });
}

fn bench_limiter(c: &mut Criterion) {
    c.bench_function("limiter_try_acquire_unlimited", |b| {
        let limiter = RateLimiter::new(0.0);
        b.iter(|| black_box(limiter.try_acquire()));
    });
    c.bench_function("limiter_try_acquire_limited", |b| {
        // High rate so most attempts find a free slot
        let limiter = RateLimiter::new(50_000_000.0);
        b.iter(|| black_box(limiter.try_acquire()));
    });
    c.bench_function("limiter_set_rate", |b| {
        let limiter = RateLimiter::new(1000.0);
        let mut rate = 1000.0;
        b.iter(|| {
            limiter.set_rate(black_box(rate));
            rate = if rate > 5000.0 { 1000.0 } else { rate + 1.0 };
        });
    });
}

criterion_group!(benches, bench_monitor, bench_limiter);
criterion_main!(benches);
