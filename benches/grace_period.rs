use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use grace_domain::GraceDomain;

// Benchmark 1: synchronize latency on an idle domain (one full drain cycle)
fn bench_synchronize_idle(c: &mut Criterion) {
    c.bench_function("synchronize_idle", |b| {
        let domain = GraceDomain::new();

        b.iter(|| {
            domain.synchronize();
        });
    });

    c.bench_function("synchronize_expedited_idle", |b| {
        let domain = GraceDomain::new();

        b.iter(|| {
            domain.synchronize_expedited();
        });
    });
}

// Benchmark 2: synchronize while readers churn through short sections
fn bench_synchronize_under_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("synchronize_under_churn");
    group.sample_size(10);

    for num_readers in [1, 2, 4].iter() {
        group.bench_with_input(
            BenchmarkId::new("readers", num_readers),
            num_readers,
            |b, &num_readers| {
                let domain = Arc::new(GraceDomain::new());
                let stop = Arc::new(AtomicBool::new(false));

                let readers: Vec<_> = (0..num_readers)
                    .map(|_| {
                        let d = Arc::clone(&domain);
                        let stop = Arc::clone(&stop);
                        thread::spawn(move || {
                            while !stop.load(Ordering::Relaxed) {
                                let _guard = d.enter();
                                std::hint::spin_loop();
                            }
                        })
                    })
                    .collect();

                b.iter(|| {
                    domain.synchronize();
                });

                stop.store(true, Ordering::Relaxed);
                for reader in readers {
                    let _ = reader.join();
                }
            },
        );
    }

    group.finish();
}

// Benchmark 3: deferred-callback batch throughput, manually driven so one
// drive covers the whole batch
fn bench_defer_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("defer_batch");

    for batch in [64usize, 256, 1024].iter() {
        group.bench_with_input(BenchmarkId::new("batch", batch), batch, |b, &batch| {
            let domain = GraceDomain::builder().background_engine(false).build();

            b.iter(|| {
                for i in 0..batch {
                    domain.defer(move || {
                        black_box(i);
                    })
                    .unwrap();
                }
                domain.drive();
            });
        });
    }

    group.finish();
}

// Benchmark 4: cookie polling fast path
fn bench_poll_state(c: &mut Criterion) {
    c.bench_function("poll_state", |b| {
        let domain = GraceDomain::new();
        let cookie = domain.start_poll();
        domain.synchronize();

        b.iter(|| {
            black_box(domain.poll_state(cookie));
        });
    });
}

criterion_group!(
    benches,
    bench_synchronize_idle,
    bench_synchronize_under_churn,
    bench_defer_batch,
    bench_poll_state
);
criterion_main!(benches);
