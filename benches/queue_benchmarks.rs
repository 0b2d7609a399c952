use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use lockfree_job_queue::{FnJob, JobQueue, LockfreeJobQueue, MutexJobQueue};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn custom_criterion() -> Criterion {
    Criterion::default()
        .sample_size(10)
        .measurement_time(Duration::from_secs(1))
        .warm_up_time(Duration::from_secs(1))
}

fn noop_job() -> Box<dyn lockfree_job_queue::JobExecutable + Send> {
    Box::new(FnJob::new(|| Ok(())))
}

fn bench_single_threaded(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_threaded");
    group.measurement_time(Duration::from_secs(1));
    group.warm_up_time(Duration::from_secs(1));
    group.sample_size(10);

    group.bench_function("lockfree_enqueue", |b| {
        b.iter_batched(
            LockfreeJobQueue::new,
            |queue| queue.enqueue(noop_job()).expect("enqueue should succeed"),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("mutex_enqueue", |b| {
        b.iter_batched(
            MutexJobQueue::new,
            |queue| queue.enqueue(noop_job()).expect("enqueue should succeed"),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("lockfree_enqueue_dequeue", |b| {
        b.iter_batched(
            LockfreeJobQueue::new,
            |queue| {
                queue.enqueue(noop_job()).expect("enqueue should succeed");
                let _ = queue.dequeue();
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("mutex_enqueue_dequeue", |b| {
        b.iter_batched(
            MutexJobQueue::new,
            |queue| {
                queue.enqueue(noop_job()).expect("enqueue should succeed");
                let _ = queue.dequeue();
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");

    for threads in [2, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::new("lockfree_mixed", threads),
            threads,
            |b, &threads| {
                b.iter_batched(
                    || Arc::new(LockfreeJobQueue::new()),
                    |queue| {
                        let handles: Vec<_> = (0..threads)
                            .map(|_| {
                                let queue = Arc::clone(&queue);
                                thread::spawn(move || {
                                    for _ in 0..50 {
                                        let _ = queue.enqueue(noop_job());
                                        let _ = queue.dequeue();
                                    }
                                })
                            })
                            .collect();
                        for h in handles {
                            h.join().expect("worker thread panicked");
                        }
                    },
                    BatchSize::SmallInput,
                );
            },
        );

        group.bench_with_input(
            BenchmarkId::new("mutex_mixed", threads),
            threads,
            |b, &threads| {
                b.iter_batched(
                    || Arc::new(MutexJobQueue::new()),
                    |queue| {
                        let handles: Vec<_> = (0..threads)
                            .map(|_| {
                                let queue = Arc::clone(&queue);
                                thread::spawn(move || {
                                    for _ in 0..50 {
                                        let _ = queue.enqueue(noop_job());
                                        let _ = queue.dequeue();
                                    }
                                })
                            })
                            .collect();
                        for h in handles {
                            h.join().expect("worker thread panicked");
                        }
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

fn bench_adaptive_migration(c: &mut Criterion) {
    use lockfree_job_queue::{create_job_queue, QueueStrategy};

    let mut group = c.benchmark_group("adaptive_migration");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(2));

    group.bench_function("adaptive_burst", |b| {
        b.iter_batched(
            || create_job_queue(QueueStrategy::Adaptive),
            |queue| {
                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        let queue = Arc::clone(&queue);
                        thread::spawn(move || {
                            for _ in 0..100 {
                                let _ = queue.enqueue(noop_job());
                                let _ = queue.dequeue();
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().expect("worker thread panicked");
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = custom_criterion();
    targets = bench_single_threaded, bench_concurrent, bench_adaptive_migration
}
criterion_main!(benches);
