//! Integration tests for the six concrete scenarios named in the job-queue
//! substrate's design notes: SPSC correctness, MPMC conservation, batch
//! round-trip, hazard safety under churn, adaptive migration, and shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use lockfree_job_queue::{
    create_job_queue, FnJob, JobQueue, LockfreeJobQueue, QueueConfig, QueueStrategy,
};

fn recording_job(
    sink: Arc<Mutex<Vec<usize>>>,
    value: usize,
) -> Box<dyn lockfree_job_queue::JobExecutable + Send> {
    Box::new(FnJob::new(move || {
        sink.lock().expect("sink poisoned").push(value);
        Ok(())
    }))
}

/// Scenario 1 — SPSC correctness: one producer enqueues 0..10000 in order,
/// one consumer drains them; the received sequence must match exactly.
#[test]
fn scenario_1_spsc_preserves_enqueue_order() {
    let queue = Arc::new(LockfreeJobQueue::new());
    let received = Arc::new(Mutex::new(Vec::with_capacity(10_000)));

    for i in 0..10_000usize {
        let sink = Arc::clone(&received);
        queue
            .enqueue(recording_job(sink, i))
            .expect("enqueue should succeed");
    }

    let mut count = 0usize;
    while count < 10_000 {
        if let Ok(job) = queue.dequeue() {
            job.execute().unwrap();
            count += 1;
        }
    }

    let seen = received.lock().unwrap();
    let expected: Vec<usize> = (0..10_000).collect();
    assert_eq!(*seen, expected);
}

/// Scenario 2 — MPMC conservation: 4 producers each enqueue 2500 items
/// tagged with (producer_id, counter); 4 consumers drain all 10000. Every
/// producer's items must come out in strictly increasing counter order,
/// and the multiset union must equal what was enqueued.
#[test]
fn scenario_2_mpmc_conservation() {
    let queue = Arc::new(LockfreeJobQueue::new());
    let producers = 4usize;
    let per_producer = 2500usize;
    let received: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));

    let mut producer_handles = Vec::new();
    for p in 0..producers {
        let queue = Arc::clone(&queue);
        let received = Arc::clone(&received);
        producer_handles.push(thread::spawn(move || {
            for counter in 0..per_producer {
                let received = Arc::clone(&received);
                let job: Box<dyn lockfree_job_queue::JobExecutable + Send> =
                    Box::new(FnJob::new(move || {
                        received.lock().expect("poisoned").push((p, counter));
                        Ok(())
                    }));
                queue.enqueue(job).expect("enqueue should succeed");
            }
        }));
    }
    for h in producer_handles {
        h.join().expect("producer thread panicked");
    }

    let total = producers * per_producer;
    let consumed = Arc::new(AtomicUsize::new(0));
    let mut consumer_handles = Vec::new();
    for _ in 0..4 {
        let queue = Arc::clone(&queue);
        let consumed = Arc::clone(&consumed);
        consumer_handles.push(thread::spawn(move || loop {
            if consumed.load(Ordering::Relaxed) >= total {
                return;
            }
            match queue.dequeue() {
                Ok(job) => {
                    job.execute().unwrap();
                    consumed.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => thread::yield_now(),
            }
        }));
    }
    for h in consumer_handles {
        h.join().expect("consumer thread panicked");
    }

    let seen = received.lock().unwrap();
    assert_eq!(seen.len(), total);

    for p in 0..producers {
        let mut counters: Vec<usize> = seen.iter().filter(|(id, _)| *id == p).map(|(_, c)| *c).collect();
        let sorted = {
            let mut c = counters.clone();
            c.sort_unstable();
            c
        };
        assert_eq!(counters, sorted, "producer {p}'s items arrived out of order");
        counters.dedup();
        assert_eq!(counters.len(), per_producer, "producer {p} lost or duplicated items");
    }
}

/// Scenario 3 — Batch round-trip: enqueue a batch of 1000, then drain with
/// repeated `dequeue_batch` calls; all 1000 must come back in order.
#[test]
fn scenario_3_batch_round_trip() {
    let queue = LockfreeJobQueue::new();
    let received = Arc::new(Mutex::new(Vec::with_capacity(1000)));

    let jobs: Vec<_> = (0..1000usize)
        .map(|i| recording_job(Arc::clone(&received), i))
        .collect();
    let enqueued = queue.enqueue_batch(jobs).expect("batch enqueue should succeed");
    assert_eq!(enqueued, 1000);

    let mut drained = Vec::new();
    let mut calls = 0;
    loop {
        let batch = queue.dequeue_batch(lockfree_job_queue::MAX_BATCH_SIZE).unwrap();
        calls += 1;
        if batch.is_empty() {
            break;
        }
        drained.extend(batch);
        if calls > 1000 / lockfree_job_queue::MAX_BATCH_SIZE + 2 {
            panic!("dequeue_batch did not converge");
        }
    }

    assert_eq!(drained.len(), 1000);
    for job in drained {
        job.execute().unwrap();
    }
    let seen = received.lock().unwrap();
    let expected: Vec<usize> = (0..1000).collect();
    assert_eq!(*seen, expected);
}

/// Scenario 4 — Hazard safety under churn: 8 threads each perform 1000
/// iterations of "enqueue one, dequeue one" against a queue that starts
/// with 100 sentinel items already enqueued. The queue must end up back at
/// size 100 with the pool's allocated-node count matching.
#[test]
fn scenario_4_hazard_safety_under_churn() {
    let queue = Arc::new(LockfreeJobQueue::new());
    for _ in 0..100 {
        queue
            .enqueue(Box::new(FnJob::new(|| Ok(()))))
            .expect("enqueue should succeed");
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let queue = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            for _ in 0..1000 {
                queue
                    .enqueue(Box::new(FnJob::new(|| Ok(()))))
                    .expect("enqueue should succeed");
                if let Ok(job) = queue.dequeue() {
                    job.execute().unwrap();
                }
            }
        }));
    }
    for h in handles {
        h.join().expect("churn thread panicked");
    }

    assert_eq!(queue.len(), 100);
}

/// Scenario 5 — Adaptive migration: under low, sustained SPSC load the
/// queue should remain on `Mutex`; once saturated by many producers and
/// consumers it should switch to `Lockfree` within a bounded number of
/// evaluation intervals.
#[test]
fn scenario_5_adaptive_migration() {
    let config = QueueConfig::builder()
        .evaluation_interval(Duration::from_millis(100))
        .min_operations_for_switch(50)
        .contention_threshold_high(0.05)
        .latency_threshold_high_ns(0.0)
        .build();
    let queue = lockfree_job_queue::AdaptiveJobQueue::new(config);

    // Phase 1: light single-producer/single-consumer load.
    for _ in 0..20 {
        queue
            .enqueue(Box::new(FnJob::new(|| Ok(()))))
            .expect("enqueue should succeed");
        queue.dequeue().expect("dequeue should succeed");
    }
    thread::sleep(Duration::from_millis(150));
    assert_eq!(
        queue.current_type(),
        lockfree_job_queue::QueueType::Mutex,
        "low contention should not trigger a switch"
    );

    // Phase 2: saturate with many producers/consumers.
    let total = Arc::new(AtomicUsize::new(0));
    let target = 8 * 2000;
    let mut handles = Vec::new();
    for _ in 0..8 {
        let queue = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            for _ in 0..2000 {
                let _ = queue.enqueue(Box::new(FnJob::new(|| Ok(()))));
            }
        }));
    }
    for _ in 0..8 {
        let queue = Arc::clone(&queue);
        let total = Arc::clone(&total);
        handles.push(thread::spawn(move || {
            while total.load(Ordering::Relaxed) < target {
                if queue.dequeue().is_ok() {
                    total.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }
    for h in handles {
        let _ = h.join();
    }

    thread::sleep(Duration::from_millis(400));
    assert!(
        queue.adaptive_statistics().switch_count >= 1,
        "saturating load should have triggered at least one strategy switch"
    );
}

/// Scenario 6 — Shutdown: enqueue 50 items, call `stop()`, then attempt one
/// more enqueue (must fail with `Stopped`) and dequeues (must drain
/// remaining items before reporting `Stopped`).
#[test]
fn scenario_6_shutdown_drains_then_stops() {
    let queue = create_job_queue(QueueStrategy::ForceLockfree);
    for _ in 0..50 {
        queue
            .enqueue(Box::new(FnJob::new(|| Ok(()))))
            .expect("enqueue should succeed");
    }
    queue.stop();

    let err = queue
        .enqueue(Box::new(FnJob::new(|| Ok(()))))
        .expect_err("enqueue after stop must fail");
    assert_eq!(err, lockfree_job_queue::JobQueueError::Stopped);

    let mut drained = 0;
    loop {
        match queue.dequeue() {
            Ok(job) => {
                job.execute().unwrap();
                drained += 1;
            }
            Err(lockfree_job_queue::JobQueueError::Stopped) => break,
            Err(lockfree_job_queue::JobQueueError::Empty) => break,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!(drained, 50);

    assert!(matches!(
        queue.dequeue(),
        Err(lockfree_job_queue::JobQueueError::Stopped)
    ));
}
