//! Shared counters surfaced by every [`crate::JobQueue`] implementation.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Snapshot of a queue's operational counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatistics {
    pub enqueue_count: u64,
    pub dequeue_count: u64,
    pub batch_enqueue_count: u64,
    pub batch_dequeue_count: u64,
    pub retry_count: u64,
    pub current_size: usize,
    pub total_enqueue_latency_ns: u64,
    pub total_dequeue_latency_ns: u64,
}

impl QueueStatistics {
    pub fn average_enqueue_latency_ns(&self) -> f64 {
        if self.enqueue_count == 0 {
            0.0
        } else {
            self.total_enqueue_latency_ns as f64 / self.enqueue_count as f64
        }
    }

    pub fn average_dequeue_latency_ns(&self) -> f64 {
        if self.dequeue_count == 0 {
            0.0
        } else {
            self.total_dequeue_latency_ns as f64 / self.dequeue_count as f64
        }
    }
}

/// Lock-free counters accumulated while the queue runs; `snapshot` produces
/// the `Copy` struct callers actually read.
#[derive(Default)]
pub(crate) struct Counters {
    pub enqueue_count: AtomicU64,
    pub dequeue_count: AtomicU64,
    pub batch_enqueue_count: AtomicU64,
    pub batch_dequeue_count: AtomicU64,
    pub retry_count: AtomicU64,
    pub current_size: AtomicUsize,
    pub total_enqueue_latency_ns: AtomicU64,
    pub total_dequeue_latency_ns: AtomicU64,
}

impl Counters {
    pub fn snapshot(&self) -> QueueStatistics {
        QueueStatistics {
            enqueue_count: self.enqueue_count.load(Ordering::Relaxed),
            dequeue_count: self.dequeue_count.load(Ordering::Relaxed),
            batch_enqueue_count: self.batch_enqueue_count.load(Ordering::Relaxed),
            batch_dequeue_count: self.batch_dequeue_count.load(Ordering::Relaxed),
            retry_count: self.retry_count.load(Ordering::Relaxed),
            current_size: self.current_size.load(Ordering::Relaxed),
            total_enqueue_latency_ns: self.total_enqueue_latency_ns.load(Ordering::Relaxed),
            total_dequeue_latency_ns: self.total_dequeue_latency_ns.load(Ordering::Relaxed),
        }
    }

    pub fn record_enqueue(&self, latency_ns: u64, retries: u64) {
        self.enqueue_count.fetch_add(1, Ordering::Relaxed);
        self.current_size.fetch_add(1, Ordering::Relaxed);
        self.total_enqueue_latency_ns
            .fetch_add(latency_ns, Ordering::Relaxed);
        if retries > 0 {
            self.retry_count.fetch_add(retries, Ordering::Relaxed);
        }
    }

    pub fn record_dequeue(&self, latency_ns: u64, retries: u64) {
        self.dequeue_count.fetch_add(1, Ordering::Relaxed);
        self.current_size.fetch_sub(1, Ordering::Relaxed);
        self.total_dequeue_latency_ns
            .fetch_add(latency_ns, Ordering::Relaxed);
        if retries > 0 {
            self.retry_count.fetch_add(retries, Ordering::Relaxed);
        }
    }

    pub fn record_batch_enqueue(&self, count: usize, latency_ns: u64, retries: u64) {
        self.batch_enqueue_count.fetch_add(1, Ordering::Relaxed);
        self.enqueue_count.fetch_add(count as u64, Ordering::Relaxed);
        self.current_size.fetch_add(count, Ordering::Relaxed);
        self.total_enqueue_latency_ns
            .fetch_add(latency_ns, Ordering::Relaxed);
        if retries > 0 {
            self.retry_count.fetch_add(retries, Ordering::Relaxed);
        }
    }

    pub fn record_batch_dequeue(&self, count: usize, latency_ns: u64, retries: u64) {
        self.batch_dequeue_count.fetch_add(1, Ordering::Relaxed);
        self.dequeue_count.fetch_add(count as u64, Ordering::Relaxed);
        self.current_size.fetch_sub(count, Ordering::Relaxed);
        self.total_dequeue_latency_ns
            .fetch_add(latency_ns, Ordering::Relaxed);
        if retries > 0 {
            self.retry_count.fetch_add(retries, Ordering::Relaxed);
        }
    }
}
