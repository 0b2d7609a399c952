//! The adaptive job queue: a façade over [`MutexJobQueue`] and
//! [`LockfreeJobQueue`] that starts on the mutex path and migrates to the
//! lock-free path (and back) as a background monitor thread observes
//! contention and latency drift, the same "start simple, promote under
//! load" shape the teacher pack uses for its `LockFreeStack::with_capacity`
//! vs. unbounded split, but applied to a whole queue implementation instead
//! of a construction parameter.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::QueueConfig;
use crate::error::{JobQueueError, Result};
use crate::item::JobExecutable;
use crate::mutex_queue::MutexJobQueue;
use crate::queue::{LockfreeJobQueue, MAX_BATCH_SIZE};
use crate::stats::{Counters, QueueStatistics};
use crate::traits::JobQueue;

type JobSlot = Box<dyn JobExecutable + Send>;

/// Lower bound on lock-acquisition wait considered "contended" on the
/// mutex path.
const CONTENTION_SAMPLE_THRESHOLD_NS: u64 = 100;
/// How often the monitor thread re-checks its stop flag while sleeping out
/// an evaluation interval, so `Drop` doesn't have to wait a full interval.
const MONITOR_TICK: Duration = Duration::from_millis(100);

/// Which underlying queue is presently servicing calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueType {
    Mutex,
    Lockfree,
}

impl QueueType {
    fn other(self) -> Self {
        match self {
            QueueType::Mutex => QueueType::Lockfree,
            QueueType::Lockfree => QueueType::Mutex,
        }
    }
}

impl From<u8> for QueueType {
    fn from(value: u8) -> Self {
        match value {
            0 => QueueType::Mutex,
            _ => QueueType::Lockfree,
        }
    }
}

impl From<QueueType> for u8 {
    fn from(value: QueueType) -> Self {
        match value {
            QueueType::Mutex => 0,
            QueueType::Lockfree => 1,
        }
    }
}

/// Observability surface specific to the adaptive strategy, on top of the
/// standard [`QueueStatistics`] every [`JobQueue`] exposes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveStatistics {
    pub current_type: QueueType,
    pub operation_count: u64,
    pub contention_count: u64,
    pub switch_count: u64,
    pub seconds_since_last_evaluation: f64,
}

struct AdaptiveMetrics {
    operation_count: AtomicU64,
    contention_count: AtomicU64,
    total_latency_ns: AtomicU64,
    switch_count: AtomicU64,
    lockfree_retry_baseline: AtomicU64,
    last_evaluation: Mutex<Instant>,
}

impl AdaptiveMetrics {
    fn new() -> Self {
        Self {
            operation_count: AtomicU64::new(0),
            contention_count: AtomicU64::new(0),
            total_latency_ns: AtomicU64::new(0),
            switch_count: AtomicU64::new(0),
            lockfree_retry_baseline: AtomicU64::new(0),
            last_evaluation: Mutex::new(Instant::now()),
        }
    }

    fn reset_after_evaluation(&self) {
        self.operation_count.store(0, Ordering::Relaxed);
        self.contention_count.store(0, Ordering::Relaxed);
        self.total_latency_ns.store(0, Ordering::Relaxed);
        *self.last_evaluation.lock().expect("adaptive metrics poisoned") = Instant::now();
    }
}

/// Façade holding both a [`MutexJobQueue`] and a [`LockfreeJobQueue`],
/// always constructed in `Adaptive` strategy: it starts on the mutex path
/// and owns a background monitor thread that migrates between the two as
/// contention and latency drift. Callers who want a strategy fixed for the
/// queue's whole lifetime should use [`crate::factory::create_job_queue`]
/// with `ForceMutex`/`ForceLockfree`/`Auto` instead, which hand back a bare
/// [`MutexJobQueue`]/[`LockfreeJobQueue`] with no façade or monitor thread.
pub struct AdaptiveJobQueue {
    mutex_queue: MutexJobQueue,
    lockfree_queue: LockfreeJobQueue,
    current_type: AtomicU8,
    stopped: AtomicBool,
    metrics: AdaptiveMetrics,
    counters: Counters,
    config: QueueConfig,
    monitor_stop: Arc<AtomicBool>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl AdaptiveJobQueue {
    pub fn new(config: QueueConfig) -> Arc<Self> {
        let lockfree_queue = LockfreeJobQueue::with_config(&config);
        let queue = Arc::new(Self {
            mutex_queue: MutexJobQueue::new(),
            lockfree_queue,
            current_type: AtomicU8::new(QueueType::Mutex.into()),
            stopped: AtomicBool::new(false),
            metrics: AdaptiveMetrics::new(),
            counters: Counters::default(),
            config,
            monitor_stop: Arc::new(AtomicBool::new(false)),
            monitor_handle: Mutex::new(None),
        });
        queue.clone().start_monitor();
        queue
    }

    pub fn current_type(&self) -> QueueType {
        QueueType::from(self.current_type.load(Ordering::Acquire))
    }

    pub fn adaptive_statistics(&self) -> AdaptiveStatistics {
        let last_evaluation = *self
            .metrics
            .last_evaluation
            .lock()
            .expect("adaptive metrics poisoned");
        AdaptiveStatistics {
            current_type: self.current_type(),
            operation_count: self.metrics.operation_count.load(Ordering::Relaxed),
            contention_count: self.metrics.contention_count.load(Ordering::Relaxed),
            switch_count: self.metrics.switch_count.load(Ordering::Relaxed),
            seconds_since_last_evaluation: last_evaluation.elapsed().as_secs_f64(),
        }
    }

    fn start_monitor(self: Arc<Self>) {
        let weak = Arc::downgrade(&self);
        let interval = self.config.evaluation_interval;
        let stop_flag = Arc::clone(&self.monitor_stop);
        let handle = thread::spawn(move || {
            let tick = MONITOR_TICK.min(interval);
            loop {
                let mut waited = Duration::ZERO;
                while waited < interval {
                    if stop_flag.load(Ordering::Acquire) {
                        return;
                    }
                    thread::sleep(tick);
                    waited += tick;
                }
                if stop_flag.load(Ordering::Acquire) {
                    return;
                }
                match weak.upgrade() {
                    Some(queue) => queue.evaluate_and_migrate(),
                    None => return,
                }
            }
        });
        *self
            .monitor_handle
            .lock()
            .expect("monitor handle mutex poisoned") = Some(handle);
    }

    /// Runs one round of the strategy-selection algorithm from §4.D:
    /// collects the window's contention ratio and average latency, decides
    /// whether to switch, migrates if so, then resets the window.
    fn evaluate_and_migrate(&self) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let ops = self.metrics.operation_count.load(Ordering::Relaxed);
        if ops < self.config.min_operations_for_switch {
            return;
        }

        let current = self.current_type();
        let avg_latency_ns =
            self.metrics.total_latency_ns.load(Ordering::Relaxed) as f64 / ops as f64;
        let contention_ratio = match current {
            QueueType::Mutex => {
                self.metrics.contention_count.load(Ordering::Relaxed) as f64 / ops as f64
            }
            QueueType::Lockfree => {
                let retries_now = self.lockfree_queue.statistics().retry_count;
                let baseline = self
                    .metrics
                    .lockfree_retry_baseline
                    .swap(retries_now, Ordering::Relaxed);
                retries_now.saturating_sub(baseline) as f64 / ops as f64
            }
        };

        let should_switch = match current {
            QueueType::Mutex => {
                contention_ratio > self.config.contention_threshold_high
                    && avg_latency_ns > self.config.latency_threshold_high_ns
            }
            QueueType::Lockfree => {
                contention_ratio < self.config.contention_threshold_low
                    && avg_latency_ns > 2.0 * self.config.latency_threshold_low_ns
            }
        };

        if should_switch {
            self.migrate(current, current.other(), contention_ratio, avg_latency_ns);
        }
        self.metrics.reset_after_evaluation();
    }

    /// Drains `from` into `to` with a single pass, then flips
    /// `current_type`. A producer racing this migration may still land an
    /// item in `from` after the pass finishes; it is picked up by
    /// [`Self::pop_from`]'s fallback read of the non-active queue, and
    /// swept fully on the next evaluation.
    fn migrate(&self, from: QueueType, to: QueueType, contention_ratio: f64, avg_latency_ns: f64) {
        let source: &dyn JobQueue = match from {
            QueueType::Mutex => &self.mutex_queue,
            QueueType::Lockfree => &self.lockfree_queue,
        };
        let dest: &dyn JobQueue = match to {
            QueueType::Mutex => &self.mutex_queue,
            QueueType::Lockfree => &self.lockfree_queue,
        };
        let mut migrated = 0u64;
        while let Ok(job) = source.dequeue() {
            if dest.enqueue(job).is_err() {
                break;
            }
            migrated += 1;
        }
        self.current_type.store(to.into(), Ordering::Release);
        self.metrics.switch_count.fetch_add(1, Ordering::Relaxed);
        info!(
            ?from,
            ?to,
            migrated,
            contention_ratio,
            avg_latency_ns,
            "adaptive queue switched strategy"
        );
    }

    fn push_to(&self, queue_type: QueueType, job: JobSlot) -> Result<bool> {
        match queue_type {
            QueueType::Mutex => {
                let (_, wait_ns) = self.mutex_queue.locked(|q| q.push_back(job));
                Ok(wait_ns > CONTENTION_SAMPLE_THRESHOLD_NS)
            }
            QueueType::Lockfree => {
                self.lockfree_queue.enqueue(job)?;
                Ok(false)
            }
        }
    }

    fn pop_from(&self, queue_type: QueueType) -> Option<(JobSlot, bool)> {
        match queue_type {
            QueueType::Mutex => {
                let (popped, wait_ns) = self.mutex_queue.locked(|q| q.pop_front());
                popped.map(|job| (job, wait_ns > CONTENTION_SAMPLE_THRESHOLD_NS))
            }
            QueueType::Lockfree => self.lockfree_queue.dequeue().ok().map(|job| (job, false)),
        }
    }
}

impl Drop for AdaptiveJobQueue {
    fn drop(&mut self) {
        self.monitor_stop.store(true, Ordering::Release);
        if let Some(handle) = self
            .monitor_handle
            .lock()
            .expect("monitor handle mutex poisoned")
            .take()
        {
            let _ = handle.join();
        }
    }
}

impl JobQueue for AdaptiveJobQueue {
    fn enqueue(&self, job: Box<dyn JobExecutable + Send>) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(JobQueueError::Stopped);
        }
        let start = Instant::now();
        let current = self.current_type();
        let result = self.push_to(current, job);
        let elapsed = start.elapsed().as_nanos() as u64;
        self.metrics.operation_count.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .total_latency_ns
            .fetch_add(elapsed, Ordering::Relaxed);
        match result {
            Ok(contended) => {
                if contended {
                    self.metrics.contention_count.fetch_add(1, Ordering::Relaxed);
                }
                self.counters.record_enqueue(elapsed, 0);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn enqueue_batch(&self, jobs: Vec<Box<dyn JobExecutable + Send>>) -> Result<usize> {
        if jobs.is_empty() {
            return Err(JobQueueError::InvalidArgument(
                "enqueue_batch called with an empty batch".into(),
            ));
        }
        if jobs.len() > MAX_BATCH_SIZE {
            return Err(JobQueueError::InvalidArgument(format!(
                "batch of {} exceeds MAX_BATCH_SIZE of {}",
                jobs.len(),
                MAX_BATCH_SIZE
            )));
        }
        if self.stopped.load(Ordering::Acquire) {
            return Err(JobQueueError::Stopped);
        }

        let start = Instant::now();
        let current = self.current_type();
        let count = jobs.len();
        let mut contention_hits = 0u64;
        for job in jobs {
            match self.push_to(current, job) {
                Ok(contended) => {
                    if contended {
                        contention_hits += 1;
                    }
                }
                Err(err) => return Err(err),
            }
        }
        let elapsed = start.elapsed().as_nanos() as u64;
        self.metrics
            .operation_count
            .fetch_add(count as u64, Ordering::Relaxed);
        self.metrics
            .total_latency_ns
            .fetch_add(elapsed, Ordering::Relaxed);
        self.metrics
            .contention_count
            .fetch_add(contention_hits, Ordering::Relaxed);
        self.counters.record_batch_enqueue(count, elapsed, 0);
        Ok(count)
    }

    fn dequeue(&self) -> Result<Box<dyn JobExecutable + Send>> {
        let start = Instant::now();
        let current = self.current_type();
        let popped = self
            .pop_from(current)
            .or_else(|| self.pop_from(current.other()));
        let elapsed = start.elapsed().as_nanos() as u64;
        self.metrics.operation_count.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .total_latency_ns
            .fetch_add(elapsed, Ordering::Relaxed);
        match popped {
            Some((job, contended)) => {
                if contended {
                    self.metrics.contention_count.fetch_add(1, Ordering::Relaxed);
                }
                self.counters.record_dequeue(elapsed, 0);
                Ok(job)
            }
            None => Err(if self.stopped.load(Ordering::Acquire) {
                JobQueueError::Stopped
            } else {
                JobQueueError::Empty
            }),
        }
    }

    fn dequeue_batch(&self, max: usize) -> Result<Vec<Box<dyn JobExecutable + Send>>> {
        let max = max.min(MAX_BATCH_SIZE);
        let start = Instant::now();
        let current = self.current_type();
        let mut out = Vec::with_capacity(max);
        let mut contention_hits = 0u64;
        while out.len() < max {
            match self.pop_from(current) {
                Some((job, contended)) => {
                    out.push(job);
                    if contended {
                        contention_hits += 1;
                    }
                }
                None => break,
            }
        }
        while out.len() < max {
            match self.pop_from(current.other()) {
                Some((job, _)) => out.push(job),
                None => break,
            }
        }
        let elapsed = start.elapsed().as_nanos() as u64;
        self.metrics
            .operation_count
            .fetch_add(out.len().max(1) as u64, Ordering::Relaxed);
        self.metrics
            .total_latency_ns
            .fetch_add(elapsed, Ordering::Relaxed);
        self.metrics
            .contention_count
            .fetch_add(contention_hits, Ordering::Relaxed);
        self.counters
            .record_batch_dequeue(out.len(), elapsed, 0);
        Ok(out)
    }

    fn len(&self) -> usize {
        self.counters.snapshot().current_size
    }

    fn clear(&self) {
        self.mutex_queue.clear();
        self.lockfree_queue.clear();
        self.counters.current_size.store(0, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.mutex_queue.stop();
        self.lockfree_queue.stop();
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn statistics(&self) -> QueueStatistics {
        self.counters.snapshot()
    }
}
