//! Lock-free MPMC job queue (Michael & Scott's algorithm), backed by the
//! chunked [`crate::pool::NodePool`] for node storage and
//! [`crate::hazard::HazardPointerManager`] for safe reclamation instead of
//! a garbage collector or epoch system.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::Backoff;
use tracing::{trace, warn};

use crate::config::QueueConfig;
use crate::error::{JobQueueError, Result};
use crate::hazard::HazardPointerManager;
use crate::item::JobExecutable;
use crate::pool::{NodePool, Poolable};
use crate::stats::{Counters, QueueStatistics};
use crate::traits::JobQueue;

/// Upper bound on items moved by a single `enqueue_batch`/`dequeue_batch`
/// call.
pub const MAX_BATCH_SIZE: usize = 1024;
/// Retries within one CAS loop before backing off is abandoned in favor
/// of re-reading from scratch.
const RETRY_THRESHOLD: u32 = 16;
/// Hard ceiling on total retries across an operation before giving up
/// with [`JobQueueError::RetryLimitExceeded`].
const MAX_TOTAL_RETRIES: u64 = 1000;

type JobSlot = Box<dyn JobExecutable + Send>;

#[repr(align(64))]
pub(crate) struct Node {
    data: AtomicPtr<JobSlot>,
    next: AtomicPtr<Node>,
    version: AtomicU64,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            data: AtomicPtr::new(ptr::null_mut()),
            next: AtomicPtr::new(ptr::null_mut()),
            version: AtomicU64::new(0),
        }
    }
}

impl Poolable for Node {
    fn free_next(&self) -> &AtomicPtr<Self> {
        &self.next
    }

    fn reset(&self) {
        let old = self.data.swap(ptr::null_mut(), Ordering::AcqRel);
        if !old.is_null() {
            drop(unsafe { Box::from_raw(old) });
        }
        self.next.store(ptr::null_mut(), Ordering::Relaxed);
    }

    fn version(&self) -> &AtomicU64 {
        &self.version
    }
}

/// Lock-free MPMC queue. `enqueue`/`dequeue` are lock-free: some thread
/// always makes progress, though an individual caller may retry under
/// contention up to [`MAX_TOTAL_RETRIES`] times.
#[repr(align(64))]
pub struct LockfreeJobQueue {
    head: AtomicPtr<Node>,
    _pad1: [u8; 56],
    tail: AtomicPtr<Node>,
    _pad2: [u8; 56],
    pool: NodePool<Node>,
    hazards: HazardPointerManager<Node>,
    stopped: AtomicBool,
    counters: Counters,
}

impl LockfreeJobQueue {
    pub fn new() -> Self {
        Self::with_pool(NodePool::new(), HazardPointerManager::new())
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self::with_pool(NodePool::with_chunk_size(chunk_size), HazardPointerManager::new())
    }

    /// Builds a queue whose node pool and hazard manager are sized from a
    /// [`QueueConfig`], the constructor the [`crate::factory`] uses.
    pub fn with_config(config: &QueueConfig) -> Self {
        let mut pool = NodePool::with_capacity(config.initial_chunks, config.chunk_size);
        if let Some(max_chunks) = config.max_chunks {
            pool = pool.with_max_chunks(max_chunks);
        }
        let hazards = HazardPointerManager::with_capacity(
            config.max_threads,
            // The dequeue path holds three hazard handles at once (head,
            // next, tail) and enqueue holds two; pad one slot per thread
            // beyond what the caller asked for so `acquire` inside a single
            // operation never starves on `pointers_per_thread`.
            config.pointers_per_thread.max(3),
        );
        Self::with_pool(pool, hazards)
    }

    fn with_pool(pool: NodePool<Node>, hazards: HazardPointerManager<Node>) -> Self {
        let sentinel = pool
            .allocate()
            .expect("initial sentinel allocation cannot fail");
        Self {
            head: AtomicPtr::new(sentinel),
            _pad1: [0; 56],
            tail: AtomicPtr::new(sentinel),
            _pad2: [0; 56],
            pool,
            hazards,
            stopped: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub(crate) fn pool_statistics(&self) -> crate::pool::PoolStatistics {
        self.pool.statistics()
    }

    pub(crate) fn hazard_statistics(&self) -> crate::hazard::HazardStatistics {
        self.hazards.statistics()
    }

    fn retire_node(&self, node: *mut Node) {
        self.hazards.retire(node);
        self.hazards.scan_and_reclaim(|p| self.pool.deallocate(p));
    }

    fn enqueue_one(&self, slot_ptr: *mut JobSlot, new_node: *mut Node) -> Result<u64> {
        unsafe {
            (*new_node).data.store(slot_ptr, Ordering::Release);
            (*new_node).next.store(ptr::null_mut(), Ordering::Relaxed);
        }

        let hp_tail = self.hazards.acquire()?;
        let hp_next = self.hazards.acquire()?;
        let backoff = Backoff::new();
        let mut retries = 0u64;

        loop {
            let tail = hp_tail.protect(&self.tail);
            let tail_ref = unsafe { &*tail };
            let next = hp_next.protect(&tail_ref.next);

            if tail == self.tail.load(Ordering::Acquire) {
                if next.is_null() {
                    if tail_ref
                        .next
                        .compare_exchange(
                            ptr::null_mut(),
                            new_node,
                            Ordering::Release,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                    {
                        let _ = self.tail.compare_exchange(
                            tail,
                            new_node,
                            Ordering::Release,
                            Ordering::Relaxed,
                        );
                        return Ok(retries);
                    }
                } else {
                    let _ =
                        self.tail
                            .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
                }
            }

            retries += 1;
            if retries >= MAX_TOTAL_RETRIES {
                self.pool.deallocate(new_node);
                return Err(JobQueueError::RetryLimitExceeded);
            }
            if retries % RETRY_THRESHOLD as u64 == 0 {
                trace!(retries, "enqueue retry threshold reached, backing off");
            }
            backoff.spin();
        }
    }

    fn dequeue_one(&self) -> Result<JobSlot> {
        let hp_head = self.hazards.acquire()?;
        let hp_next = self.hazards.acquire()?;
        let hp_tail = self.hazards.acquire()?;
        let backoff = Backoff::new();
        let mut retries = 0u64;

        loop {
            let head = hp_head.protect(&self.head);
            if head != self.head.load(Ordering::Acquire) {
                retries += 1;
                backoff.spin();
                continue;
            }
            let tail = hp_tail.protect(&self.tail);
            let head_ref = unsafe { &*head };
            let next = hp_next.protect(&head_ref.next);

            if head == self.head.load(Ordering::Acquire) {
                if head == tail {
                    if next.is_null() {
                        return Err(if self.stopped.load(Ordering::Acquire) {
                            JobQueueError::Stopped
                        } else {
                            JobQueueError::Empty
                        });
                    }
                    let _ = self.tail.compare_exchange(
                        tail,
                        next,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                } else {
                    if next.is_null() {
                        retries += 1;
                        backoff.spin();
                        continue;
                    }
                    if self
                        .head
                        .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed)
                        .is_ok()
                    {
                        let slot_ptr =
                            unsafe { (*next).data.swap(ptr::null_mut(), Ordering::AcqRel) };
                        self.retire_node(head);
                        let job = unsafe { *Box::from_raw(slot_ptr) };
                        return Ok(job);
                    }
                }
            }

            retries += 1;
            if retries >= MAX_TOTAL_RETRIES {
                return Err(JobQueueError::RetryLimitExceeded);
            }
            if retries % RETRY_THRESHOLD as u64 == 0 {
                warn!(retries, "dequeue retry threshold reached, backing off");
            }
            backoff.spin();
        }
    }
}

impl Default for LockfreeJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LockfreeJobQueue {
    fn drop(&mut self) {
        while self.dequeue_one().is_ok() {}
        let sentinel = self.head.load(Ordering::Relaxed);
        self.pool.deallocate(sentinel);
    }
}

impl JobQueue for LockfreeJobQueue {
    fn enqueue(&self, job: Box<dyn JobExecutable + Send>) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(JobQueueError::Stopped);
        }
        let start = Instant::now();
        let new_node = self.pool.allocate()?;
        let slot_ptr = Box::into_raw(Box::new(job));
        match self.enqueue_one(slot_ptr, new_node) {
            Ok(retries) => {
                self.counters
                    .record_enqueue(start.elapsed().as_nanos() as u64, retries);
                Ok(())
            }
            Err(err) => {
                drop(unsafe { Box::from_raw(slot_ptr) });
                Err(err)
            }
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
        let count = jobs.len();
        let mut total_retries = 0u64;
        for job in jobs {
            let new_node = self.pool.allocate()?;
            let slot_ptr = Box::into_raw(Box::new(job));
            match self.enqueue_one(slot_ptr, new_node) {
                Ok(retries) => total_retries += retries,
                Err(err) => {
                    drop(unsafe { Box::from_raw(slot_ptr) });
                    return Err(err);
                }
            }
        }
        self.counters.record_batch_enqueue(
            count,
            start.elapsed().as_nanos() as u64,
            total_retries,
        );
        Ok(count)
    }

    fn dequeue(&self) -> Result<Box<dyn JobExecutable + Send>> {
        let start = Instant::now();
        let result = self.dequeue_one();
        if result.is_ok() {
            self.counters
                .record_dequeue(start.elapsed().as_nanos() as u64, 0);
        }
        result
    }

    fn dequeue_batch(&self, max: usize) -> Result<Vec<Box<dyn JobExecutable + Send>>> {
        let max = max.min(MAX_BATCH_SIZE);
        let start = Instant::now();
        let mut out = Vec::with_capacity(max);
        while out.len() < max {
            match self.dequeue_one() {
                Ok(job) => out.push(job),
                Err(_) => break,
            }
        }
        self.counters
            .record_batch_dequeue(out.len(), start.elapsed().as_nanos() as u64, 0);
        Ok(out)
    }

    fn len(&self) -> usize {
        self.counters.snapshot().current_size
    }

    fn clear(&self) {
        while self.dequeue_one().is_ok() {}
        self.counters.current_size.store(0, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn statistics(&self) -> QueueStatistics {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::FnJob;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn job(n: usize, out: Arc<AtomicUsize>) -> Box<dyn JobExecutable + Send> {
        Box::new(FnJob::new(move || {
            out.fetch_add(n, Ordering::Relaxed);
            Ok(())
        }))
    }

    #[test]
    fn fifo_order_single_threaded() {
        let queue = LockfreeJobQueue::new();
        let out = Arc::new(AtomicUsize::new(0));
        for i in 1..=5 {
            queue.enqueue(job(i, Arc::clone(&out))).unwrap();
        }
        let mut seen = Vec::new();
        while let Ok(j) = queue.dequeue() {
            let before = out.load(Ordering::Relaxed);
            j.execute().unwrap();
            seen.push(out.load(Ordering::Relaxed) - before);
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn dequeue_empty_queue_errs() {
        let queue = LockfreeJobQueue::new();
        assert_eq!(queue.dequeue().unwrap_err(), JobQueueError::Empty);
    }

    #[test]
    fn batch_enqueue_rejects_empty_and_oversized() {
        let queue = LockfreeJobQueue::new();
        assert_eq!(
            queue.enqueue_batch(vec![]).unwrap_err(),
            JobQueueError::InvalidArgument("enqueue_batch called with an empty batch".into())
        );
        let out = Arc::new(AtomicUsize::new(0));
        let too_many: Vec<_> = (0..MAX_BATCH_SIZE + 1)
            .map(|i| job(i, Arc::clone(&out)))
            .collect();
        assert!(matches!(
            queue.enqueue_batch(too_many),
            Err(JobQueueError::InvalidArgument(_))
        ));
    }

    #[test]
    fn batch_round_trip_preserves_count() {
        let queue = LockfreeJobQueue::new();
        let out = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<_> = (0..50).map(|i| job(i, Arc::clone(&out))).collect();
        let enqueued = queue.enqueue_batch(jobs).unwrap();
        assert_eq!(enqueued, 50);
        let drained = queue.dequeue_batch(100).unwrap();
        assert_eq!(drained.len(), 50);
    }

    #[test]
    fn clear_empties_the_queue() {
        let queue = LockfreeJobQueue::new();
        let out = Arc::new(AtomicUsize::new(0));
        queue.enqueue(job(1, Arc::clone(&out))).unwrap();
        queue.enqueue(job(2, out)).unwrap();
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.dequeue().unwrap_err(), JobQueueError::Empty);
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn dequeue_batch_never_errors_even_when_stopped_and_empty() {
        let queue = LockfreeJobQueue::new();
        queue.stop();
        let drained = queue.dequeue_batch(10).unwrap();
        assert!(drained.is_empty());
    }

    #[test]
    fn stop_drains_remaining_then_reports_stopped() {
        let queue = LockfreeJobQueue::new();
        let out = Arc::new(AtomicUsize::new(0));
        queue.enqueue(job(1, Arc::clone(&out))).unwrap();
        queue.enqueue(job(2, Arc::clone(&out))).unwrap();
        queue.stop();
        assert_eq!(queue.enqueue(job(3, out)).unwrap_err(), JobQueueError::Stopped);
        assert!(queue.dequeue().is_ok());
        assert!(queue.dequeue().is_ok());
        assert_eq!(queue.dequeue().unwrap_err(), JobQueueError::Stopped);
    }

    #[test]
    fn concurrent_mpmc_conserves_all_items() {
        use std::thread;

        let queue = Arc::new(LockfreeJobQueue::new());
        let out = Arc::new(AtomicUsize::new(0));
        let producers = 4;
        let per_producer = 200;

        let mut handles = Vec::new();
        for _ in 0..producers {
            let queue = Arc::clone(&queue);
            let out = Arc::clone(&out);
            handles.push(thread::spawn(move || {
                for i in 0..per_producer {
                    queue.enqueue(job(i, Arc::clone(&out))).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let mut consumed = 0usize;
        while consumed < producers * per_producer {
            if let Ok(j) = queue.dequeue() {
                j.execute().unwrap();
                consumed += 1;
            }
        }
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue().unwrap_err(), JobQueueError::Empty);
    }
}
