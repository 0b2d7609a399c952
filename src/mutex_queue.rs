//! Mutex-guarded FIFO queue. The simple half of the adaptive facade: a
//! `VecDeque` behind a `Mutex`, used when contention is low enough that the
//! lock-free queue's extra bookkeeping (node pool, hazard pointers) isn't
//! worth paying for.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::error::{JobQueueError, Result};
use crate::item::JobExecutable;
use crate::queue::MAX_BATCH_SIZE;
use crate::stats::{Counters, QueueStatistics};
use crate::traits::JobQueue;

type JobSlot = Box<dyn JobExecutable + Send>;

/// A plain mutex-guarded `VecDeque<JobSlot>` implementing [`JobQueue`].
///
/// Every operation takes the lock for its entire critical section; there is
/// no lock-free fast path here by design — that's what [`crate::queue::LockfreeJobQueue`]
/// is for.
pub struct MutexJobQueue {
    inner: Mutex<VecDeque<JobSlot>>,
    stopped: AtomicBool,
    counters: Counters,
}

impl MutexJobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            stopped: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// Locks the queue and measures how long acquiring the lock took,
    /// returning that wait alongside the closure's result. The adaptive
    /// queue uses this to sample contention on the mutex path the way
    /// lock-free mode samples retries.
    pub(crate) fn locked<R>(&self, f: impl FnOnce(&mut VecDeque<JobSlot>) -> R) -> (R, u64) {
        let wait_start = Instant::now();
        let mut guard = self.inner.lock().expect("mutex job queue poisoned");
        let wait_ns = wait_start.elapsed().as_nanos() as u64;
        (f(&mut guard), wait_ns)
    }
}

impl Default for MutexJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue for MutexJobQueue {
    fn enqueue(&self, job: Box<dyn JobExecutable + Send>) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(JobQueueError::Stopped);
        }
        let start = Instant::now();
        let (_, _wait_ns) = self.locked(|q| q.push_back(job));
        self.counters
            .record_enqueue(start.elapsed().as_nanos() as u64, 0);
        Ok(())
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
        let (_, _wait_ns) = self.locked(|q| q.extend(jobs));
        self.counters
            .record_batch_enqueue(count, start.elapsed().as_nanos() as u64, 0);
        Ok(count)
    }

    fn dequeue(&self) -> Result<Box<dyn JobExecutable + Send>> {
        let start = Instant::now();
        let (popped, _wait_ns) = self.locked(|q| q.pop_front());
        match popped {
            Some(job) => {
                self.counters
                    .record_dequeue(start.elapsed().as_nanos() as u64, 0);
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
        let (drained, _wait_ns) = self.locked(|q| {
            let n = max.min(q.len());
            q.drain(..n).collect::<Vec<_>>()
        });
        self.counters.record_batch_dequeue(
            drained.len(),
            start.elapsed().as_nanos() as u64,
            0,
        );
        Ok(drained)
    }

    fn len(&self) -> usize {
        self.inner.lock().expect("mutex job queue poisoned").len()
    }

    fn clear(&self) {
        self.locked(|q| q.clear());
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn statistics(&self) -> QueueStatistics {
        let mut snapshot = self.counters.snapshot();
        snapshot.current_size = self.len();
        snapshot
    }
}
