//! The strategy enum and the single constructor external callers need:
//! `create_job_queue` (and its config-carrying sibling
//! `create_job_queue_with_config`).

use std::sync::Arc;

use crate::adaptive::AdaptiveJobQueue;
use crate::config::QueueConfig;
use crate::mutex_queue::MutexJobQueue;
use crate::queue::LockfreeJobQueue;
use crate::traits::JobQueue;

/// Which queue implementation backs a handle returned by
/// [`create_job_queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueStrategy {
    /// Always use the mutex-guarded `VecDeque` queue.
    ForceMutex,
    /// Always use the lock-free Michael-Scott queue.
    ForceLockfree,
    /// Pick `Lockfree` if `std::thread::available_parallelism() >= 4`, else
    /// `Mutex`. The choice is made once, at construction time.
    Auto,
    /// Start on `Mutex` and let a background monitor thread migrate to
    /// `Lockfree` (and back) as contention and latency warrant. The
    /// default.
    #[default]
    Adaptive,
}

/// Builds a queue matching `strategy`, using [`QueueConfig::default()`] for
/// every tunable.
pub fn create_job_queue(strategy: QueueStrategy) -> Arc<dyn JobQueue> {
    create_job_queue_with_config(strategy, QueueConfig::default())
}

/// Builds a queue matching `strategy`, sized by `config`.
///
/// `ForceMutex`/`ForceLockfree`/`Auto` hand back a bare concrete queue with
/// no façade or monitor thread — the strategy is fixed for the handle's
/// whole lifetime. `Adaptive` hands back an [`AdaptiveJobQueue`], which owns
/// a background monitor thread for the lifetime of the returned handle.
pub fn create_job_queue_with_config(
    strategy: QueueStrategy,
    config: QueueConfig,
) -> Arc<dyn JobQueue> {
    match strategy {
        QueueStrategy::ForceMutex => Arc::new(MutexJobQueue::new()),
        QueueStrategy::ForceLockfree => Arc::new(LockfreeJobQueue::with_config(&config)),
        QueueStrategy::Auto => {
            let parallel = std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(1);
            if parallel >= 4 {
                Arc::new(LockfreeJobQueue::with_config(&config)) as Arc<dyn JobQueue>
            } else {
                Arc::new(MutexJobQueue::new()) as Arc<dyn JobQueue>
            }
        }
        QueueStrategy::Adaptive => AdaptiveJobQueue::new(config) as Arc<dyn JobQueue>,
    }
}
