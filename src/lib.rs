//! A lock-free MPMC job queue with hazard-pointer reclamation, a chunked
//! node pool, and an adaptive mutex/lock-free strategy switcher.
//!
//! The crate is organized leaves-first, matching the dependency order each
//! module builds on:
//!
//! - [`pool`] — chunk-backed node allocator with a lock-free free list.
//! - [`hazard`] — hazard-pointer manager for safe reclamation of retired
//!   nodes.
//! - [`queue`] — the lock-free Michael-Scott MPMC queue built on the two
//!   above.
//! - [`mutex_queue`] — the mutex-guarded alternative the adaptive queue
//!   starts on.
//! - [`adaptive`] — the façade that migrates between the two as contention
//!   and latency warrant.
//! - [`factory`] — `create_job_queue`, the single entry point external
//!   callers need.
//!
//! None of this crate's types run work items; they only transport ownership
//! of `Box<dyn JobExecutable + Send>` handles between producers and whatever
//! drains the queue (a thread pool, external to this crate).
//!
//! ```
//! use lockfree_job_queue::{create_job_queue, FnJob, QueueStrategy};
//!
//! let queue = create_job_queue(QueueStrategy::Adaptive);
//! queue
//!     .enqueue(Box::new(FnJob::new(|| Ok(()))))
//!     .expect("enqueue should succeed");
//! let job = queue.dequeue().expect("dequeue should succeed");
//! job.execute().expect("job should run");
//! ```

pub mod adaptive;
pub mod config;
pub mod error;
pub mod factory;
pub mod hazard;
pub mod item;
pub mod mutex_queue;
pub mod pool;
pub mod queue;
pub mod stats;
pub mod traits;

pub use adaptive::{AdaptiveJobQueue, AdaptiveStatistics, QueueType};
pub use config::{QueueConfig, QueueConfigBuilder};
pub use error::{JobError, JobQueueError, Result};
pub use factory::{create_job_queue, create_job_queue_with_config, QueueStrategy};
pub use hazard::{HazardPointer, HazardPointerManager, HazardStatistics};
pub use item::{FnJob, JobExecutable};
pub use mutex_queue::MutexJobQueue;
pub use pool::{NodePool, PoolStatistics, Poolable};
pub use queue::{LockfreeJobQueue, MAX_BATCH_SIZE};
pub use stats::QueueStatistics;
pub use traits::JobQueue;
