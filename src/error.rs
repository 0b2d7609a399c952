use thiserror::Error;

/// Errors surfaced at the job-queue boundary.
///
/// Every queue implementation in this crate (mutex-guarded, lock-free,
/// adaptive) returns this same type so callers can treat them
/// interchangeably behind the [`crate::JobQueue`] trait.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobQueueError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("queue has been stopped")]
    Stopped,

    #[error("queue is empty")]
    Empty,

    #[error("node pool allocation failed")]
    AllocationFailed,

    #[error("retry limit exceeded under contention")]
    RetryLimitExceeded,

    #[error("unexpected internal error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, JobQueueError>;

/// Error returned from [`crate::item::JobExecutable::execute`].
///
/// The queue never constructs or inspects this type; it exists purely for
/// callers driving work items to have something structured to propagate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("job execution failed: {0}")]
    ExecutionFailed(String),
}
