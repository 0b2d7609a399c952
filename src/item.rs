use crate::error::JobError;
use std::sync::Mutex;

/// A unit of work transported through the queue.
///
/// The queue only ever moves `Box<dyn JobExecutable + Send>` handles around;
/// it never calls [`execute`](JobExecutable::execute) itself. That call is
/// the responsibility of whatever worker loop drains the queue.
pub trait JobExecutable: Send {
    /// Runs the job. The queue never invokes this — it is here purely as
    /// the contract external consumers (worker threads) rely on.
    fn execute(&self) -> Result<(), JobError>;
}

/// Adapts a plain closure into a [`JobExecutable`], mirroring the
/// `Job(Box<dyn FnOnce() + Send>)` wrapper idiom used by the thread-pool
/// lab this crate's demo binary draws on.
pub struct FnJob<F>(Mutex<Option<F>>)
where
    F: FnOnce() -> Result<(), JobError> + Send;

impl<F> FnJob<F>
where
    F: FnOnce() -> Result<(), JobError> + Send,
{
    pub fn new(f: F) -> Self {
        Self(Mutex::new(Some(f)))
    }
}

impl<F> JobExecutable for FnJob<F>
where
    F: FnOnce() -> Result<(), JobError> + Send,
{
    fn execute(&self) -> Result<(), JobError> {
        let f = self
            .0
            .lock()
            .expect("FnJob mutex poisoned")
            .take()
            .expect("FnJob executed more than once");
        f()
    }
}
