//! Tunables for queue construction, gathered behind a builder so callers
//! don't have to remember which knob belongs to which component.

use crate::hazard::{DEFAULT_MAX_THREADS, DEFAULT_POINTERS_PER_THREAD};
use crate::pool::{DEFAULT_CHUNK_SIZE, DEFAULT_INITIAL_CHUNKS};
use std::time::Duration;

pub const DEFAULT_EVALUATION_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MIN_OPERATIONS_FOR_SWITCH: u64 = 1000;
pub const DEFAULT_CONTENTION_THRESHOLD_HIGH: f64 = 0.10;
pub const DEFAULT_CONTENTION_THRESHOLD_LOW: f64 = 0.05;
pub const DEFAULT_LATENCY_THRESHOLD_HIGH_NS: f64 = 1000.0;
pub const DEFAULT_LATENCY_THRESHOLD_LOW_NS: f64 = 500.0;

/// Construction parameters for any [`crate::JobQueue`] implementation.
///
/// A single struct gathers every tunable named across the node pool, the
/// hazard pointer manager and the adaptive strategy, so `create_job_queue`
/// only has one parameter to thread through.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Hazard pointer manager: maximum number of distinct threads that may
    /// hold a hazard record at once.
    pub max_threads: usize,
    /// Hazard pointer manager: protection slots available per thread.
    pub pointers_per_thread: usize,
    /// Node pool: number of cells per chunk.
    pub chunk_size: usize,
    /// Node pool: chunks pre-allocated at construction time.
    pub initial_chunks: usize,
    /// Node pool: optional ceiling on total chunks (`None` = unbounded).
    pub max_chunks: Option<usize>,
    /// Adaptive strategy: how often the monitor thread re-evaluates.
    pub evaluation_interval: Duration,
    /// Adaptive strategy: operations required before the monitor acts.
    pub min_operations_for_switch: u64,
    /// Adaptive strategy: contention ratio above which `Mutex` switches to
    /// `Lockfree`.
    pub contention_threshold_high: f64,
    /// Adaptive strategy: contention ratio below which `Lockfree` switches
    /// back to `Mutex`.
    pub contention_threshold_low: f64,
    /// Adaptive strategy: average latency (ns) required, alongside
    /// `contention_threshold_high`, to switch to `Lockfree`.
    pub latency_threshold_high_ns: f64,
    /// Adaptive strategy: average latency (ns) required, alongside
    /// `contention_threshold_low`, to switch back to `Mutex`. The actual
    /// comparison uses `2 * latency_threshold_low_ns`.
    pub latency_threshold_low_ns: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_threads: DEFAULT_MAX_THREADS,
            pointers_per_thread: DEFAULT_POINTERS_PER_THREAD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            initial_chunks: DEFAULT_INITIAL_CHUNKS,
            max_chunks: None,
            evaluation_interval: DEFAULT_EVALUATION_INTERVAL,
            min_operations_for_switch: DEFAULT_MIN_OPERATIONS_FOR_SWITCH,
            contention_threshold_high: DEFAULT_CONTENTION_THRESHOLD_HIGH,
            contention_threshold_low: DEFAULT_CONTENTION_THRESHOLD_LOW,
            latency_threshold_high_ns: DEFAULT_LATENCY_THRESHOLD_HIGH_NS,
            latency_threshold_low_ns: DEFAULT_LATENCY_THRESHOLD_LOW_NS,
        }
    }
}

impl QueueConfig {
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    pub fn max_threads(mut self, max_threads: usize) -> Self {
        self.config.max_threads = max_threads;
        self
    }

    pub fn pointers_per_thread(mut self, pointers_per_thread: usize) -> Self {
        self.config.pointers_per_thread = pointers_per_thread;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    pub fn initial_chunks(mut self, initial_chunks: usize) -> Self {
        self.config.initial_chunks = initial_chunks;
        self
    }

    pub fn max_chunks(mut self, max_chunks: usize) -> Self {
        self.config.max_chunks = Some(max_chunks);
        self
    }

    pub fn evaluation_interval(mut self, interval: Duration) -> Self {
        self.config.evaluation_interval = interval;
        self
    }

    pub fn min_operations_for_switch(mut self, ops: u64) -> Self {
        self.config.min_operations_for_switch = ops;
        self
    }

    pub fn contention_threshold_high(mut self, threshold: f64) -> Self {
        self.config.contention_threshold_high = threshold;
        self
    }

    pub fn contention_threshold_low(mut self, threshold: f64) -> Self {
        self.config.contention_threshold_low = threshold;
        self
    }

    pub fn latency_threshold_high_ns(mut self, threshold: f64) -> Self {
        self.config.latency_threshold_high_ns = threshold;
        self
    }

    pub fn latency_threshold_low_ns(mut self, threshold: f64) -> Self {
        self.config.latency_threshold_low_ns = threshold;
        self
    }

    pub fn build(self) -> QueueConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_constants() {
        let config = QueueConfig::default();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.max_threads, DEFAULT_MAX_THREADS);
        assert_eq!(
            config.min_operations_for_switch,
            DEFAULT_MIN_OPERATIONS_FOR_SWITCH
        );
    }

    #[test]
    fn builder_overrides_individual_fields() {
        let config = QueueConfig::builder()
            .chunk_size(512)
            .max_threads(16)
            .contention_threshold_high(0.2)
            .build();
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.max_threads, 16);
        assert_eq!(config.contention_threshold_high, 0.2);
        assert_eq!(config.pointers_per_thread, DEFAULT_POINTERS_PER_THREAD);
    }
}
