//! Parallel ingestion configuration.
//!
//! Bucketed `add_chunk` calls that touch many destinations can be split into
//! disjoint destination shards and processed on a thread pool. This module
//! decides when that is worthwhile and how many shards to use.

use serde::{Deserialize, Serialize};

/// Configuration for sharded parallel ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Minimum number of runs in one bucketed call before it is sharded.
    /// Default: 64
    pub run_threshold: usize,

    /// Maximum number of destination shards per call.
    /// Set to 0 to use the thread pool size.
    /// Default: 0
    pub max_shards: usize,

    /// Number of threads in the ingestion thread pool.
    /// Set to 0 to use the number of CPU cores.
    /// Default: 0 (CPU cores)
    pub thread_pool_size: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            run_threshold: 64,
            max_shards: 0,
            thread_pool_size: 0,
        }
    }
}

impl ParallelConfig {
    /// Creates a new ParallelConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a bucketed call with `run_count` runs should be sharded.
    pub fn should_parallelize(&self, run_count: usize) -> bool {
        run_count >= self.run_threshold && self.effective_max_shards() > 1
    }

    /// Returns the effective thread pool size.
    /// Returns num_cpus if thread_pool_size is 0.
    pub fn effective_thread_pool_size(&self) -> usize {
        if self.thread_pool_size == 0 {
            num_cpus::get()
        } else {
            self.thread_pool_size
        }
    }

    /// Returns the shard limit, falling back to the thread pool size.
    pub fn effective_max_shards(&self) -> usize {
        if self.max_shards == 0 {
            self.effective_thread_pool_size()
        } else {
            self.max_shards
        }
    }

    /// Returns the number of shards to cut `blocks` aligned state blocks into.
    pub fn effective_shards(&self, blocks: usize) -> usize {
        blocks.min(self.effective_max_shards()).max(1)
    }

    /// Creates a configuration that disables all parallelism.
    pub fn sequential() -> Self {
        Self {
            run_threshold: usize::MAX,
            max_shards: 1,
            thread_pool_size: 1,
        }
    }

    /// Builder method to set the run threshold.
    pub fn with_run_threshold(mut self, threshold: usize) -> Self {
        self.run_threshold = threshold;
        self
    }

    /// Builder method to set max shards.
    pub fn with_max_shards(mut self, max: usize) -> Self {
        self.max_shards = max;
        self
    }

    /// Builder method to set thread pool size.
    pub fn with_thread_pool_size(mut self, size: usize) -> Self {
        self.thread_pool_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ParallelConfig::default();
        assert_eq!(config.run_threshold, 64);
        assert_eq!(config.max_shards, 0);
        assert_eq!(config.thread_pool_size, 0);
    }

    #[test]
    fn test_should_parallelize() {
        let config = ParallelConfig::default().with_max_shards(4);

        assert!(!config.should_parallelize(63));
        assert!(config.should_parallelize(64));
        assert!(config.should_parallelize(1000));
    }

    #[test]
    fn test_single_shard_never_parallelizes() {
        let config = ParallelConfig::default().with_max_shards(1);
        assert!(!config.should_parallelize(10_000));
    }

    #[test]
    fn test_effective_shards() {
        let config = ParallelConfig::default().with_max_shards(8);

        assert_eq!(config.effective_shards(3), 3);
        assert_eq!(config.effective_shards(100), 8);
        assert_eq!(config.effective_shards(0), 1);
    }

    #[test]
    fn test_shards_follow_thread_pool() {
        let config = ParallelConfig::default().with_thread_pool_size(6);
        assert_eq!(config.effective_max_shards(), 6);
    }

    #[test]
    fn test_sequential_config() {
        let config = ParallelConfig::sequential();

        assert!(!config.should_parallelize(usize::MAX - 1));
        assert_eq!(config.effective_shards(1000), 1);
        assert_eq!(config.effective_thread_pool_size(), 1);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ParallelConfig::new()
            .with_run_threshold(10)
            .with_max_shards(16)
            .with_thread_pool_size(4);

        assert_eq!(config.run_threshold, 10);
        assert_eq!(config.max_shards, 16);
        assert_eq!(config.thread_pool_size, 4);
    }
}
