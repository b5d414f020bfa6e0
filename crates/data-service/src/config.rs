use std::time::Duration;

use serde::{Deserialize, Serialize};

use slicer::PoolConfig;

/// `backend` section: limits on adapter calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Process-wide bound on concurrent adapter reads.
    pub max_concurrent_reads: usize,
    pub read_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Chunk reads one slice request may have in flight.
    pub max_parallel_chunks: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reads: 32,
            read_timeout_ms: 30_000,
            max_retries: 2,
            retry_delay_ms: 50,
            max_parallel_chunks: 8,
        }
    }
}

impl BackendConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_concurrent_reads: self.max_concurrent_reads,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}
