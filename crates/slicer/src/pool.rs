//! Bounded pool for backend reads.
//!
//! Every adapter read in the process goes through one [`BackendPool`]. The
//! semaphore bound caps concurrent backend calls; excess reads queue on the
//! semaphore instead of piling onto the backend.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use adapters::{Adapter, Chunk, ReadRequest};
use tree_common::{BackendError, NodePath};

/// Configuration for the backend pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum adapter reads in flight across all requests
    pub max_concurrent_reads: usize,
    /// Per-call timeout
    pub read_timeout: Duration,
    /// Retries for transient failures (0 disables retrying)
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry)
    pub retry_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reads: 32,
            read_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Clone)]
pub struct BackendPool {
    semaphore: Arc<Semaphore>,
    config: PoolConfig,
}

impl BackendPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_reads.max(1))),
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Permits not currently held by a read.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Issue one adapter read, with timeout and bounded retry of transient
    /// failures. Non-transient failures are returned immediately.
    pub async fn read(
        &self,
        path: &NodePath,
        adapter: &Arc<dyn Adapter>,
        request: &ReadRequest,
    ) -> Result<Chunk, BackendError> {
        let mut retry_count = 0;
        let mut delay = self.config.retry_delay;

        loop {
            let result = {
                let _permit = self
                    .semaphore
                    .acquire()
                    .await
                    .map_err(|_| BackendError::permanent(path.clone(), "backend pool is closed"))?;

                let started = Instant::now();
                match tokio::time::timeout(self.config.read_timeout, adapter.read(request)).await {
                    Ok(Ok(chunk)) => {
                        metrics::histogram!("backend_read_seconds")
                            .record(started.elapsed().as_secs_f64());
                        return Ok(chunk);
                    }
                    Ok(Err(e)) => e.at(path),
                    Err(_) => {
                        metrics::counter!("backend_timeouts_total").increment(1);
                        BackendError::timeout(path.clone(), started.elapsed())
                    }
                }
            };

            if !result.transient || retry_count >= self.config.max_retries {
                debug!(path = %path, error = %result.message, retries = retry_count, "Backend read failed");
                return Err(result);
            }

            retry_count += 1;
            metrics::counter!("backend_retries_total").increment(1);
            warn!(
                path = %path,
                error = %result.message,
                retry = retry_count,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Transient backend failure, retrying"
            );

            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }
}

impl Default for BackendPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
