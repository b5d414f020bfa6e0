//! In-memory result cache with per-key single-flight computation.
//!
//! ## Lookup
//!
//! Entries live in an LRU index keyed by `(path, slice, format)`. Each entry
//! remembers the content version it was computed under and a crc32 of its
//! bytes. A lookup carrying a different version is a miss and drops the
//! entry; a checksum mismatch is logged as corruption and also treated as a
//! miss.
//!
//! ## Single flight
//!
//! The first miss for a full [`CacheKey`] spawns the computation on the
//! runtime and publishes a shared handle to it. Later requests for the same
//! key await that handle instead of computing again. The spawned task stores
//! the result and retires the handle itself, so it runs to completion even
//! when every waiter has gone away. Failures are handed to every waiter and
//! never stored.
//!
//! ## Eviction
//!
//! Least recently used entries are evicted until both `max_entries` and
//! `max_bytes` hold. A single result larger than `max_bytes` is returned to
//! its callers but not stored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use tree_common::{ContentVersion, DataError, DataResult};

use crate::key::{CacheKey, SlotKey};

type SharedComputation = Shared<BoxFuture<'static, DataResult<Bytes>>>;

/// `cache` section of the service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_bytes_mb: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes_mb: 256,
            max_entries: 10_000,
        }
    }
}

/// How a result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a stored entry.
    Hit,
    /// Computed for this request.
    Miss,
    /// Awaited a computation another request had already started.
    Joined,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Joined => "joined",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    pub bytes: Bytes,
    pub status: CacheStatus,
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Lookups that found an entry from an older content version.
    pub stale: u64,
    pub evictions: u64,
    pub corruptions: u64,
    /// Computations started (one per single-flight group).
    pub computations: u64,
    pub entries: u64,
    pub bytes: u64,
}

impl CacheStats {
    /// Hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
    evictions: AtomicU64,
    corruptions: AtomicU64,
    computations: AtomicU64,
    entries: AtomicU64,
    bytes: AtomicU64,
}

struct Entry {
    version: ContentVersion,
    data: Bytes,
    checksum: u32,
}

impl Entry {
    fn new(version: ContentVersion, data: Bytes) -> Self {
        let checksum = crc32fast::hash(&data);
        Self {
            version,
            data,
            checksum,
        }
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn verify(&self) -> bool {
        crc32fast::hash(&self.data) == self.checksum
    }
}

enum Probe {
    Hit(Bytes),
    Absent,
    Stale,
    Corrupt,
}

struct Index {
    lru: LruCache<SlotKey, Entry>,
    bytes: u64,
}

impl Index {
    fn remove(&mut self, slot: &SlotKey) {
        if let Some(entry) = self.lru.pop(slot) {
            self.bytes = self.bytes.saturating_sub(entry.size());
        }
    }

    fn probe(&mut self, key: &CacheKey) -> Probe {
        let slot = key.slot();
        let outcome = match self.lru.get(&slot) {
            None => return Probe::Absent,
            Some(entry) if entry.version != key.version => Probe::Stale,
            Some(entry) if !entry.verify() => Probe::Corrupt,
            Some(entry) => return Probe::Hit(entry.data.clone()),
        };
        self.remove(&slot);
        outcome
    }
}

struct Inner {
    index: Mutex<Index>,
    in_flight: Mutex<HashMap<CacheKey, SharedComputation>>,
    max_entries: usize,
    max_bytes: u64,
    counters: Counters,
}

impl Inner {
    async fn lookup(&self, key: &CacheKey) -> Option<Bytes> {
        let mut index = self.index.lock().await;
        let probe = index.probe(key);
        self.sync_gauges(&index);
        drop(index);

        match probe {
            Probe::Hit(bytes) => return Some(bytes),
            Probe::Absent => {}
            Probe::Stale => {
                self.counters.stale.fetch_add(1, Ordering::Relaxed);
                counter!("result_cache_stale_total").increment(1);
                debug!(key = %key, "Cached entry is from an older version");
            }
            Probe::Corrupt => {
                let err = DataError::CacheCorruption(format!("checksum mismatch for {}", key));
                self.counters.corruptions.fetch_add(1, Ordering::Relaxed);
                counter!("result_cache_corruptions_total").increment(1);
                warn!(error = %err, "Dropping corrupt cache entry");
            }
        }
        None
    }

    async fn store(&self, key: &CacheKey, data: Bytes) {
        let size = data.len() as u64;
        if self.max_entries == 0 || size > self.max_bytes {
            debug!(key = %key, size, max_bytes = self.max_bytes, "Result not stored");
            return;
        }

        let mut index = self.index.lock().await;
        let slot = key.slot();
        index.remove(&slot);
        index.lru.put(slot, Entry::new(key.version.clone(), data));
        index.bytes += size;

        let mut evicted = 0u64;
        while index.lru.len() > self.max_entries || index.bytes > self.max_bytes {
            match index.lru.pop_lru() {
                Some((_, victim)) => {
                    index.bytes = index.bytes.saturating_sub(victim.size());
                    evicted += 1;
                }
                None => break,
            }
        }
        self.sync_gauges(&index);
        drop(index);

        if evicted > 0 {
            self.counters.evictions.fetch_add(evicted, Ordering::Relaxed);
            counter!("result_cache_evictions_total").increment(evicted);
            debug!(evicted, "Evicted least recently used results");
        }
    }

    fn sync_gauges(&self, index: &Index) {
        let entries = index.lru.len() as u64;
        self.counters.entries.store(entries, Ordering::Relaxed);
        self.counters.bytes.store(index.bytes, Ordering::Relaxed);
        gauge!("result_cache_entries").set(entries as f64);
        gauge!("result_cache_bytes").set(index.bytes as f64);
    }
}

/// Serialized results keyed by path, version, slice and format.
///
/// Cheap to clone; clones share the same storage.
#[derive(Clone)]
pub struct ResultCache {
    inner: Arc<Inner>,
}

impl ResultCache {
    pub fn new(max_entries: usize, max_bytes: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                index: Mutex::new(Index {
                    lru: LruCache::unbounded(),
                    bytes: 0,
                }),
                in_flight: Mutex::new(HashMap::new()),
                max_entries,
                max_bytes,
                counters: Counters::default(),
            }),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.max_bytes_mb * 1024 * 1024)
    }

    /// Return the stored result for `key`, or compute it exactly once across
    /// all concurrent callers.
    ///
    /// `compute` runs on a spawned task; it is only invoked when neither a
    /// stored entry nor an in-flight computation exists for the key.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> DataResult<CacheLookup>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = DataResult<Bytes>> + Send + 'static,
    {
        if let Some(bytes) = self.inner.lookup(&key).await {
            return Ok(self.hit(bytes));
        }

        let (computation, status) = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(running) => (running.clone(), CacheStatus::Joined),
                None => {
                    // A computation may have finished between the lookup and
                    // taking the in-flight lock.
                    if let Probe::Hit(bytes) = self.inner.index.lock().await.probe(&key) {
                        return Ok(self.hit(bytes));
                    }
                    let computation = self.spawn_computation(key.clone(), compute);
                    in_flight.insert(key.clone(), computation.clone());
                    (computation, CacheStatus::Miss)
                }
            }
        };

        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        counter!("result_cache_misses_total", "status" => status.as_str()).increment(1);

        let bytes = computation.await?;
        Ok(CacheLookup { bytes, status })
    }

    fn hit(&self, bytes: Bytes) -> CacheLookup {
        self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
        counter!("result_cache_hits_total").increment(1);
        CacheLookup {
            bytes,
            status: CacheStatus::Hit,
        }
    }

    fn spawn_computation<F, Fut>(&self, key: CacheKey, compute: F) -> SharedComputation
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = DataResult<Bytes>> + Send + 'static,
    {
        self.inner.counters.computations.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            let result = compute().await;
            match &result {
                Ok(bytes) => inner.store(&key, bytes.clone()).await,
                Err(e) => debug!(key = %key, error = %e, "Computation failed, not caching"),
            }
            inner.in_flight.lock().await.remove(&key);
            result
        });

        handle
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    Err(DataError::Internal(format!("cache computation aborted: {}", e)))
                })
            })
            .boxed()
            .shared()
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            stale: c.stale.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            corruptions: c.corruptions.load(Ordering::Relaxed),
            computations: c.computations.load(Ordering::Relaxed),
            entries: c.entries.load(Ordering::Relaxed),
            bytes: c.bytes.load(Ordering::Relaxed),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.inner.max_entries
    }

    pub fn max_bytes(&self) -> u64 {
        self.inner.max_bytes
    }

    /// Number of computations currently running.
    pub async fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().await.len()
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("max_entries", &self.inner.max_entries)
            .field("max_bytes", &self.inner.max_bytes)
            .field("stats", &self.stats())
            .finish()
    }
}
