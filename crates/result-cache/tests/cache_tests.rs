//! Single-flight, invalidation and eviction behaviour of the result cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use result_cache::{CacheKey, CacheStatus, ResultCache};
use tree_common::{BackendError, ContentVersion, DataError, NodePath};

fn key(path: &str, version: &str) -> CacheKey {
    CacheKey::new(
        NodePath::parse(path),
        ContentVersion::new(version),
        "200:300,0:50",
        "application/octet-stream",
    )
}

/// Compute closure that counts invocations and returns `data` after `delay`.
fn counted(
    calls: &Arc<AtomicUsize>,
    data: &'static [u8],
    delay: Duration,
) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<Bytes, DataError>> + Send + 'static {
    let calls = Arc::clone(calls);
    move || {
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok(Bytes::from_static(data))
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_compute_once() {
    let cache = ResultCache::new(100, 1 << 20);
    let calls = Arc::new(AtomicUsize::new(0));

    let requests = (0..8).map(|_| {
        let cache = cache.clone();
        let compute = counted(&calls, b"chunk-2", Duration::from_millis(50));
        tokio::spawn(async move { cache.get_or_compute(key("samples/run42", "v1"), compute).await })
    });
    let results: Vec<_> = join_all(requests)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| r.bytes == Bytes::from_static(b"chunk-2")));
    assert_eq!(
        results.iter().filter(|r| r.status == CacheStatus::Miss).count(),
        1
    );
    assert_eq!(cache.stats().computations, 1);
    assert_eq!(cache.in_flight().await, 0);
}

#[tokio::test]
async fn test_second_request_is_a_hit() {
    let cache = ResultCache::new(100, 1 << 20);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache
        .get_or_compute(key("a", "v1"), counted(&calls, b"abc", Duration::ZERO))
        .await
        .unwrap();
    let second = cache
        .get_or_compute(key("a", "v1"), counted(&calls, b"xyz", Duration::ZERO))
        .await
        .unwrap();

    assert_eq!(first.status, CacheStatus::Miss);
    assert_eq!(second.status, CacheStatus::Hit);
    assert_eq!(second.bytes, Bytes::from_static(b"abc"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.bytes, 3);
}

#[tokio::test]
async fn test_new_version_never_serves_old_bytes() {
    let cache = ResultCache::new(100, 1 << 20);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .get_or_compute(key("a", "v1"), counted(&calls, b"old", Duration::ZERO))
        .await
        .unwrap();
    let fresh = cache
        .get_or_compute(key("a", "v2"), counted(&calls, b"new", Duration::ZERO))
        .await
        .unwrap();

    assert_eq!(fresh.status, CacheStatus::Miss);
    assert_eq!(fresh.bytes, Bytes::from_static(b"new"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().stale, 1);
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let cache = ResultCache::new(100, 1 << 20);
    let calls = Arc::new(AtomicUsize::new(0));

    let failing = {
        let calls = Arc::clone(&calls);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<Bytes, _>(DataError::Backend(BackendError::transient(
                NodePath::parse("a"),
                "connection reset",
            )))
        }
    };
    let err = cache.get_or_compute(key("a", "v1"), failing).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(cache.stats().entries, 0);

    let ok = cache
        .get_or_compute(key("a", "v1"), counted(&calls, b"ok", Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(ok.status, CacheStatus::Miss);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancelled_request_still_fills_cache() {
    let cache = ResultCache::new(100, 1 << 20);
    let calls = Arc::new(AtomicUsize::new(0));

    let waiter = {
        let cache = cache.clone();
        let compute = counted(&calls, b"survivor", Duration::from_millis(100));
        tokio::spawn(async move { cache.get_or_compute(key("a", "v1"), compute).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    waiter.abort();
    assert!(waiter.await.unwrap_err().is_cancelled());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let later = cache
        .get_or_compute(key("a", "v1"), counted(&calls, b"recomputed", Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(later.status, CacheStatus::Hit);
    assert_eq!(later.bytes, Bytes::from_static(b"survivor"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_distinct_keys_compute_independently() {
    let cache = ResultCache::new(100, 1 << 20);
    let calls = Arc::new(AtomicUsize::new(0));

    let (a, b) = tokio::join!(
        cache.get_or_compute(key("a", "v1"), counted(&calls, b"a", Duration::from_millis(30))),
        cache.get_or_compute(key("b", "v1"), counted(&calls, b"b", Duration::from_millis(30))),
    );
    assert_eq!(a.unwrap().bytes, Bytes::from_static(b"a"));
    assert_eq!(b.unwrap().bytes, Bytes::from_static(b"b"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_entry_bound_evicts_least_recent() {
    let cache = ResultCache::new(2, 1 << 20);
    let calls = Arc::new(AtomicUsize::new(0));

    for path in ["a", "b"] {
        cache
            .get_or_compute(key(path, "v1"), counted(&calls, b"x", Duration::ZERO))
            .await
            .unwrap();
    }
    // Touch "a" so "b" becomes the victim.
    cache
        .get_or_compute(key("a", "v1"), counted(&calls, b"x", Duration::ZERO))
        .await
        .unwrap();
    cache
        .get_or_compute(key("c", "v1"), counted(&calls, b"x", Duration::ZERO))
        .await
        .unwrap();

    let stats = cache.stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.evictions, 1);

    let a = cache
        .get_or_compute(key("a", "v1"), counted(&calls, b"x", Duration::ZERO))
        .await
        .unwrap();
    let b = cache
        .get_or_compute(key("b", "v1"), counted(&calls, b"x", Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(a.status, CacheStatus::Hit);
    assert_eq!(b.status, CacheStatus::Miss);
}

#[tokio::test]
async fn test_byte_bound_and_oversize_results() {
    let cache = ResultCache::new(100, 10);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
        .get_or_compute(key("a", "v1"), counted(&calls, b"123456", Duration::ZERO))
        .await
        .unwrap();
    cache
        .get_or_compute(key("b", "v1"), counted(&calls, b"654321", Duration::ZERO))
        .await
        .unwrap();
    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.bytes, 6);
    assert_eq!(stats.evictions, 1);

    let big = cache
        .get_or_compute(key("big", "v1"), counted(&calls, b"0123456789abc", Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(big.bytes.len(), 13);
    assert_eq!(cache.stats().entries, 1);

    let again = cache
        .get_or_compute(key("big", "v1"), counted(&calls, b"0123456789abc", Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(again.status, CacheStatus::Miss);
}
