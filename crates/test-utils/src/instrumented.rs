//! Adapters that wrap another adapter to observe or disturb its reads.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adapters::{Adapter, AdapterError, AdapterResult, ChildEntry, Chunk, ReadRequest};
use tree_common::{ContentVersion, Metadata, Spec, Structure, StructureKind};

/// Counts `read` calls and can slow each one down.
pub struct CountingAdapter {
    inner: Arc<dyn Adapter>,
    reads: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingAdapter {
    pub fn new(inner: Arc<dyn Adapter>) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Total reads started.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Highest number of reads observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for CountingAdapter {
    fn kind(&self) -> StructureKind {
        self.inner.kind()
    }

    async fn enumerate_children(&self) -> AdapterResult<Vec<ChildEntry>> {
        self.inner.enumerate_children().await
    }

    async fn child(&self, name: &str) -> AdapterResult<Option<Arc<dyn Adapter>>> {
        self.inner.child(name).await
    }

    async fn structure(&self) -> AdapterResult<Structure> {
        self.inner.structure().await
    }

    async fn metadata(&self) -> AdapterResult<Metadata> {
        self.inner.metadata().await
    }

    async fn specs(&self) -> AdapterResult<Vec<Spec>> {
        self.inner.specs().await
    }

    async fn content_version(&self) -> AdapterResult<ContentVersion> {
        self.inner.content_version().await
    }

    async fn read(&self, request: &ReadRequest) -> AdapterResult<Chunk> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.inner.read(request).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Fails reads on purpose.
///
/// Fails the first `failures` matching reads, then delegates. With
/// `only` set, reads other than that request always succeed.
pub struct FlakyAdapter {
    inner: Arc<dyn Adapter>,
    remaining: AtomicUsize,
    attempts: AtomicUsize,
    transient: bool,
    only: Option<ReadRequest>,
}

impl FlakyAdapter {
    pub fn new(inner: Arc<dyn Adapter>, failures: usize, transient: bool) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            transient,
            only: None,
        }
    }

    /// Always fail `request` with a permanent error.
    pub fn failing_on(inner: Arc<dyn Adapter>, request: ReadRequest) -> Self {
        let mut adapter = Self::new(inner, usize::MAX, false);
        adapter.only = Some(request);
        adapter
    }

    /// Reads attempted, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for FlakyAdapter {
    fn kind(&self) -> StructureKind {
        self.inner.kind()
    }

    async fn enumerate_children(&self) -> AdapterResult<Vec<ChildEntry>> {
        self.inner.enumerate_children().await
    }

    async fn child(&self, name: &str) -> AdapterResult<Option<Arc<dyn Adapter>>> {
        self.inner.child(name).await
    }

    async fn structure(&self) -> AdapterResult<Structure> {
        self.inner.structure().await
    }

    async fn metadata(&self) -> AdapterResult<Metadata> {
        self.inner.metadata().await
    }

    async fn specs(&self) -> AdapterResult<Vec<Spec>> {
        self.inner.specs().await
    }

    async fn content_version(&self) -> AdapterResult<ContentVersion> {
        self.inner.content_version().await
    }

    async fn read(&self, request: &ReadRequest) -> AdapterResult<Chunk> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let targeted = self.only.as_ref().map_or(true, |only| only == request);
        if targeted {
            let failed = self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                let message = format!("injected failure for {:?}", request);
                return Err(if self.transient {
                    AdapterError::transient(message)
                } else {
                    AdapterError::permanent(message)
                });
            }
        }
        self.inner.read(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::ramp_array;
    use adapters::ArrayAdapter;

    fn array() -> Arc<dyn Adapter> {
        Arc::new(ArrayAdapter::new(ramp_array(vec![4]), None).unwrap())
    }

    #[tokio::test]
    async fn test_counting_adapter() {
        let counting = CountingAdapter::new(array());
        let request = ReadRequest::ArrayBlock { block: vec![0] };
        counting.read(&request).await.unwrap();
        counting.read(&request).await.unwrap();
        assert_eq!(counting.reads(), 2);
        assert_eq!(counting.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_flaky_adapter_recovers() {
        let flaky = FlakyAdapter::new(array(), 2, true);
        let request = ReadRequest::ArrayBlock { block: vec![0] };
        assert!(flaky.read(&request).await.unwrap_err().transient);
        assert!(flaky.read(&request).await.is_err());
        assert!(flaky.read(&request).await.is_ok());
        assert_eq!(flaky.attempts(), 3);
    }
}
