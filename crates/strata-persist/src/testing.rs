//! Instrumented backends for tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use strata_backend::{Backend, BackendError, BackendResult, InMemoryBackend, ResultSet, Statement};

/// Route `tracing` output to the test harness. Safe to call repeatedly.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Counts statements and tracks the peak number of concurrent async calls.
pub(crate) struct CountingBackend {
    inner: InMemoryBackend,
    queries: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CountingBackend {
    pub fn new(inner: InMemoryBackend) -> Self {
        Self {
            inner,
            queries: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Statements executed so far, sync and async.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Async calls started but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn max_keys_per_query(&self) -> usize {
        self.inner.max_keys_per_query()
    }

    fn execute(&self, stmt: &Statement) -> BackendResult<ResultSet> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(stmt)
    }

    async fn execute_async(&self, stmt: Statement) -> BackendResult<ResultSet> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        let result = self.inner.execute_async(stmt).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn execute_cas(&self, stmt: &Statement) -> BackendResult<bool> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.execute_cas(stmt)
    }

    fn erase_repositories(&self, repository_ids: &BTreeSet<String>) -> BackendResult<()> {
        self.inner.erase_repositories(repository_ids)
    }
}

/// Fails every async call from the `fail_from`-th one on (1-based).
pub(crate) struct FailingBackend {
    inner: InMemoryBackend,
    fail_from: usize,
    calls: AtomicUsize,
}

impl FailingBackend {
    pub fn new(inner: InMemoryBackend, fail_from: usize) -> Self {
        Self {
            inner,
            fail_from,
            calls: AtomicUsize::new(0),
        }
    }

    /// Async calls attempted so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    fn max_keys_per_query(&self) -> usize {
        self.inner.max_keys_per_query()
    }

    fn execute(&self, stmt: &Statement) -> BackendResult<ResultSet> {
        self.inner.execute(stmt)
    }

    async fn execute_async(&self, stmt: Statement) -> BackendResult<ResultSet> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.fail_from {
            return Err(BackendError::driver("failing", format!("injected failure on call {call}")));
        }
        self.inner.execute_async(stmt).await
    }

    fn execute_cas(&self, stmt: &Statement) -> BackendResult<bool> {
        self.inner.execute_cas(stmt)
    }

    fn erase_repositories(&self, repository_ids: &BTreeSet<String>) -> BackendResult<()> {
        self.inner.erase_repositories(repository_ids)
    }
}

/// Caps item size the way a storage technology with a hard row limit does.
pub(crate) struct LimitedBackend {
    inner: InMemoryBackend,
    limit: usize,
}

impl LimitedBackend {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: InMemoryBackend::new(),
            limit,
        }
    }
}

#[async_trait]
impl Backend for LimitedBackend {
    fn name(&self) -> &str {
        "limited"
    }

    fn max_keys_per_query(&self) -> usize {
        self.inner.max_keys_per_query()
    }

    fn hard_item_size_limit(&self) -> Option<usize> {
        Some(self.limit)
    }

    fn execute(&self, stmt: &Statement) -> BackendResult<ResultSet> {
        self.inner.execute(stmt)
    }

    async fn execute_async(&self, stmt: Statement) -> BackendResult<ResultSet> {
        self.inner.execute_async(stmt).await
    }

    fn execute_cas(&self, stmt: &Statement) -> BackendResult<bool> {
        self.inner.execute_cas(stmt)
    }

    fn erase_repositories(&self, repository_ids: &BTreeSet<String>) -> BackendResult<()> {
        self.inner.erase_repositories(repository_ids)
    }
}

/// Reports every conditional write as not applied without touching the
/// tables, as if a concurrent writer won each race and was purged right after.
pub(crate) struct ConflictingBackend {
    inner: InMemoryBackend,
    cas_calls: AtomicUsize,
}

impl ConflictingBackend {
    pub fn new() -> Self {
        Self {
            inner: InMemoryBackend::new(),
            cas_calls: AtomicUsize::new(0),
        }
    }

    pub fn cas_calls(&self) -> usize {
        self.cas_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ConflictingBackend {
    fn name(&self) -> &str {
        "conflicting"
    }

    fn max_keys_per_query(&self) -> usize {
        self.inner.max_keys_per_query()
    }

    fn execute(&self, stmt: &Statement) -> BackendResult<ResultSet> {
        self.inner.execute(stmt)
    }

    async fn execute_async(&self, stmt: Statement) -> BackendResult<ResultSet> {
        self.inner.execute_async(stmt).await
    }

    fn execute_cas(&self, _stmt: &Statement) -> BackendResult<bool> {
        self.cas_calls.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }

    fn erase_repositories(&self, repository_ids: &BTreeSet<String>) -> BackendResult<()> {
        self.inner.erase_repositories(repository_ids)
    }
}
