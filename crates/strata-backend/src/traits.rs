use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BackendResult;
use crate::statement::Statement;
use crate::value::Row;

/// Outcome of executing a statement: whether a conditional write applied,
/// plus a forward-only stream of rows.
pub struct ResultSet {
    applied: bool,
    rows: Box<dyn Iterator<Item = Row> + Send>,
}

impl ResultSet {
    /// A result without rows.
    pub fn empty(applied: bool) -> Self {
        Self {
            applied,
            rows: Box::new(std::iter::empty()),
        }
    }

    /// A read result holding materialized rows.
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self::streaming(rows.into_iter())
    }

    /// A read result that pulls rows lazily.
    pub fn streaming(rows: impl Iterator<Item = Row> + Send + 'static) -> Self {
        Self {
            applied: true,
            rows: Box::new(rows),
        }
    }

    /// Whether the statement's condition held (always `true` for
    /// unconditional statements).
    pub fn was_applied(&self) -> bool {
        self.applied
    }

    /// The first row, if any.
    pub fn one(mut self) -> Option<Row> {
        self.rows.next()
    }
}

impl Iterator for ResultSet {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("applied", &self.applied)
            .finish_non_exhaustive()
    }
}

/// The capability every storage technology provides to the persistence core.
///
/// Implementations must be thread-safe (`Send + Sync`); the core shares one
/// backend between all concurrent operations and never mutates it. Every
/// statement is scoped to a single repository, and rows of one repository are
/// never visible through statements of another. All failures are reported as
/// the normalized [`BackendError`](crate::BackendError).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable backend name (e.g. "in-memory").
    fn name(&self) -> &str;

    /// Maximum number of keys a single multi-key query may carry.
    fn max_keys_per_query(&self) -> usize;

    /// Hard per-item payload ceiling imposed by the storage technology, if
    /// any. Soft size limits are clamped to it.
    fn hard_item_size_limit(&self) -> Option<usize> {
        None
    }

    /// Execute a statement synchronously.
    fn execute(&self, stmt: &Statement) -> BackendResult<ResultSet>;

    /// Execute a statement asynchronously.
    async fn execute_async(&self, stmt: Statement) -> BackendResult<ResultSet>;

    /// Execute a conditional write and report whether its condition held.
    fn execute_cas(&self, stmt: &Statement) -> BackendResult<bool>;

    /// Drop every row belonging to the given repositories.
    fn erase_repositories(&self, repository_ids: &BTreeSet<String>) -> BackendResult<()>;
}

/// Builds backends of one storage technology from its configuration.
pub trait BackendFactory {
    type Config;

    fn name(&self) -> &'static str;

    /// A configuration populated with defaults.
    fn new_config(&self) -> Self::Config;

    fn build_backend(&self, config: Self::Config) -> BackendResult<Arc<dyn Backend>>;
}
