//! In-memory backend for tests and embedding.
//!
//! [`InMemoryBackend`] keeps object and reference rows in `BTreeMap`s behind
//! `RwLock`s, keyed by `(repository id, key)`. Every statement executes
//! atomically under the table's write lock, which gives conditional writes
//! the same single-row linearizability a real backend provides.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BackendError, BackendResult};
use crate::statement::{columns, Statement, StatementKind};
use crate::traits::{Backend, BackendFactory, ResultSet};
use crate::value::{Fields, Row, Value};

const NAME: &str = "in-memory";

type Table = BTreeMap<(String, String), Row>;

/// An in-memory implementation of [`Backend`].
///
/// Data is lost when the backend is dropped.
#[derive(Debug)]
pub struct InMemoryBackend {
    objs: RwLock<Table>,
    refs: RwLock<Table>,
    max_keys_per_query: usize,
}

impl InMemoryBackend {
    pub const DEFAULT_MAX_KEYS_PER_QUERY: usize = 100;

    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::with_max_keys_per_query(Self::DEFAULT_MAX_KEYS_PER_QUERY)
    }

    /// Create a backend that accepts at most `max` keys per multi-key query.
    pub fn with_max_keys_per_query(max: usize) -> Self {
        Self {
            objs: RwLock::new(Table::new()),
            refs: RwLock::new(Table::new()),
            max_keys_per_query: max.max(1),
        }
    }

    /// Number of objects stored for a repository.
    pub fn object_count(&self, repository_id: &str) -> usize {
        self.objs
            .read()
            .map(|t| rows_of(&t, repository_id).count())
            .unwrap_or(0)
    }

    /// Number of references (live or deleted) stored for a repository.
    pub fn reference_count(&self, repository_id: &str) -> usize {
        self.refs
            .read()
            .map(|t| rows_of(&t, repository_id).count())
            .unwrap_or(0)
    }

    fn apply(&self, stmt: &Statement) -> BackendResult<ResultSet> {
        let repo = stmt.repository_id.as_str();
        match stmt.kind {
            StatementKind::FindObjs => {
                let table = self.objs.read().map_err(poisoned)?;
                Ok(ResultSet::with_rows(find(&table, repo, &stmt.keys)))
            }
            StatementKind::FetchObjType => {
                let key = single_key(stmt)?;
                let table = self.objs.read().map_err(poisoned)?;
                let rows = table
                    .get(&(repo.to_string(), key.to_string()))
                    .map(|row| row.project(&[columns::OBJ_ID, columns::OBJ_TYPE]))
                    .into_iter()
                    .collect();
                Ok(ResultSet::with_rows(rows))
            }
            StatementKind::StoreObj => {
                let key = single_key(stmt)?;
                let mut table = self.objs.write().map_err(poisoned)?;
                let applied = insert_if_absent(&mut table, repo, key, obj_row(stmt, key));
                Ok(ResultSet::empty(applied))
            }
            StatementKind::UpsertObj => {
                let key = single_key(stmt)?;
                let mut table = self.objs.write().map_err(poisoned)?;
                table.insert((repo.to_string(), key.to_string()), obj_row(stmt, key));
                Ok(ResultSet::empty(true))
            }
            StatementKind::DeleteObj => {
                let key = single_key(stmt)?;
                let mut table = self.objs.write().map_err(poisoned)?;
                table.remove(&(repo.to_string(), key.to_string()));
                Ok(ResultSet::empty(true))
            }
            StatementKind::ScanObjs => {
                let table = self.objs.read().map_err(poisoned)?;
                let rows: Vec<Row> = rows_of(&table, repo).map(|(_, row)| row.clone()).collect();
                debug!(repo, rows = rows.len(), "in-memory scan snapshot");
                Ok(ResultSet::with_rows(rows))
            }
            StatementKind::FindReferences => {
                let table = self.refs.read().map_err(poisoned)?;
                Ok(ResultSet::with_rows(find(&table, repo, &stmt.keys)))
            }
            StatementKind::AddReference => {
                let key = single_key(stmt)?;
                let mut row = stmt.params.clone();
                row.insert(columns::REF_NAME, key);
                let mut table = self.refs.write().map_err(poisoned)?;
                Ok(ResultSet::empty(insert_if_absent(&mut table, repo, key, row)))
            }
            StatementKind::MarkReferenceAsDeleted => {
                let key = single_key(stmt)?;
                let mut table = self.refs.write().map_err(poisoned)?;
                let applied = match matching_ref(&mut table, repo, key, &stmt.params) {
                    Some(row) => {
                        row.insert(columns::DELETED, true);
                        true
                    }
                    None => false,
                };
                Ok(ResultSet::empty(applied))
            }
            StatementKind::PurgeReference => {
                let key = single_key(stmt)?;
                let mut table = self.refs.write().map_err(poisoned)?;
                let applied = matching_ref(&mut table, repo, key, &stmt.params).is_some();
                if applied {
                    table.remove(&(repo.to_string(), key.to_string()));
                }
                Ok(ResultSet::empty(applied))
            }
            StatementKind::UpdateReferencePointer => {
                let key = single_key(stmt)?;
                let mut table = self.refs.write().map_err(poisoned)?;
                let applied = match matching_ref(&mut table, repo, key, &stmt.params) {
                    Some(row) => {
                        row.insert(columns::POINTER, stmt.params.get_or_null(columns::POINTER).clone());
                        row.insert(columns::PREV_PTR, stmt.params.get_or_null(columns::PREV_PTR).clone());
                        true
                    }
                    None => false,
                };
                Ok(ResultSet::empty(applied))
            }
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn max_keys_per_query(&self) -> usize {
        self.max_keys_per_query
    }

    fn execute(&self, stmt: &Statement) -> BackendResult<ResultSet> {
        self.apply(stmt)
    }

    async fn execute_async(&self, stmt: Statement) -> BackendResult<ResultSet> {
        // Give sibling requests a chance to interleave, as a remote call would.
        tokio::task::yield_now().await;
        self.apply(&stmt)
    }

    fn execute_cas(&self, stmt: &Statement) -> BackendResult<bool> {
        Ok(self.apply(stmt)?.was_applied())
    }

    fn erase_repositories(&self, repository_ids: &BTreeSet<String>) -> BackendResult<()> {
        for table in [&self.objs, &self.refs] {
            table
                .write()
                .map_err(poisoned)?
                .retain(|(repo, _), _| !repository_ids.contains(repo));
        }
        Ok(())
    }
}

fn poisoned<T>(e: PoisonError<T>) -> BackendError {
    BackendError::driver(NAME, format!("lock poisoned: {e}"))
}

fn single_key(stmt: &Statement) -> BackendResult<&str> {
    stmt.single_key().ok_or_else(|| BackendError::MalformedStatement {
        kind: stmt.kind,
        reason: format!("expected exactly one key, got {}", stmt.keys.len()),
    })
}

fn rows_of<'a>(table: &'a Table, repo: &'a str) -> impl Iterator<Item = (&'a String, &'a Row)> + 'a {
    table
        .range((repo.to_string(), String::new())..)
        .take_while(move |((r, _), _)| r == repo)
        .map(|((_, key), row)| (key, row))
}

fn find(table: &Table, repo: &str, keys: &[String]) -> Vec<Row> {
    keys.iter()
        .filter_map(|key| table.get(&(repo.to_string(), key.clone())).cloned())
        .collect()
}

fn obj_row(stmt: &Statement, key: &str) -> Row {
    let mut row = stmt.params.clone();
    row.insert(columns::OBJ_ID, key);
    row
}

fn insert_if_absent(table: &mut Table, repo: &str, key: &str, row: Row) -> bool {
    let slot = (repo.to_string(), key.to_string());
    if table.contains_key(&slot) {
        return false;
    }
    table.insert(slot, row);
    true
}

/// The stored reference row, if it exists and matches the expected state
/// carried by the statement parameters.
fn matching_ref<'a>(
    table: &'a mut Table,
    repo: &str,
    key: &str,
    params: &Fields,
) -> Option<&'a mut Row> {
    let row = table.get_mut(&(repo.to_string(), key.to_string()))?;
    let matches = columns::REF_CONDITION
        .iter()
        .all(|(column, expected)| row.get_or_null(column) == params.get_or_null(expected));
    matches.then_some(row)
}

/// Configuration for [`InMemoryBackendFactory`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryBackendConfig {
    pub max_keys_per_query: usize,
}

impl Default for InMemoryBackendConfig {
    fn default() -> Self {
        Self {
            max_keys_per_query: InMemoryBackend::DEFAULT_MAX_KEYS_PER_QUERY,
        }
    }
}

/// Factory producing [`InMemoryBackend`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct InMemoryBackendFactory;

impl BackendFactory for InMemoryBackendFactory {
    type Config = InMemoryBackendConfig;

    fn name(&self) -> &'static str {
        NAME
    }

    fn new_config(&self) -> InMemoryBackendConfig {
        InMemoryBackendConfig::default()
    }

    fn build_backend(&self, config: InMemoryBackendConfig) -> BackendResult<Arc<dyn Backend>> {
        if config.max_keys_per_query == 0 {
            return Err(BackendError::InvalidConfig(
                "max_keys_per_query must be at least 1".into(),
            ));
        }
        Ok(Arc::new(InMemoryBackend::with_max_keys_per_query(
            config.max_keys_per_query,
        )))
    }
}
