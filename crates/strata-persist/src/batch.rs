//! Batched multi-key reads.
//!
//! Positions of the input are grouped by distinct key, the distinct keys are
//! split into chunks no larger than the backend's keys-per-query limit, and
//! every chunk runs as one asynchronous query. At most `max_concurrent`
//! queries are in flight at once. Rows are correlated back to positions by
//! key, so completion order does not matter.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use strata_backend::{Backend, BackendError, Row, Statement};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::PersistResult;

/// Fetch `keys` in chunks and return one slot per input position.
///
/// `None` inputs are never queried and stay `None`. `query` builds the
/// statement for one chunk of distinct keys, `key_of` maps a returned row
/// back to its key, and `decode` turns a row into a value. `decode` runs at
/// most once per distinct key; every position that asked for the key gets a
/// clone. A `decode` result of `None` leaves the positions empty.
///
/// The first failing chunk, or the first row that cannot be keyed or
/// decoded, fails the whole call. Chunks already dispatched are left to
/// finish in the background.
pub(crate) async fn fetch_batched<K, V, Q, E, D>(
    backend: &Arc<dyn Backend>,
    max_concurrent: usize,
    keys: &[Option<K>],
    query: Q,
    key_of: E,
    decode: D,
) -> PersistResult<Vec<Option<V>>>
where
    K: Eq + Hash + Clone,
    V: Clone,
    Q: Fn(&[K]) -> Statement,
    E: Fn(&Row) -> PersistResult<K>,
    D: Fn(Row) -> PersistResult<Option<V>>,
{
    let mut results: Vec<Option<V>> = vec![None; keys.len()];

    let mut positions: HashMap<K, Vec<usize>> = HashMap::new();
    let mut distinct = Vec::new();
    for (index, key) in keys.iter().enumerate() {
        let Some(key) = key else { continue };
        positions
            .entry(key.clone())
            .or_insert_with(|| {
                distinct.push(key.clone());
                Vec::new()
            })
            .push(index);
    }
    if distinct.is_empty() {
        return Ok(results);
    }

    let chunk_size = backend.max_keys_per_query().max(1);
    let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = JoinSet::new();
    for chunk in distinct.chunks(chunk_size) {
        let stmt = query(chunk);
        let backend = Arc::clone(backend);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| BackendError::Task(e.to_string()))?;
            let rows: Vec<Row> = backend.execute_async(stmt).await?.collect();
            Ok::<_, BackendError>(rows)
        });
    }
    debug!(
        keys = distinct.len(),
        chunks = distinct.len().div_ceil(chunk_size),
        "dispatched batched fetch"
    );

    while let Some(joined) = tasks.join_next().await {
        let rows = match joined {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                tasks.detach_all();
                return Err(e.into());
            }
            Err(e) => {
                tasks.detach_all();
                return Err(BackendError::Task(e.to_string()).into());
            }
        };
        let correlated = rows.into_iter().try_for_each(|row| -> PersistResult<()> {
            let key = key_of(&row)?;
            let Some(slots) = positions.remove(&key) else {
                return Ok(());
            };
            if let Some(value) = decode(row)? {
                for slot in slots {
                    results[slot] = Some(value.clone());
                }
            }
            Ok(())
        });
        if let Err(e) = correlated {
            tasks.detach_all();
            return Err(e);
        }
    }
    Ok(results)
}
