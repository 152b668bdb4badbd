//! Bounded fan-out of asynchronous writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use strata_backend::{Backend, BackendError, Statement};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::error::{PersistError, PersistResult};

/// Dispatches one write per item with at most `max_concurrent` in flight.
///
/// [`submit`](Self::submit) waits only while the cap is reached. Each item's
/// `applied` flag lands in its own slot. After the first failure no new
/// writes are dispatched, but writes already in flight run to completion.
/// [`finish`](Self::finish) is the join point: it waits for every outstanding
/// write and then reports the flags or the first failure.
pub(crate) struct WriteFanout {
    backend: Arc<dyn Backend>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
    applied: Arc<[AtomicBool]>,
    failure: Arc<OnceLock<PersistError>>,
}

impl WriteFanout {
    pub fn new(backend: Arc<dyn Backend>, max_concurrent: usize, items: usize) -> Self {
        Self {
            backend,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tasks: JoinSet::new(),
            applied: (0..items).map(|_| AtomicBool::new(false)).collect(),
            failure: Arc::new(OnceLock::new()),
        }
    }

    pub fn failed(&self) -> bool {
        self.failure.get().is_some()
    }

    /// Dispatch the write for item `index`. A no-op once a failure has been
    /// observed.
    pub async fn submit(&mut self, index: usize, stmt: Statement) {
        if self.failed() {
            return;
        }
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                record(&self.failure, BackendError::Task(e.to_string()).into());
                return;
            }
        };
        // A write that finished while we waited may have failed.
        if self.failed() {
            return;
        }
        let backend = Arc::clone(&self.backend);
        let applied = Arc::clone(&self.applied);
        let failure = Arc::clone(&self.failure);
        self.tasks.spawn(async move {
            match backend.execute_async(stmt).await {
                Ok(rs) => applied[index].store(rs.was_applied(), Ordering::Release),
                Err(e) => record(&failure, e.into()),
            }
            drop(permit);
        });
    }

    /// Wait for all outstanding writes; returns the per-item applied flags.
    pub async fn finish(mut self) -> PersistResult<Vec<bool>> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                record(&self.failure, BackendError::Task(e.to_string()).into());
            }
        }
        if let Some(err) = self.failure.get() {
            return Err(err.clone());
        }
        Ok(self.applied.iter().map(|a| a.load(Ordering::Acquire)).collect())
    }
}

fn record(failure: &OnceLock<PersistError>, err: PersistError) {
    if failure.set(err).is_ok() {
        if let Some(err) = failure.get() {
            warn!(error = %err, "write fan-out failed; no further writes will be dispatched");
        }
    }
}
