use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use strata_backend::{Backend, Statement, StatementKind};
use tracing::info;

use crate::config::{Clock, StoreConfig, SystemClock};
use crate::error::PersistResult;
use crate::serializers::{SerializerRegistry, SizeBudget};

/// Repository-scoped persistence handle: the object store and the reference
/// store over one shared [`Backend`].
///
/// `Persist` is cheap to clone; clones share the backend and the clock.
#[derive(Clone)]
pub struct Persist {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) config: StoreConfig,
    pub(crate) registry: &'static SerializerRegistry,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Persist {
    /// Create a handle for `config.repository_id`.
    pub fn new(backend: Arc<dyn Backend>, config: StoreConfig) -> PersistResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            registry: SerializerRegistry::builtin(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used to timestamp reference history.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Name of the underlying backend.
    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn repository_id(&self) -> &str {
        &self.config.repository_id
    }

    /// Drop every object and reference of this repository.
    pub async fn erase(&self) -> PersistResult<()> {
        let repos = BTreeSet::from([self.config.repository_id.clone()]);
        self.backend.erase_repositories(&repos)?;
        info!(repo = %self.config.repository_id, backend = self.name(), "erased repository");
        Ok(())
    }

    pub(crate) fn statement(&self, kind: StatementKind) -> Statement {
        Statement::new(kind, self.config.repository_id.as_str())
    }

    /// The soft limits for one encode call, clamped to the backend's hard
    /// item limit. Ignoring soft restrictions leaves only the hard limit.
    pub(crate) fn size_budget(&self, ignore_soft_size_restrictions: bool) -> SizeBudget {
        let hard = self.backend.hard_item_size_limit().unwrap_or(usize::MAX);
        if ignore_soft_size_restrictions {
            return SizeBudget::new(hard, hard);
        }
        SizeBudget::new(
            self.config.max_incremental_index_size.min(hard),
            self.config.max_serialized_index_size.min(hard),
        )
    }
}

impl fmt::Debug for Persist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persist")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistError;
    use crate::testing::LimitedBackend;
    use strata_backend::InMemoryBackend;
    use strata_types::{IndexObj, Obj, Reference};

    #[test]
    fn rejects_invalid_config() {
        let config = StoreConfig {
            max_concurrent_requests: 0,
            ..StoreConfig::for_repository("r")
        };
        let err = Persist::new(Arc::new(InMemoryBackend::new()), config).unwrap_err();
        assert!(matches!(err, PersistError::InvalidConfig(_)));
    }

    #[test]
    fn budget_follows_config_and_flag() {
        let persist = Persist::new(
            Arc::new(InMemoryBackend::new()),
            StoreConfig::for_repository("r"),
        )
        .unwrap();
        assert_eq!(persist.size_budget(false), SizeBudget::new(50 * 1024, 200 * 1024));
        assert_eq!(persist.size_budget(true), SizeBudget::unbounded());
    }

    #[test]
    fn hard_limit_clamps_soft_limits() {
        let persist =
            Persist::new(Arc::new(LimitedBackend::new(1024)), StoreConfig::for_repository("r"))
                .unwrap();
        assert_eq!(persist.size_budget(false), SizeBudget::new(1024, 1024));
        assert_eq!(persist.size_budget(true), SizeBudget::new(1024, 1024));
    }

    #[tokio::test]
    async fn erase_drops_only_this_repository() {
        let backend: Arc<dyn Backend> = Arc::new(InMemoryBackend::new());
        let a = Persist::new(Arc::clone(&backend), StoreConfig::for_repository("a")).unwrap();
        let b = Persist::new(backend, StoreConfig::for_repository("b")).unwrap();

        let obj = Obj::from(IndexObj::new(b"shared".to_vec()));
        let reference = Reference::new("main", obj.id(), 1, None);
        for p in [&a, &b] {
            assert!(p.store_obj(&obj, false).await.unwrap());
            p.add_reference(&reference).await.unwrap();
        }

        a.erase().await.unwrap();

        assert_eq!(
            a.fetch_obj(obj.id()).await.unwrap_err(),
            PersistError::ObjNotFound(vec![obj.id()])
        );
        assert!(a.fetch_reference("main").await.unwrap().is_none());
        assert_eq!(b.fetch_obj(obj.id()).await.unwrap(), obj);
        assert_eq!(b.fetch_reference("main").await.unwrap(), Some(reference));
    }
}
