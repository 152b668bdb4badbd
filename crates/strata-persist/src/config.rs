//! Store configuration and the injectable clock.

use serde::{Deserialize, Serialize};

use crate::error::{PersistError, PersistResult};

/// Configuration of one repository-scoped [`Persist`](crate::Persist).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Namespace every statement is scoped to.
    pub repository_id: String,
    /// Cap on a reference's `previous_pointers` history.
    pub reference_previous_head_count: usize,
    /// Soft limit for a commit's embedded incremental index, in bytes.
    pub max_incremental_index_size: usize,
    /// Soft limit for a serialized index segment, in bytes.
    pub max_serialized_index_size: usize,
    /// In-flight request cap shared by batched fetches and write fan-outs.
    pub max_concurrent_requests: usize,
}

impl StoreConfig {
    pub const DEFAULT_PREVIOUS_HEAD_COUNT: usize = 20;
    pub const DEFAULT_MAX_INCREMENTAL_INDEX_SIZE: usize = 50 * 1024;
    pub const DEFAULT_MAX_SERIALIZED_INDEX_SIZE: usize = 200 * 1024;
    pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 20;

    /// A default configuration for the given repository.
    pub fn for_repository(repository_id: impl Into<String>) -> Self {
        Self {
            repository_id: repository_id.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> PersistResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| PersistError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PersistResult<()> {
        if self.max_concurrent_requests == 0 {
            return Err(PersistError::InvalidConfig(
                "max_concurrent_requests must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            repository_id: String::new(),
            reference_previous_head_count: Self::DEFAULT_PREVIOUS_HEAD_COUNT,
            max_incremental_index_size: Self::DEFAULT_MAX_INCREMENTAL_INDEX_SIZE,
            max_serialized_index_size: Self::DEFAULT_MAX_SERIALIZED_INDEX_SIZE,
            max_concurrent_requests: Self::DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }
}

/// Source of wall-clock time for reference history timestamps.
pub trait Clock: Send + Sync {
    /// Microseconds since the Unix epoch.
    fn now_micros(&self) -> i64;
}

/// The system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> i64 {
        chrono::Utc::now().timestamp_micros()
    }
}
