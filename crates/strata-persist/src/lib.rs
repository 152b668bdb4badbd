//! Backend-agnostic persistence core for strata.
//!
//! [`Persist`] is the repository-scoped entry point. It stores immutable,
//! content-addressed objects and named references on any
//! [`Backend`](strata_backend::Backend), and shares the protocol every
//! backend has to satisfy:
//!
//! - **Objects** are inserted if absent, upserted, deleted, fetched singly or
//!   in batches, and scanned lazily by type.
//! - **References** move through `absent -> active -> deleted -> absent`
//!   using single-row conditional writes only.
//! - **Batched reads** are chunked to the backend's keys-per-query limit and
//!   correlated back to input positions.
//! - **Batched writes** fan out with a bounded number of requests in flight.
//! - **Serialization** dispatches on the object type through a validated,
//!   process-wide [`SerializerRegistry`] that enforces soft size limits before
//!   anything reaches the backend.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use strata_backend::InMemoryBackend;
//! use strata_persist::{Persist, StoreConfig};
//! use strata_types::{IndexObj, Obj, Reference};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let persist = Persist::new(
//!     Arc::new(InMemoryBackend::new()),
//!     StoreConfig::for_repository("example"),
//! )?;
//!
//! let index = Obj::from(IndexObj::new(b"entries".to_vec()));
//! assert!(persist.store_obj(&index, false).await?);
//!
//! let main = Reference::new("refs/heads/main", index.id(), 0, None);
//! persist.add_reference(&main).await?;
//! # Ok::<(), strata_persist::PersistError>(())
//! # }).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod serializers;

mod batch;
mod fanout;
mod objects;
mod persist;
mod refs;
mod scan;

#[cfg(test)]
mod testing;

pub use config::{Clock, StoreConfig, SystemClock};
pub use error::{PersistError, PersistResult};
pub use persist::Persist;
pub use scan::ScanAllObjects;
pub use serializers::{ObjCodec, SerializerRegistry, SizeBudget};
