//! Storage backend capability for strata.
//!
//! The persistence core never talks to a database directly. It builds
//! repository-scoped [`Statement`]s whose parameters are backend-native
//! [`Fields`], and hands them to a [`Backend`]. Each storage technology
//! (wide-column store, document store, key-value table, ...) implements the
//! trait once and maps statements onto its own query language.
//!
//! # Contract
//!
//! 1. Every statement is scoped to exactly one repository id.
//! 2. Conditional statements (`StoreObj`, `AddReference`, and the reference
//!    updates) are linearizable per row and report whether they applied.
//! 3. Multi-key reads carry at most [`Backend::max_keys_per_query`] keys.
//! 4. All driver failures surface as [`BackendError`].
//!
//! # Adapters
//!
//! - [`InMemoryBackend`] -- `BTreeMap`-based backend for tests and embedding

pub mod error;
pub mod memory;
pub mod statement;
pub mod traits;
pub mod value;

pub use error::{BackendError, BackendResult};
pub use memory::{InMemoryBackend, InMemoryBackendConfig, InMemoryBackendFactory};
pub use statement::{columns, Statement, StatementKind};
pub use traits::{Backend, BackendFactory, ResultSet};
pub use value::{Fields, Row, Value};
