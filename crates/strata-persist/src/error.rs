use strata_backend::BackendError;
use strata_types::{ObjId, Reference};

/// Errors from persistence operations.
///
/// Everything except [`PersistError::Backend`] is a condition the caller is
/// expected to branch on, e.g. retrying a reference update with the current
/// value carried by [`PersistError::RefConditionFailed`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    /// One or more objects are absent (or not of the expected type).
    #[error("objects not found: {}", join_ids(.0))]
    ObjNotFound(Vec<ObjId>),

    /// A payload exceeds the active soft size limit.
    #[error("object too large: {size} bytes exceeds limit of {max} bytes")]
    ObjTooLarge { size: usize, max: usize },

    /// The reference row does not exist.
    #[error("reference not found: {name}")]
    RefNotFound { name: String },

    /// A reference with the same name already exists; carries the stored row.
    #[error("reference already exists: {}", .0.name)]
    RefAlreadyExists(Box<Reference>),

    /// The stored reference does not match the expected state; carries the
    /// stored row.
    #[error("reference condition failed: {}", .0.name)]
    RefConditionFailed(Box<Reference>),

    /// The reference value cannot be used for the requested transition.
    #[error("invalid reference {name}: {reason}")]
    InvalidReference { name: String, reason: String },

    /// A stored row cannot be decoded.
    #[error("cannot decode {id}: {reason}")]
    Decode { id: String, reason: String },

    /// An object cannot be encoded into backend fields.
    #[error("cannot encode {id}: {reason}")]
    Encode { id: ObjId, reason: String },

    /// Two codecs claim the same attribute name.
    #[error("duplicate serializer attribute name: {0}")]
    DuplicateAttribute(String),

    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Opaque failure of the storage backend.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl PersistError {
    /// Whether this error is a backend failure, fatal to the operation.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Backend(_))
    }

    pub(crate) fn decode(id: impl ToString, reason: impl ToString) -> Self {
        Self::Decode {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn join_ids(ids: &[ObjId]) -> String {
    ids.iter().map(ObjId::to_hex).collect::<Vec<_>>().join(", ")
}

/// Result alias for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;
