//! Statements issued by the persistence core.
//!
//! A [`Statement`] names the operation, the repository it is scoped to, the
//! keys it touches, and its named parameters. How a statement is expressed in
//! a concrete query language is up to each adapter.

use std::fmt;

use crate::value::{Fields, Value};

/// Field and parameter names shared by the core and all adapters.
pub mod columns {
    /// Object id (canonical hex) of an object row.
    pub const OBJ_ID: &str = "obj_id";
    /// Type name of an object row.
    pub const OBJ_TYPE: &str = "obj_type";

    pub const REF_NAME: &str = "ref_name";
    pub const POINTER: &str = "pointer";
    pub const DELETED: &str = "deleted";
    pub const CREATED_AT: &str = "created_at";
    pub const EXT_INFO: &str = "ext_info";
    pub const PREV_PTR: &str = "prev_ptr";

    /// Expected prior state of a reference row for conditional writes.
    pub const EXPECTED_POINTER: &str = "expected_pointer";
    pub const EXPECTED_DELETED: &str = "expected_deleted";
    pub const EXPECTED_CREATED_AT: &str = "expected_created_at";
    pub const EXPECTED_EXT_INFO: &str = "expected_ext_info";

    /// Pairs of (stored column, expected-state parameter) compared by every
    /// conditional reference write.
    pub const REF_CONDITION: [(&str, &str); 4] = [
        (POINTER, EXPECTED_POINTER),
        (DELETED, EXPECTED_DELETED),
        (CREATED_AT, EXPECTED_CREATED_AT),
        (EXT_INFO, EXPECTED_EXT_INFO),
    ];
}

/// The operations the persistence core issues against a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Full object rows for the given object ids.
    FindObjs,
    /// Only `obj_id` and `obj_type` for a single object id.
    FetchObjType,
    /// Insert an object row unless one exists; applied = inserted.
    StoreObj,
    /// Insert or overwrite an object row.
    UpsertObj,
    /// Remove an object row if present.
    DeleteObj,
    /// All object rows of the repository.
    ScanObjs,
    /// Reference rows for the given names.
    FindReferences,
    /// Insert a reference row unless one exists; applied = inserted.
    AddReference,
    /// Set `deleted` if the row matches the expected state.
    MarkReferenceAsDeleted,
    /// Remove the row if it matches the expected state.
    PurgeReference,
    /// Set `pointer` and `prev_ptr` if the row matches the expected state.
    UpdateReferencePointer,
}

impl StatementKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FindObjs => "find-objs",
            Self::FetchObjType => "fetch-obj-type",
            Self::StoreObj => "store-obj",
            Self::UpsertObj => "upsert-obj",
            Self::DeleteObj => "delete-obj",
            Self::ScanObjs => "scan-objs",
            Self::FindReferences => "find-references",
            Self::AddReference => "add-reference",
            Self::MarkReferenceAsDeleted => "mark-reference-as-deleted",
            Self::PurgeReference => "purge-reference",
            Self::UpdateReferencePointer => "update-reference-pointer",
        }
    }

    /// Whether the statement only applies when a condition holds.
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            Self::StoreObj
                | Self::AddReference
                | Self::MarkReferenceAsDeleted
                | Self::PurgeReference
                | Self::UpdateReferencePointer
        )
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parameterized, repository-scoped statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    pub repository_id: String,
    pub keys: Vec<String>,
    pub params: Fields,
}

impl Statement {
    pub fn new(kind: StatementKind, repository_id: impl Into<String>) -> Self {
        Self {
            kind,
            repository_id: repository_id.into(),
            keys: Vec::new(),
            params: Fields::new(),
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.keys.push(key.into());
        self
    }

    pub fn keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn params(mut self, fields: Fields) -> Self {
        self.params.extend(fields);
        self
    }

    /// The only key of a single-key statement.
    pub fn single_key(&self) -> Option<&str> {
        match self.keys.as_slice() {
            [key] => Some(key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_keys_and_params() {
        let stmt = Statement::new(StatementKind::FindObjs, "repo")
            .keys(["a", "b"])
            .key("c")
            .param(columns::OBJ_TYPE, "index");
        assert_eq!(stmt.keys, vec!["a", "b", "c"]);
        assert_eq!(stmt.params.text(columns::OBJ_TYPE), Some("index"));
        assert_eq!(stmt.single_key(), None);
    }

    #[test]
    fn single_key_requires_exactly_one() {
        let stmt = Statement::new(StatementKind::DeleteObj, "repo").key("a");
        assert_eq!(stmt.single_key(), Some("a"));
    }

    #[test]
    fn conditional_kinds() {
        assert!(StatementKind::StoreObj.is_conditional());
        assert!(StatementKind::PurgeReference.is_conditional());
        assert!(!StatementKind::UpsertObj.is_conditional());
        assert!(!StatementKind::FindObjs.is_conditional());
    }
}
