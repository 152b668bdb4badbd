use std::collections::HashSet;
use std::fmt;

use strata_backend::ResultSet;
use strata_types::{Obj, ObjType};

use crate::error::PersistResult;
use crate::serializers::{row_type, SerializerRegistry};

/// Forward-only iterator over the objects of a repository.
///
/// Rows whose type is not requested are skipped without decoding their
/// payload. The iterator cannot be restarted; scan again for a fresh pass.
pub struct ScanAllObjects {
    rows: ResultSet,
    returned_types: HashSet<ObjType>,
    registry: &'static SerializerRegistry,
}

impl ScanAllObjects {
    pub(crate) fn new(
        rows: ResultSet,
        returned_types: HashSet<ObjType>,
        registry: &'static SerializerRegistry,
    ) -> Self {
        Self {
            rows,
            returned_types,
            registry,
        }
    }
}

impl Iterator for ScanAllObjects {
    type Item = PersistResult<Obj>;

    fn next(&mut self) -> Option<Self::Item> {
        for row in self.rows.by_ref() {
            match row_type(&row) {
                Ok(t) if !self.returned_types.contains(&t) => continue,
                Ok(_) => return Some(self.registry.decode_row(&row)),
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

impl fmt::Debug for ScanAllObjects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanAllObjects")
            .field("returned_types", &self.returned_types)
            .finish_non_exhaustive()
    }
}
