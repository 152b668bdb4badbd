use strata_backend::Fields;
use strata_types::{IndexObj, Obj, ObjId, ObjType, StandardObjType};

use super::{wrong_variant, FieldReader, ObjCodec, SizeBudget};
use crate::error::PersistResult;

/// Codec for [`IndexObj`]. The serialized index is subject to the index
/// segment limit.
pub struct IndexCodec;

impl ObjCodec for IndexCodec {
    fn attribute_name(&self) -> &'static str {
        "i"
    }

    fn encode(&self, obj: &Obj, budget: &SizeBudget) -> PersistResult<Fields> {
        let Obj::Index(i) = obj else {
            return Err(wrong_variant(obj, StandardObjType::Index));
        };
        SizeBudget::check(i.index.len(), budget.serialized_index)?;
        Ok(Fields::new().with("index", i.index.clone()))
    }

    fn decode(&self, fields: &Fields, id: ObjId, _: &ObjType) -> PersistResult<Obj> {
        let r = FieldReader::new(id, fields);
        Ok(Obj::Index(IndexObj::with_id(id, r.bytes("index")?)))
    }
}
