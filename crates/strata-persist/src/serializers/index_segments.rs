use strata_backend::Fields;
use strata_types::{IndexSegmentsObj, Obj, ObjId, ObjType, StandardObjType};

use super::{stripes_value, wrong_variant, FieldReader, ObjCodec, SizeBudget};
use crate::error::PersistResult;

pub struct IndexSegmentsCodec;

impl ObjCodec for IndexSegmentsCodec {
    fn attribute_name(&self) -> &'static str {
        "I"
    }

    fn encode(&self, obj: &Obj, _: &SizeBudget) -> PersistResult<Fields> {
        let Obj::IndexSegments(s) = obj else {
            return Err(wrong_variant(obj, StandardObjType::IndexSegments));
        };
        Ok(Fields::new().with("stripes", stripes_value(&s.stripes)))
    }

    fn decode(&self, fields: &Fields, id: ObjId, _: &ObjType) -> PersistResult<Obj> {
        let r = FieldReader::new(id, fields);
        Ok(Obj::IndexSegments(IndexSegmentsObj::with_id(id, r.stripes("stripes")?)))
    }
}
