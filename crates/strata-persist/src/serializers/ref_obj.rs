use strata_backend::Fields;
use strata_types::{Obj, ObjId, ObjType, RefObj, StandardObjType};

use super::{id_value, opt_id_value, wrong_variant, FieldReader, ObjCodec, SizeBudget};
use crate::error::PersistResult;

pub struct RefCodec;

impl ObjCodec for RefCodec {
    fn attribute_name(&self) -> &'static str {
        "r"
    }

    fn encode(&self, obj: &Obj, _: &SizeBudget) -> PersistResult<Fields> {
        let Obj::Ref(r) = obj else {
            return Err(wrong_variant(obj, StandardObjType::Ref));
        };
        Ok(Fields::new()
            .with("name", r.name.as_str())
            .with("initial_pointer", id_value(&r.initial_pointer))
            .with("created_at", r.created_at_micros)
            .with("ext_info", opt_id_value(r.extended_info_obj.as_ref())))
    }

    fn decode(&self, fields: &Fields, id: ObjId, _: &ObjType) -> PersistResult<Obj> {
        let r = FieldReader::new(id, fields);
        Ok(Obj::Ref(RefObj {
            id,
            name: r.text("name")?.to_string(),
            initial_pointer: r.obj_id("initial_pointer")?,
            created_at_micros: r.int("created_at")?,
            extended_info_obj: r.opt_obj_id("ext_info")?,
        }))
    }
}
