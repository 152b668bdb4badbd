use strata_backend::Fields;
use strata_types::{Compression, Obj, ObjId, ObjType, StandardObjType, StringObj};

use super::{ids_value, wrong_variant, FieldReader, ObjCodec, SizeBudget};
use crate::error::{PersistError, PersistResult};

pub struct StringCodec;

impl ObjCodec for StringCodec {
    fn attribute_name(&self) -> &'static str {
        "s"
    }

    fn encode(&self, obj: &Obj, _: &SizeBudget) -> PersistResult<Fields> {
        let Obj::String(s) = obj else {
            return Err(wrong_variant(obj, StandardObjType::String));
        };
        Ok(Fields::new()
            .with("content_type", s.content_type.as_str())
            .with("compression", s.compression.name())
            .with("filename", s.filename.as_deref())
            .with("predecessors", ids_value(&s.predecessors))
            .with("text", s.text.clone()))
    }

    fn decode(&self, fields: &Fields, id: ObjId, _: &ObjType) -> PersistResult<Obj> {
        let r = FieldReader::new(id, fields);
        let compression: Compression = r
            .text("compression")?
            .parse()
            .map_err(|e| PersistError::decode(id, e))?;
        Ok(Obj::String(StringObj {
            id,
            content_type: r.text("content_type")?.to_string(),
            compression,
            filename: r.opt_text("filename")?.map(str::to_string),
            predecessors: r.obj_ids("predecessors")?,
            text: r.bytes("text")?,
        }))
    }
}
