use strata_backend::Fields;
use strata_types::{ContentValueObj, Obj, ObjId, ObjType, StandardObjType};

use super::{wrong_variant, FieldReader, ObjCodec, SizeBudget};
use crate::error::{PersistError, PersistResult};

pub struct ContentValueCodec;

impl ObjCodec for ContentValueCodec {
    fn attribute_name(&self) -> &'static str {
        "v"
    }

    fn encode(&self, obj: &Obj, _: &SizeBudget) -> PersistResult<Fields> {
        let Obj::Value(v) = obj else {
            return Err(wrong_variant(obj, StandardObjType::Value));
        };
        Ok(Fields::new()
            .with("content_id", v.content_id.as_str())
            .with("payload", i64::from(v.payload))
            .with("data", v.data.clone()))
    }

    fn decode(&self, fields: &Fields, id: ObjId, _: &ObjType) -> PersistResult<Obj> {
        let r = FieldReader::new(id, fields);
        let payload = r.int("payload")?;
        Ok(Obj::Value(ContentValueObj {
            id,
            content_id: r.text("content_id")?.to_string(),
            payload: u8::try_from(payload)
                .map_err(|_| PersistError::decode(id, format!("payload {payload} out of range")))?,
            data: r.bytes("data")?,
        }))
    }
}
