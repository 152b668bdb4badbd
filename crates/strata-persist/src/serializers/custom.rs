use bytes::Bytes;
use strata_backend::Fields;
use strata_types::{CustomObj, Obj, ObjId, ObjType, StandardObjType};

use super::{FieldReader, ObjCodec, SizeBudget};
use crate::error::{PersistError, PersistResult};

/// Fallback codec for object types outside the standard set. The payload is
/// stored as JSON; the type name travels in the row's type column.
pub struct CustomCodec;

impl ObjCodec for CustomCodec {
    fn attribute_name(&self) -> &'static str {
        "x"
    }

    fn encode(&self, obj: &Obj, _: &SizeBudget) -> PersistResult<Fields> {
        let Obj::Custom(c) = obj else {
            return Err(PersistError::Encode {
                id: obj.id(),
                reason: format!("{} objects have a dedicated codec", obj.obj_type()),
            });
        };
        if StandardObjType::from_name(&c.type_name).is_some() {
            return Err(PersistError::Encode {
                id: c.id,
                reason: format!("custom type name `{}` is reserved", c.type_name),
            });
        }
        let data = serde_json::to_vec(&c.data).map_err(|e| PersistError::Encode {
            id: c.id,
            reason: e.to_string(),
        })?;
        Ok(Fields::new().with("data", Bytes::from(data)))
    }

    fn decode(&self, fields: &Fields, id: ObjId, obj_type: &ObjType) -> PersistResult<Obj> {
        let data = FieldReader::new(id, fields).bytes("data")?;
        let data = serde_json::from_slice(&data).map_err(|e| PersistError::decode(id, e))?;
        let custom =
            CustomObj::with_id(id, obj_type.name(), data).map_err(|e| PersistError::decode(id, e))?;
        Ok(Obj::Custom(custom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_name_comes_from_row_type() {
        let obj =
            Obj::from(CustomObj::new("acme.Widget", json!({"size": 3, "tags": ["a"]})).unwrap());
        let fields = CustomCodec.encode(&obj, &SizeBudget::unbounded()).unwrap();
        let decoded = CustomCodec
            .decode(&fields, obj.id(), &ObjType::custom("acme.Widget").unwrap())
            .unwrap();
        assert_eq!(decoded, obj);
    }

    #[test]
    fn malformed_json_fails_decoding() {
        let fields = Fields::new().with("data", Bytes::from_static(b"{not json"));
        let err = CustomCodec
            .decode(&fields, ObjId::from_hash([1; 32]), &ObjType::custom("acme.Widget").unwrap())
            .unwrap_err();
        assert!(matches!(err, PersistError::Decode { .. }));
    }

    #[test]
    fn standard_type_name_is_not_encoded() {
        // Public fields allow bypassing the constructor check.
        let mut custom = CustomObj::new("acme.Widget", json!({})).unwrap();
        custom.type_name = "commit".into();
        let err = CustomCodec
            .encode(&Obj::from(custom), &SizeBudget::unbounded())
            .unwrap_err();
        assert!(matches!(err, PersistError::Encode { .. }));
    }
}
