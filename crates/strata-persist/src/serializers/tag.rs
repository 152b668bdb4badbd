use strata_backend::{Fields, Value};
use strata_types::{Obj, ObjId, ObjType, StandardObjType, TagObj};

use super::{headers_value, wrong_variant, FieldReader, ObjCodec, SizeBudget};
use crate::error::PersistResult;

pub struct TagCodec;

impl ObjCodec for TagCodec {
    fn attribute_name(&self) -> &'static str {
        "t"
    }

    fn encode(&self, obj: &Obj, _: &SizeBudget) -> PersistResult<Fields> {
        let Obj::Tag(t) = obj else {
            return Err(wrong_variant(obj, StandardObjType::Tag));
        };
        Ok(Fields::new()
            .with("message", t.message.as_deref())
            .with("headers", t.headers.as_ref().map_or(Value::Null, headers_value))
            .with("signature", t.signature.clone()))
    }

    fn decode(&self, fields: &Fields, id: ObjId, _: &ObjType) -> PersistResult<Obj> {
        let r = FieldReader::new(id, fields);
        Ok(Obj::Tag(TagObj {
            id,
            message: r.opt_text("message")?.map(str::to_string),
            headers: r.opt_headers("headers")?,
            signature: r.opt_bytes("signature")?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use strata_types::Headers;

    #[test]
    fn absent_and_present_optionals() {
        let headers = Headers::from([("signer".to_string(), vec!["ci".to_string()])]);
        for obj in [
            Obj::from(TagObj::new(None, None, None)),
            Obj::from(TagObj::new(
                Some("release 1.0".into()),
                Some(headers),
                Some(Bytes::from_static(b"sig")),
            )),
        ] {
            let fields = TagCodec.encode(&obj, &SizeBudget::unbounded()).unwrap();
            assert_eq!(TagCodec.decode(&fields, obj.id(), &ObjType::TAG).unwrap(), obj);
        }
    }

    #[test]
    fn empty_headers_differ_from_no_headers() {
        let obj = Obj::from(TagObj::new(None, Some(Headers::new()), None));
        let fields = TagCodec.encode(&obj, &SizeBudget::unbounded()).unwrap();
        let Obj::Tag(decoded) = TagCodec.decode(&fields, obj.id(), &ObjType::TAG).unwrap() else {
            panic!("expected a tag");
        };
        assert_eq!(decoded.headers, Some(Headers::new()));
    }
}
