//! Per-type object codecs and the process-wide serializer registry.
//!
//! An object row consists of the `obj_id` and `obj_type` columns plus one
//! nested map stored under the codec's attribute name. Keeping the type tag
//! outside the payload lets type lookups and filtered scans skip decoding.
//!
//! The registry is built once, validated for unique attribute names, and
//! never mutated afterwards. Custom object types are served by a fallback
//! codec.

mod commit;
mod content_value;
mod custom;
mod index;
mod index_segments;
mod ref_obj;
mod string;
mod tag;

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use bytes::Bytes;
use strata_backend::{columns, Fields, Row, Value};
use strata_types::{Headers, IndexStripe, Obj, ObjId, ObjType, StandardObjType};

use crate::error::{PersistError, PersistResult};

pub use commit::CommitCodec;
pub use content_value::ContentValueCodec;
pub use custom::CustomCodec;
pub use index::IndexCodec;
pub use index_segments::IndexSegmentsCodec;
pub use ref_obj::RefCodec;
pub use string::StringCodec;
pub use tag::TagCodec;

/// The soft size limits active for one encode call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeBudget {
    /// Limit for a commit's embedded incremental index.
    pub incremental_index: usize,
    /// Limit for a serialized index segment.
    pub serialized_index: usize,
}

impl SizeBudget {
    pub fn new(incremental_index: usize, serialized_index: usize) -> Self {
        Self {
            incremental_index,
            serialized_index,
        }
    }

    /// A budget that accepts payloads of any size.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX, usize::MAX)
    }

    /// Fails with [`PersistError::ObjTooLarge`] when `size` exceeds `max`.
    pub fn check(size: usize, max: usize) -> PersistResult<()> {
        if size > max {
            return Err(PersistError::ObjTooLarge { size, max });
        }
        Ok(())
    }
}

/// Encodes and decodes the type-specific fields of one object type.
pub trait ObjCodec: Send + Sync {
    /// Name of the attribute holding this codec's payload map. Unique within
    /// a registry.
    fn attribute_name(&self) -> &'static str;

    /// Encode the payload of `obj`, enforcing the soft limits in `budget`.
    fn encode(&self, obj: &Obj, budget: &SizeBudget) -> PersistResult<Fields>;

    /// Rebuild an object from its payload map.
    fn decode(&self, fields: &Fields, id: ObjId, obj_type: &ObjType) -> PersistResult<Obj>;
}

/// Maps object types to codecs.
pub struct SerializerRegistry {
    standard: BTreeMap<StandardObjType, Box<dyn ObjCodec>>,
    fallback: Box<dyn ObjCodec>,
}

impl SerializerRegistry {
    /// Build a registry from one codec per standard type and a fallback for
    /// custom types.
    ///
    /// Fails if an attribute name is claimed twice or a standard type has no
    /// codec.
    pub fn new(
        codecs: Vec<(StandardObjType, Box<dyn ObjCodec>)>,
        fallback: Box<dyn ObjCodec>,
    ) -> PersistResult<Self> {
        let mut names = HashSet::new();
        let mut standard = BTreeMap::new();
        for (obj_type, codec) in codecs {
            if !names.insert(codec.attribute_name()) {
                return Err(PersistError::DuplicateAttribute(codec.attribute_name().into()));
            }
            if standard.insert(obj_type, codec).is_some() {
                return Err(PersistError::InvalidConfig(format!(
                    "more than one codec for {}",
                    obj_type.name()
                )));
            }
        }
        if !names.insert(fallback.attribute_name()) {
            return Err(PersistError::DuplicateAttribute(fallback.attribute_name().into()));
        }
        if let Some(missing) = StandardObjType::ALL
            .into_iter()
            .find(|t| !standard.contains_key(t))
        {
            return Err(PersistError::InvalidConfig(format!(
                "no codec for {}",
                missing.name()
            )));
        }
        Ok(Self { standard, fallback })
    }

    /// The built-in codecs for every standard type plus [`CustomCodec`].
    pub fn standard() -> PersistResult<Self> {
        let codecs: Vec<(StandardObjType, Box<dyn ObjCodec>)> = vec![
            (StandardObjType::Commit, Box::new(CommitCodec)),
            (StandardObjType::IndexSegments, Box::new(IndexSegmentsCodec)),
            (StandardObjType::Index, Box::new(IndexCodec)),
            (StandardObjType::Ref, Box::new(RefCodec)),
            (StandardObjType::String, Box::new(StringCodec)),
            (StandardObjType::Tag, Box::new(TagCodec)),
            (StandardObjType::Value, Box::new(ContentValueCodec)),
        ];
        Self::new(codecs, Box::new(CustomCodec))
    }

    /// The process-wide registry of built-in codecs.
    pub fn builtin() -> &'static SerializerRegistry {
        static REGISTRY: OnceLock<SerializerRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            Self::standard().expect("built-in serializer attribute names are unique")
        })
    }

    pub fn for_type(&self, obj_type: &ObjType) -> &dyn ObjCodec {
        match obj_type {
            ObjType::Standard(t) => self
                .standard
                .get(t)
                .map_or(self.fallback.as_ref(), |c| c.as_ref()),
            ObjType::Custom(_) => self.fallback.as_ref(),
        }
    }

    /// Encode `obj` into the parameters of an object row (everything except
    /// the id, which travels as the statement key).
    pub fn encode_row(&self, obj: &Obj, budget: &SizeBudget) -> PersistResult<Fields> {
        let obj_type = obj.obj_type();
        let codec = self.for_type(&obj_type);
        let payload = codec.encode(obj, budget)?;
        Ok(Fields::new()
            .with(columns::OBJ_TYPE, obj_type.name())
            .with(codec.attribute_name(), payload))
    }

    /// Decode a full object row.
    pub fn decode_row(&self, row: &Row) -> PersistResult<Obj> {
        let id = row_id(row)?;
        let obj_type = row_type(row)?;
        let codec = self.for_type(&obj_type);
        let payload = row.map(codec.attribute_name()).ok_or_else(|| {
            PersistError::decode(id, format!("missing `{}` payload", codec.attribute_name()))
        })?;
        codec.decode(payload, id, &obj_type)
    }
}

/// The object id of a row.
pub fn row_id(row: &Row) -> PersistResult<ObjId> {
    let hex = row
        .text(columns::OBJ_ID)
        .ok_or_else(|| PersistError::decode("<row>", "missing object id"))?;
    ObjId::from_hex(hex).map_err(|e| PersistError::decode(hex, e))
}

/// The object type of a row, read without touching the payload.
pub fn row_type(row: &Row) -> PersistResult<ObjType> {
    row.text(columns::OBJ_TYPE).map(ObjType::for_name).ok_or_else(|| {
        let id = row.text(columns::OBJ_ID).unwrap_or("<row>");
        PersistError::decode(id, "missing object type")
    })
}

pub(crate) fn wrong_variant(obj: &Obj, expected: StandardObjType) -> PersistError {
    PersistError::Encode {
        id: obj.id(),
        reason: format!("expected a {} object, got {}", expected.name(), obj.obj_type()),
    }
}

// ---------------------------------------------------------------------------
// Shared field encoding
// ---------------------------------------------------------------------------

pub(crate) fn id_value(id: &ObjId) -> Value {
    Value::Text(id.to_hex())
}

pub(crate) fn opt_id_value(id: Option<&ObjId>) -> Value {
    id.map_or(Value::Null, id_value)
}

pub(crate) fn ids_value(ids: &[ObjId]) -> Value {
    Value::List(ids.iter().map(id_value).collect())
}

pub(crate) fn headers_value(headers: &Headers) -> Value {
    Value::Map(
        headers
            .iter()
            .map(|(name, values)| {
                let values = values.iter().map(|v| Value::from(v.as_str())).collect();
                (name.clone(), Value::List(values))
            })
            .collect(),
    )
}

pub(crate) fn stripes_value(stripes: &[IndexStripe]) -> Value {
    Value::List(
        stripes
            .iter()
            .map(|s| {
                Value::Map(
                    Fields::new()
                        .with("first", s.first_key.as_str())
                        .with("last", s.last_key.as_str())
                        .with("segment", id_value(&s.segment)),
                )
            })
            .collect(),
    )
}

/// Typed access to a payload map; every miss is a [`PersistError::Decode`]
/// naming the object.
pub(crate) struct FieldReader<'a> {
    id: ObjId,
    fields: &'a Fields,
}

impl<'a> FieldReader<'a> {
    pub fn new(id: ObjId, fields: &'a Fields) -> Self {
        Self { id, fields }
    }

    fn bad(&self, name: &str) -> PersistError {
        PersistError::decode(self.id, format!("missing or malformed field `{name}`"))
    }

    fn is_null(&self, name: &str) -> bool {
        self.fields.get_or_null(name).is_null()
    }

    pub fn text(&self, name: &str) -> PersistResult<&'a str> {
        self.fields.text(name).ok_or_else(|| self.bad(name))
    }

    pub fn opt_text(&self, name: &str) -> PersistResult<Option<&'a str>> {
        if self.is_null(name) {
            return Ok(None);
        }
        self.text(name).map(Some)
    }

    pub fn int(&self, name: &str) -> PersistResult<i64> {
        self.fields.int(name).ok_or_else(|| self.bad(name))
    }

    pub fn bool(&self, name: &str) -> PersistResult<bool> {
        self.fields.bool(name).ok_or_else(|| self.bad(name))
    }

    pub fn bytes(&self, name: &str) -> PersistResult<Bytes> {
        self.fields.bytes(name).cloned().ok_or_else(|| self.bad(name))
    }

    pub fn opt_bytes(&self, name: &str) -> PersistResult<Option<Bytes>> {
        if self.is_null(name) {
            return Ok(None);
        }
        self.bytes(name).map(Some)
    }

    pub fn obj_id(&self, name: &str) -> PersistResult<ObjId> {
        parse_id(self.text(name)?).ok_or_else(|| self.bad(name))
    }

    pub fn opt_obj_id(&self, name: &str) -> PersistResult<Option<ObjId>> {
        if self.is_null(name) {
            return Ok(None);
        }
        self.obj_id(name).map(Some)
    }

    pub fn obj_ids(&self, name: &str) -> PersistResult<Vec<ObjId>> {
        let list = self.fields.list(name).ok_or_else(|| self.bad(name))?;
        list.iter()
            .map(|v| v.as_text().and_then(parse_id).ok_or_else(|| self.bad(name)))
            .collect()
    }

    pub fn headers(&self, name: &str) -> PersistResult<Headers> {
        let map = self.fields.map(name).ok_or_else(|| self.bad(name))?;
        map.iter()
            .map(|(header, values)| -> PersistResult<(String, Vec<String>)> {
                let values = values
                    .as_list()
                    .ok_or_else(|| self.bad(name))?
                    .iter()
                    .map(|v| v.as_text().map(str::to_string).ok_or_else(|| self.bad(name)))
                    .collect::<PersistResult<Vec<_>>>()?;
                Ok((header.clone(), values))
            })
            .collect()
    }

    pub fn opt_headers(&self, name: &str) -> PersistResult<Option<Headers>> {
        if self.is_null(name) {
            return Ok(None);
        }
        self.headers(name).map(Some)
    }

    pub fn stripes(&self, name: &str) -> PersistResult<Vec<IndexStripe>> {
        let list = self.fields.list(name).ok_or_else(|| self.bad(name))?;
        list.iter()
            .map(|v| -> PersistResult<IndexStripe> {
                let stripe = FieldReader::new(self.id, v.as_map().ok_or_else(|| self.bad(name))?);
                Ok(IndexStripe::new(
                    stripe.text("first")?,
                    stripe.text("last")?,
                    stripe.obj_id("segment")?,
                ))
            })
            .collect()
    }
}

fn parse_id(hex: &str) -> Option<ObjId> {
    ObjId::from_hex(hex).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::{CustomObj, IndexObj, TagObj};

    struct Named(&'static str);

    impl ObjCodec for Named {
        fn attribute_name(&self) -> &'static str {
            self.0
        }

        fn encode(&self, obj: &Obj, _: &SizeBudget) -> PersistResult<Fields> {
            Err(wrong_variant(obj, StandardObjType::Commit))
        }

        fn decode(&self, _: &Fields, id: ObjId, _: &ObjType) -> PersistResult<Obj> {
            Err(PersistError::decode(id, "test codec"))
        }
    }

    fn named_codecs(names: [&'static str; 7]) -> Vec<(StandardObjType, Box<dyn ObjCodec>)> {
        StandardObjType::ALL
            .into_iter()
            .zip(names)
            .map(|(t, n)| (t, Box::new(Named(n)) as Box<dyn ObjCodec>))
            .collect()
    }

    fn stored(obj: &Obj) -> Row {
        let mut row = SerializerRegistry::builtin()
            .encode_row(obj, &SizeBudget::unbounded())
            .unwrap();
        row.insert(columns::OBJ_ID, obj.id().to_hex());
        row
    }

    // -----------------------------------------------------------------------
    // Registry construction
    // -----------------------------------------------------------------------

    #[test]
    fn builtin_registry_is_valid() {
        assert!(SerializerRegistry::standard().is_ok());
        let registry = SerializerRegistry::builtin();
        assert_eq!(registry.for_type(&ObjType::INDEX).attribute_name(), "i");
        assert_eq!(registry.for_type(&ObjType::custom("acme.Widget").unwrap()).attribute_name(), "x");
    }

    #[test]
    fn duplicate_attribute_names_are_rejected() {
        let err = SerializerRegistry::new(
            named_codecs(["a", "b", "c", "d", "e", "f", "a"]),
            Box::new(Named("x")),
        )
        .err()
        .unwrap();
        assert_eq!(err, PersistError::DuplicateAttribute("a".into()));
    }

    #[test]
    fn fallback_name_must_be_unique_too() {
        let err = SerializerRegistry::new(
            named_codecs(["a", "b", "c", "d", "e", "f", "g"]),
            Box::new(Named("g")),
        )
        .err()
        .unwrap();
        assert_eq!(err, PersistError::DuplicateAttribute("g".into()));
    }

    #[test]
    fn every_standard_type_needs_a_codec() {
        let mut codecs = named_codecs(["a", "b", "c", "d", "e", "f", "g"]);
        codecs.pop();
        let err = SerializerRegistry::new(codecs, Box::new(Named("x"))).err().unwrap();
        assert!(matches!(err, PersistError::InvalidConfig(_)));
    }

    // -----------------------------------------------------------------------
    // Rows
    // -----------------------------------------------------------------------

    #[test]
    fn row_carries_type_outside_payload() {
        let obj = Obj::from(TagObj::new(Some("v1".into()), None, None));
        let row = stored(&obj);
        assert_eq!(row_type(&row).unwrap(), ObjType::TAG);
        assert_eq!(row_id(&row).unwrap(), obj.id());
        assert!(row.map("t").is_some());
    }

    #[test]
    fn decode_row_dispatches_on_stored_type() {
        let registry = SerializerRegistry::builtin();
        for obj in [
            Obj::from(IndexObj::new(b"segment".to_vec())),
            Obj::from(CustomObj::new("acme.Widget", serde_json::json!({"k": [1, 2]})).unwrap()),
        ] {
            assert_eq!(registry.decode_row(&stored(&obj)).unwrap(), obj);
        }
    }

    #[test]
    fn decode_row_without_payload_fails() {
        let obj = Obj::from(IndexObj::new(b"segment".to_vec()));
        let row = Fields::new()
            .with(columns::OBJ_ID, obj.id().to_hex())
            .with(columns::OBJ_TYPE, "index");
        let err = SerializerRegistry::builtin().decode_row(&row).unwrap_err();
        assert!(matches!(err, PersistError::Decode { .. }));
    }

    #[test]
    fn size_check_reports_actual_and_limit() {
        assert!(SizeBudget::check(10, 10).is_ok());
        assert_eq!(
            SizeBudget::check(11, 10),
            Err(PersistError::ObjTooLarge { size: 11, max: 10 })
        );
    }
}
