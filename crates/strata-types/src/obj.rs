//! Object payloads of the version graph.
//!
//! Every object is immutable and identified by an [`ObjId`] derived from its
//! type-specific content. The content-addressed constructors (`new`) compute
//! the id; `with_id` accepts an id computed elsewhere.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::TypeError;
use crate::id::{IdHasher, ObjId};
use crate::obj_type::{ObjType, StandardObjType};

/// Multi-valued, ordered header map used by commits and tags.
pub type Headers = BTreeMap<String, Vec<String>>;

/// A stored object: one variant per standard type plus custom extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Obj {
    Commit(CommitObj),
    IndexSegments(IndexSegmentsObj),
    Index(IndexObj),
    Ref(RefObj),
    String(StringObj),
    Tag(TagObj),
    Value(ContentValueObj),
    Custom(CustomObj),
}

impl Obj {
    pub fn id(&self) -> ObjId {
        match self {
            Self::Commit(o) => o.id,
            Self::IndexSegments(o) => o.id,
            Self::Index(o) => o.id,
            Self::Ref(o) => o.id,
            Self::String(o) => o.id,
            Self::Tag(o) => o.id,
            Self::Value(o) => o.id,
            Self::Custom(o) => o.id,
        }
    }

    pub fn obj_type(&self) -> ObjType {
        match self {
            Self::Commit(_) => ObjType::COMMIT,
            Self::IndexSegments(_) => ObjType::INDEX_SEGMENTS,
            Self::Index(_) => ObjType::INDEX,
            Self::Ref(_) => ObjType::REF,
            Self::String(_) => ObjType::STRING,
            Self::Tag(_) => ObjType::TAG,
            Self::Value(_) => ObjType::VALUE,
            Self::Custom(o) => ObjType::Custom(o.type_name.clone()),
        }
    }
}

/// Standard payload structs that can be extracted from an [`Obj`].
pub trait TypedObj: Sized + Into<Obj> {
    const TYPE: StandardObjType;

    /// Returns `None` when the object is of a different type.
    fn from_obj(obj: Obj) -> Option<Self>;
}

macro_rules! typed_obj {
    ($ty:ident, $variant:ident) => {
        impl From<$ty> for Obj {
            fn from(o: $ty) -> Self {
                Obj::$variant(o)
            }
        }

        impl TypedObj for $ty {
            const TYPE: StandardObjType = StandardObjType::$variant;

            fn from_obj(obj: Obj) -> Option<Self> {
                match obj {
                    Obj::$variant(o) => Some(o),
                    _ => None,
                }
            }
        }
    };
}

typed_obj!(CommitObj, Commit);
typed_obj!(IndexSegmentsObj, IndexSegments);
typed_obj!(IndexObj, Index);
typed_obj!(RefObj, Ref);
typed_obj!(StringObj, String);
typed_obj!(TagObj, Tag);
typed_obj!(ContentValueObj, Value);

impl From<CustomObj> for Obj {
    fn from(o: CustomObj) -> Self {
        Obj::Custom(o)
    }
}

fn hash_headers(hasher: IdHasher, headers: &Headers) -> IdHasher {
    headers
        .iter()
        .fold(hasher.u64(headers.len() as u64), |h, (name, values)| {
            values
                .iter()
                .fold(h.str(name).u64(values.len() as u64), |h, v| h.str(v))
        })
}

fn hash_stripes(hasher: IdHasher, stripes: &[IndexStripe]) -> IdHasher {
    stripes
        .iter()
        .fold(hasher.u64(stripes.len() as u64), |h, s| {
            h.str(&s.first_key).str(&s.last_key).id(&s.segment)
        })
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommitType {
    Normal,
    Internal,
}

impl CommitType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Internal => "internal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "normal" => Some(Self::Normal),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

/// Key range of an external index segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexStripe {
    pub first_key: String,
    pub last_key: String,
    pub segment: ObjId,
}

impl IndexStripe {
    pub fn new(first_key: impl Into<String>, last_key: impl Into<String>, segment: ObjId) -> Self {
        Self {
            first_key: first_key.into(),
            last_key: last_key.into(),
            segment,
        }
    }
}

/// A commit in the version graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitObj {
    pub id: ObjId,
    pub created_micros: i64,
    pub seq: u64,
    pub message: String,
    pub headers: Headers,
    pub reference_index: Option<ObjId>,
    pub reference_index_stripes: Vec<IndexStripe>,
    /// Direct parent first, then older ancestors.
    pub tail: Vec<ObjId>,
    pub secondary_parents: Vec<ObjId>,
    /// Embedded incremental index; bounded by the incremental index limit.
    pub incremental_index: Bytes,
    pub incomplete_index: bool,
    pub commit_type: CommitType,
}

impl CommitObj {
    /// A normal commit without index data. Use the `with_*` methods to fill
    /// in the remaining fields; each recomputes the id.
    pub fn new(created_micros: i64, seq: u64, message: impl Into<String>, tail: Vec<ObjId>) -> Self {
        let mut commit = Self {
            id: ObjId::from_hash([0; 32]),
            created_micros,
            seq,
            message: message.into(),
            headers: Headers::new(),
            reference_index: None,
            reference_index_stripes: Vec::new(),
            tail,
            secondary_parents: Vec::new(),
            incremental_index: Bytes::new(),
            incomplete_index: false,
            commit_type: CommitType::Normal,
        };
        commit.id = commit.compute_id();
        commit
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self.rehash()
    }

    pub fn with_incremental_index(mut self, index: impl Into<Bytes>) -> Self {
        self.incremental_index = index.into();
        self.rehash()
    }

    pub fn with_reference_index(mut self, index: ObjId, stripes: Vec<IndexStripe>) -> Self {
        self.reference_index = Some(index);
        self.reference_index_stripes = stripes;
        self.rehash()
    }

    pub fn with_secondary_parents(mut self, parents: Vec<ObjId>) -> Self {
        self.secondary_parents = parents;
        self.rehash()
    }

    pub fn with_commit_type(mut self, commit_type: CommitType) -> Self {
        self.commit_type = commit_type;
        self.rehash()
    }

    pub fn compute_id(&self) -> ObjId {
        let h = IdHasher::new(StandardObjType::Commit.name())
            .i64(self.created_micros)
            .u64(self.seq)
            .str(&self.message);
        let h = hash_headers(h, &self.headers).opt_id(self.reference_index.as_ref());
        hash_stripes(h, &self.reference_index_stripes)
            .ids(&self.tail)
            .ids(&self.secondary_parents)
            .bytes(&self.incremental_index)
            .bool(self.incomplete_index)
            .str(self.commit_type.name())
            .finish()
    }

    fn rehash(mut self) -> Self {
        self.id = self.compute_id();
        self
    }
}

// ---------------------------------------------------------------------------
// IndexSegments
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexSegmentsObj {
    pub id: ObjId,
    pub stripes: Vec<IndexStripe>,
}

impl IndexSegmentsObj {
    pub fn new(stripes: Vec<IndexStripe>) -> Self {
        let id = hash_stripes(IdHasher::new(StandardObjType::IndexSegments.name()), &stripes).finish();
        Self { id, stripes }
    }

    pub fn with_id(id: ObjId, stripes: Vec<IndexStripe>) -> Self {
        Self { id, stripes }
    }
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// A serialized index segment; bounded by the index segment limit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexObj {
    pub id: ObjId,
    pub index: Bytes,
}

impl IndexObj {
    pub fn new(index: impl Into<Bytes>) -> Self {
        let index = index.into();
        let id = IdHasher::new(StandardObjType::Index.name()).bytes(&index).finish();
        Self { id, index }
    }

    pub fn with_id(id: ObjId, index: impl Into<Bytes>) -> Self {
        Self {
            id,
            index: index.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ref
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefObj {
    pub id: ObjId,
    pub name: String,
    pub initial_pointer: ObjId,
    pub created_at_micros: i64,
    pub extended_info_obj: Option<ObjId>,
}

impl RefObj {
    pub fn new(
        name: impl Into<String>,
        initial_pointer: ObjId,
        created_at_micros: i64,
        extended_info_obj: Option<ObjId>,
    ) -> Self {
        let name = name.into();
        let id = IdHasher::new(StandardObjType::Ref.name())
            .str(&name)
            .id(&initial_pointer)
            .i64(created_at_micros)
            .opt_id(extended_info_obj.as_ref())
            .finish();
        Self {
            id,
            name,
            initial_pointer,
            created_at_micros,
            extended_info_obj,
        }
    }
}

// ---------------------------------------------------------------------------
// String
// ---------------------------------------------------------------------------

/// Compression applied to the text of a [`StringObj`]. Stored as a tag only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Compression {
    None,
    Gzip,
    Deflate,
    Zstd,
    Lz4,
    Snappy,
    Brotli,
}

impl Compression {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Zstd => "zstd",
            Self::Lz4 => "lz4",
            Self::Snappy => "snappy",
            Self::Brotli => "brotli",
        }
    }
}

impl FromStr for Compression {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "none" => Self::None,
            "gzip" => Self::Gzip,
            "deflate" => Self::Deflate,
            "zstd" => Self::Zstd,
            "lz4" => Self::Lz4,
            "snappy" => Self::Snappy,
            "brotli" => Self::Brotli,
            other => return Err(TypeError::UnknownCompression(other.to_string())),
        })
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringObj {
    pub id: ObjId,
    pub content_type: String,
    pub compression: Compression,
    pub filename: Option<String>,
    pub predecessors: Vec<ObjId>,
    pub text: Bytes,
}

impl StringObj {
    pub fn new(
        content_type: impl Into<String>,
        compression: Compression,
        filename: Option<String>,
        predecessors: Vec<ObjId>,
        text: impl Into<Bytes>,
    ) -> Self {
        let content_type = content_type.into();
        let text = text.into();
        let id = IdHasher::new(StandardObjType::String.name())
            .str(&content_type)
            .str(compression.name())
            .opt_str(filename.as_deref())
            .ids(&predecessors)
            .bytes(&text)
            .finish();
        Self {
            id,
            content_type,
            compression,
            filename,
            predecessors,
            text,
        }
    }
}

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagObj {
    pub id: ObjId,
    pub message: Option<String>,
    pub headers: Option<Headers>,
    pub signature: Option<Bytes>,
}

impl TagObj {
    pub fn new(message: Option<String>, headers: Option<Headers>, signature: Option<Bytes>) -> Self {
        let h = IdHasher::new(StandardObjType::Tag.name()).opt_str(message.as_deref());
        let h = match &headers {
            Some(headers) => hash_headers(h.bool(true), headers),
            None => h.bool(false),
        };
        let h = match &signature {
            Some(sig) => h.bool(true).bytes(sig),
            None => h.bool(false),
        };
        Self {
            id: h.finish(),
            message,
            headers,
            signature,
        }
    }
}

// ---------------------------------------------------------------------------
// ContentValue
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentValueObj {
    pub id: ObjId,
    pub content_id: String,
    /// Discriminates the kind of content held in `data`.
    pub payload: u8,
    pub data: Bytes,
}

impl ContentValueObj {
    pub fn new(content_id: impl Into<String>, payload: u8, data: impl Into<Bytes>) -> Self {
        let content_id = content_id.into();
        let data = data.into();
        let id = IdHasher::new(StandardObjType::Value.name())
            .str(&content_id)
            .u64(u64::from(payload))
            .bytes(&data)
            .finish();
        Self {
            id,
            content_id,
            payload,
            data,
        }
    }
}

// ---------------------------------------------------------------------------
// Custom
// ---------------------------------------------------------------------------

/// An extension object whose structure is opaque to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomObj {
    pub id: ObjId,
    pub type_name: String,
    pub data: serde_json::Value,
}

impl CustomObj {
    /// Fails with [`TypeError::ReservedTypeName`] when `type_name` is the
    /// name of a standard type.
    pub fn new(type_name: impl Into<String>, data: serde_json::Value) -> Result<Self, TypeError> {
        let type_name = ObjType::custom(type_name)?.name().to_string();
        let id = IdHasher::new("custom")
            .str(&type_name)
            .str(&data.to_string())
            .finish();
        Ok(Self {
            id,
            type_name,
            data,
        })
    }

    pub fn with_id(
        id: ObjId,
        type_name: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<Self, TypeError> {
        let type_name = ObjType::custom(type_name)?.name().to_string();
        Ok(Self {
            id,
            type_name,
            data,
        })
    }
}
