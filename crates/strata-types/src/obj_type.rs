use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The closed set of object kinds every backend understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StandardObjType {
    /// A commit in the version graph.
    Commit,
    /// Stripes pointing at external index segments.
    IndexSegments,
    /// A serialized index segment.
    Index,
    /// The object backing a named reference.
    Ref,
    /// Textual content with predecessors (e.g. documentation blobs).
    String,
    /// An annotated tag.
    Tag,
    /// A content value.
    Value,
}

impl StandardObjType {
    pub const ALL: [StandardObjType; 7] = [
        Self::Commit,
        Self::IndexSegments,
        Self::Index,
        Self::Ref,
        Self::String,
        Self::Tag,
        Self::Value,
    ];

    /// Stable short name stored alongside every object.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::IndexSegments => "index_segments",
            Self::Index => "index",
            Self::Ref => "ref",
            Self::String => "string",
            Self::Tag => "tag",
            Self::Value => "value",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

/// The type tag of an object.
///
/// Standard kinds map to a fixed codec; any other name is a custom extension
/// type that is persisted through the fallback codec.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjType {
    Standard(StandardObjType),
    Custom(String),
}

impl ObjType {
    pub const COMMIT: ObjType = ObjType::Standard(StandardObjType::Commit);
    pub const INDEX_SEGMENTS: ObjType = ObjType::Standard(StandardObjType::IndexSegments);
    pub const INDEX: ObjType = ObjType::Standard(StandardObjType::Index);
    pub const REF: ObjType = ObjType::Standard(StandardObjType::Ref);
    pub const STRING: ObjType = ObjType::Standard(StandardObjType::String);
    pub const TAG: ObjType = ObjType::Standard(StandardObjType::Tag);
    pub const VALUE: ObjType = ObjType::Standard(StandardObjType::Value);

    /// Create a custom type tag. Standard type names are reserved, since a
    /// stored custom object under such a name would read back as the
    /// standard kind.
    pub fn custom(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if StandardObjType::from_name(&name).is_some() {
            return Err(TypeError::ReservedTypeName(name));
        }
        Ok(Self::Custom(name))
    }

    /// Resolve a stored type name. Unknown names resolve to a custom type.
    pub fn for_name(name: &str) -> Self {
        match StandardObjType::from_name(name) {
            Some(standard) => Self::Standard(standard),
            None => Self::Custom(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Standard(standard) => standard.name(),
            Self::Custom(name) => name,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl From<StandardObjType> for ObjType {
    fn from(standard: StandardObjType) -> Self {
        Self::Standard(standard)
    }
}

impl fmt::Display for ObjType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_names_resolve_back() {
        for standard in StandardObjType::ALL {
            assert_eq!(ObjType::for_name(standard.name()), ObjType::Standard(standard));
        }
    }

    #[test]
    fn unknown_name_is_custom() {
        let t = ObjType::for_name("acme.Widget");
        assert!(t.is_custom());
        assert_eq!(t.name(), "acme.Widget");
    }

    #[test]
    fn display_uses_short_name() {
        assert_eq!(ObjType::INDEX_SEGMENTS.to_string(), "index_segments");
        assert_eq!(ObjType::custom("x").unwrap().to_string(), "x");
    }

    #[test]
    fn custom_rejects_standard_names() {
        for standard in StandardObjType::ALL {
            assert_eq!(
                ObjType::custom(standard.name()),
                Err(TypeError::ReservedTypeName(standard.name().to_string()))
            );
        }
    }
}
