use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Content-addressed identifier for any stored object.
///
/// An `ObjId` is the BLAKE3 hash of an object's type-specific content (see
/// [`IdHasher`]). Identical content always produces the same `ObjId`, so an id
/// is never reused for two different contents. The lowercase hex form is the
/// canonical string representation, doubles as the backend key, and is what
/// serde emits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId([u8; 32]);

impl ObjId {
    /// Width of an id in bytes.
    pub const LEN: usize = 32;

    /// Compute an `ObjId` from raw bytes without domain separation.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create an `ObjId` from a pre-computed hash.
    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != Self::LEN {
            return Err(TypeError::InvalidLength {
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjId({})", self.short_hex())
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ObjId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

impl From<[u8; 32]> for ObjId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Domain-separated, field-wise BLAKE3 hasher for object ids.
///
/// Every object type hashes under its own domain tag, so two objects of
/// different types never share an id even when their fields are identical.
/// Variable-length fields are length-prefixed.
pub struct IdHasher {
    inner: blake3::Hasher,
}

impl IdHasher {
    /// Start hashing under the given domain tag.
    pub fn new(domain: &str) -> Self {
        let mut inner = blake3::Hasher::new();
        inner.update(b"strata-obj-v1:");
        inner.update(domain.as_bytes());
        inner.update(b":");
        Self { inner }
    }

    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.inner.update(&(data.len() as u64).to_le_bytes());
        self.inner.update(data);
        self
    }

    pub fn str(self, value: &str) -> Self {
        self.bytes(value.as_bytes())
    }

    pub fn opt_str(self, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.bool(true).str(v),
            None => self.bool(false),
        }
    }

    pub fn id(mut self, id: &ObjId) -> Self {
        self.inner.update(&id.0);
        self
    }

    pub fn opt_id(self, id: Option<&ObjId>) -> Self {
        match id {
            Some(id) => self.bool(true).id(id),
            None => self.bool(false),
        }
    }

    pub fn ids(self, ids: &[ObjId]) -> Self {
        ids.iter().fold(self.u64(ids.len() as u64), |h, id| h.id(id))
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.inner.update(&value.to_le_bytes());
        self
    }

    pub fn i64(mut self, value: i64) -> Self {
        self.inner.update(&value.to_le_bytes());
        self
    }

    pub fn bool(mut self, value: bool) -> Self {
        self.inner.update(&[u8::from(value)]);
        self
    }

    /// Finish hashing and produce the id.
    pub fn finish(self) -> ObjId {
        ObjId(*self.inner.finalize().as_bytes())
    }
}
