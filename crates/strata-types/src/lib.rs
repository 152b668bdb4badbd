//! Foundation types for strata.
//!
//! This crate provides the data model shared by every strata crate: the
//! content-addressed [`ObjId`], the object type tags, the immutable object
//! payloads, and the mutable [`Reference`].
//!
//! # Key Types
//!
//! - [`ObjId`] -- Content-addressed identifier (BLAKE3 hash)
//! - [`ObjType`] -- Standard or custom object type tag
//! - [`Obj`] -- Tagged union over all object payloads
//! - [`Reference`] -- Named pointer with bounded pointer history

pub mod error;
pub mod id;
pub mod obj;
pub mod obj_type;
pub mod reference;

pub use error::TypeError;
pub use id::{IdHasher, ObjId};
pub use obj::{
    CommitObj, CommitType, Compression, ContentValueObj, CustomObj, Headers, IndexObj,
    IndexSegmentsObj, IndexStripe, Obj, RefObj, StringObj, TagObj, TypedObj,
};
pub use obj_type::{ObjType, StandardObjType};
pub use reference::{PreviousPointer, Reference};
