//! Named references (branches and tags) into the object graph.
//!
//! A reference is a mutable pointer that only changes through
//! compare-and-swap writes. Its lifecycle is `absent -> active -> deleted ->
//! absent`; the `deleted` tombstone can only be removed by an explicit purge.

use serde::{Deserialize, Serialize};

use crate::id::ObjId;

/// A former position of a reference, kept for auditing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousPointer {
    pub pointer: ObjId,
    pub timestamp_micros: i64,
}

/// A named reference in a repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Unique name within the repository (e.g. "refs/heads/main").
    pub name: String,
    /// The object this reference points to.
    pub pointer: ObjId,
    /// Tombstone flag set by mark-as-deleted.
    pub deleted: bool,
    pub created_at_micros: i64,
    pub extended_info_obj: Option<ObjId>,
    /// Prior pointers, oldest first. Never contains the current pointer.
    pub previous_pointers: Vec<PreviousPointer>,
}

impl Reference {
    /// A live reference without history.
    pub fn new(
        name: impl Into<String>,
        pointer: ObjId,
        created_at_micros: i64,
        extended_info_obj: Option<ObjId>,
    ) -> Self {
        Self {
            name: name.into(),
            pointer,
            deleted: false,
            created_at_micros,
            extended_info_obj,
            previous_pointers: Vec::new(),
        }
    }

    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    /// The successor of this reference after moving it to `new_pointer`.
    ///
    /// The current pointer is appended to the history with `now_micros`, any
    /// entry equal to `new_pointer` is dropped, and the oldest entries are
    /// evicted until at most `max_previous` remain.
    pub fn for_new_pointer(&self, new_pointer: ObjId, now_micros: i64, max_previous: usize) -> Self {
        let mut previous: Vec<PreviousPointer> = self
            .previous_pointers
            .iter()
            .copied()
            .chain(std::iter::once(PreviousPointer {
                pointer: self.pointer,
                timestamp_micros: now_micros,
            }))
            .filter(|p| p.pointer != new_pointer)
            .collect();
        if previous.len() > max_previous {
            previous.drain(..previous.len() - max_previous);
        }
        Self {
            pointer: new_pointer,
            previous_pointers: previous,
            ..self.clone()
        }
    }
}
