//! Reference lifecycle: `absent -> active -> deleted -> absent`.
//!
//! Every transition is one conditional write against the reference row. When
//! the condition does not hold the row is read back to tell a missing
//! reference apart from one whose state moved on.

use bytes::Bytes;
use strata_backend::{columns, Fields, Row, Statement, StatementKind, Value};
use strata_types::{ObjId, PreviousPointer, Reference};
use tracing::debug;

use crate::batch::fetch_batched;
use crate::error::{PersistError, PersistResult};
use crate::persist::Persist;

impl Persist {
    pub async fn fetch_reference(&self, name: &str) -> PersistResult<Option<Reference>> {
        let stmt = self.statement(StatementKind::FindReferences).key(name);
        self.backend
            .execute(&stmt)?
            .one()
            .map(|row| decode_reference(&row))
            .transpose()
    }

    /// Fetch many references; the result is aligned with `names`. Absent
    /// references and `None` slots yield `None`.
    pub async fn fetch_references(
        &self,
        names: &[Option<String>],
    ) -> PersistResult<Vec<Option<Reference>>> {
        fetch_batched(
            &self.backend,
            self.config.max_concurrent_requests,
            names,
            |chunk: &[String]| {
                self.statement(StatementKind::FindReferences)
                    .keys(chunk.iter().cloned())
            },
            |row| {
                row.text(columns::REF_NAME)
                    .map(str::to_string)
                    .ok_or_else(|| PersistError::decode("<reference>", "missing reference name"))
            },
            |row| decode_reference(&row).map(Some),
        )
        .await
    }

    /// Create a reference. Fails with [`PersistError::RefAlreadyExists`]
    /// carrying the stored row if the name is taken. The insert is attempted
    /// once; a conflict whose row has vanished by the time it is read back
    /// carries `reference` itself.
    pub async fn add_reference(&self, reference: &Reference) -> PersistResult<Reference> {
        if reference.deleted {
            return Err(PersistError::InvalidReference {
                name: reference.name.clone(),
                reason: "a new reference must not be marked as deleted".into(),
            });
        }
        let stmt = self
            .statement(StatementKind::AddReference)
            .key(reference.name.as_str())
            .params(encode_reference(reference)?);
        if self.backend.execute_cas(&stmt)? {
            debug!(name = %reference.name, pointer = %reference.pointer, "reference added");
            return Ok(reference.clone());
        }
        debug!(name = %reference.name, "reference already exists");
        // The conflicting row may already be gone; report the attempted value then.
        let existing = self
            .fetch_reference(&reference.name)
            .await?
            .unwrap_or_else(|| reference.clone());
        Err(PersistError::RefAlreadyExists(Box::new(existing)))
    }

    /// Tombstone a live reference that still matches `reference`.
    pub async fn mark_reference_as_deleted(
        &self,
        reference: &Reference,
    ) -> PersistResult<Reference> {
        let stmt = self
            .statement(StatementKind::MarkReferenceAsDeleted)
            .key(reference.name.as_str())
            .params(expected_state(reference, false));
        self.conditional(&stmt, &reference.name).await?;
        Ok(reference.clone().with_deleted(true))
    }

    /// Remove a tombstoned reference that still matches `reference`.
    pub async fn purge_reference(&self, reference: &Reference) -> PersistResult<()> {
        let stmt = self
            .statement(StatementKind::PurgeReference)
            .key(reference.name.as_str())
            .params(expected_state(reference, true));
        self.conditional(&stmt, &reference.name).await
    }

    /// Move a live reference that still matches `reference` to
    /// `new_pointer`, recording the old pointer in its history. Returns the
    /// written value.
    pub async fn update_reference_pointer(
        &self,
        reference: &Reference,
        new_pointer: ObjId,
    ) -> PersistResult<Reference> {
        let updated = reference.for_new_pointer(
            new_pointer,
            self.clock.now_micros(),
            self.config.reference_previous_head_count,
        );
        let stmt = self
            .statement(StatementKind::UpdateReferencePointer)
            .key(reference.name.as_str())
            .params(expected_state(reference, false))
            .param(columns::POINTER, updated.pointer.to_hex())
            .param(
                columns::PREV_PTR,
                encode_previous(&updated.name, &updated.previous_pointers)?,
            );
        self.conditional(&stmt, &reference.name).await?;
        Ok(updated)
    }

    async fn conditional(&self, stmt: &Statement, name: &str) -> PersistResult<()> {
        let applied = self.backend.execute_cas(stmt)?;
        debug!(name, kind = %stmt.kind, applied, "reference CAS");
        if applied {
            return Ok(());
        }
        match self.fetch_reference(name).await? {
            None => Err(PersistError::RefNotFound {
                name: name.to_string(),
            }),
            Some(current) => Err(PersistError::RefConditionFailed(Box::new(current))),
        }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn encode_reference(reference: &Reference) -> PersistResult<Fields> {
    Ok(Fields::new()
        .with(columns::POINTER, reference.pointer.to_hex())
        .with(columns::DELETED, reference.deleted)
        .with(columns::CREATED_AT, reference.created_at_micros)
        .with(columns::EXT_INFO, reference.extended_info_obj.map(|id| id.to_hex()))
        .with(
            columns::PREV_PTR,
            encode_previous(&reference.name, &reference.previous_pointers)?,
        ))
}

/// The state a conditional write expects to find.
fn expected_state(reference: &Reference, deleted: bool) -> Fields {
    Fields::new()
        .with(columns::EXPECTED_POINTER, reference.pointer.to_hex())
        .with(columns::EXPECTED_DELETED, deleted)
        .with(columns::EXPECTED_CREATED_AT, reference.created_at_micros)
        .with(
            columns::EXPECTED_EXT_INFO,
            reference.extended_info_obj.map(|id| id.to_hex()),
        )
}

fn encode_previous(name: &str, previous: &[PreviousPointer]) -> PersistResult<Value> {
    if previous.is_empty() {
        return Ok(Value::Null);
    }
    let bytes = bincode::serialize(previous).map_err(|e| PersistError::InvalidReference {
        name: name.to_string(),
        reason: format!("cannot encode pointer history: {e}"),
    })?;
    Ok(Value::Bytes(Bytes::from(bytes)))
}

fn decode_reference(row: &Row) -> PersistResult<Reference> {
    let name = row
        .text(columns::REF_NAME)
        .ok_or_else(|| PersistError::decode("<reference>", "missing reference name"))?;
    let bad = |field: &str| PersistError::decode(name, format!("missing or malformed `{field}`"));
    let id = |field: &str| -> PersistResult<ObjId> {
        row.text(field)
            .and_then(|hex| ObjId::from_hex(hex).ok())
            .ok_or_else(|| bad(field))
    };

    let extended_info_obj = match row.get_or_null(columns::EXT_INFO) {
        Value::Null => None,
        _ => Some(id(columns::EXT_INFO)?),
    };
    let previous_pointers: Vec<PreviousPointer> = match row.get_or_null(columns::PREV_PTR) {
        Value::Null => Vec::new(),
        Value::Bytes(bytes) => bincode::deserialize(bytes)
            .map_err(|e| PersistError::decode(name, format!("pointer history: {e}")))?,
        _ => return Err(bad(columns::PREV_PTR)),
    };
    Ok(Reference {
        name: name.to_string(),
        pointer: id(columns::POINTER)?,
        deleted: row.bool(columns::DELETED).ok_or_else(|| bad(columns::DELETED))?,
        created_at_micros: row.int(columns::CREATED_AT).ok_or_else(|| bad(columns::CREATED_AT))?,
        extended_info_obj,
        previous_pointers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    use strata_backend::{Backend, InMemoryBackend};

    use crate::config::{Clock, StoreConfig};
    use crate::testing::{init_tracing, ConflictingBackend, CountingBackend};

    struct StepClock(AtomicI64);

    impl Clock for StepClock {
        fn now_micros(&self) -> i64 {
            self.0.fetch_add(10, Ordering::SeqCst)
        }
    }

    fn id(n: u8) -> ObjId {
        ObjId::from_hash([n; 32])
    }

    fn persist_with(config: StoreConfig) -> Persist {
        init_tracing();
        Persist::new(Arc::new(InMemoryBackend::new()), config)
            .unwrap()
            .with_clock(Arc::new(StepClock(AtomicI64::new(100))))
    }

    fn persist() -> Persist {
        persist_with(StoreConfig::for_repository("repo"))
    }

    fn history(r: &Reference) -> Vec<ObjId> {
        r.previous_pointers.iter().map(|p| p.pointer).collect()
    }

    // -----------------------------------------------------------------------
    // Add
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn add_then_fetch() {
        let p = persist();
        let main = Reference::new("refs/heads/main", id(0), 1, Some(id(9)));
        assert_eq!(p.add_reference(&main).await.unwrap(), main);
        assert_eq!(p.fetch_reference("refs/heads/main").await.unwrap(), Some(main));
        assert_eq!(p.fetch_reference("refs/heads/other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn second_add_reports_the_stored_reference() {
        let p = persist();
        let first = Reference::new("main", id(0), 1, None);
        p.add_reference(&first).await.unwrap();

        let second = Reference::new("main", id(1), 2, None);
        let err = p.add_reference(&second).await.unwrap_err();
        assert_eq!(err, PersistError::RefAlreadyExists(Box::new(first)));
    }

    #[tokio::test]
    async fn vanished_conflict_is_reported_after_one_attempt() {
        init_tracing();
        let backend = Arc::new(ConflictingBackend::new());
        let p = Persist::new(backend.clone(), StoreConfig::for_repository("repo")).unwrap();
        let main = Reference::new("main", id(0), 1, None);

        let err = p.add_reference(&main).await.unwrap_err();
        assert_eq!(err, PersistError::RefAlreadyExists(Box::new(main)));
        assert_eq!(backend.cas_calls(), 1);
    }

    #[tokio::test]
    async fn deleted_reference_cannot_be_added() {
        let p = persist();
        let r = Reference::new("main", id(0), 1, None).with_deleted(true);
        assert!(matches!(
            p.add_reference(&r).await,
            Err(PersistError::InvalidReference { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Mark deleted and purge
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn full_lifecycle() {
        let p = persist();
        let r = Reference::new("main", id(0), 1, None);
        p.add_reference(&r).await.unwrap();

        let deleted = p.mark_reference_as_deleted(&r).await.unwrap();
        assert!(deleted.deleted);
        assert_eq!(p.fetch_reference("main").await.unwrap(), Some(deleted.clone()));

        p.purge_reference(&deleted).await.unwrap();
        assert_eq!(p.fetch_reference("main").await.unwrap(), None);

        // The name is free again.
        p.add_reference(&r).await.unwrap();
    }

    #[tokio::test]
    async fn stale_mark_reports_the_live_row() {
        let p = persist();
        let r = Reference::new("main", id(0), 1, None);
        p.add_reference(&r).await.unwrap();
        let live = p.update_reference_pointer(&r, id(1)).await.unwrap();

        let err = p.mark_reference_as_deleted(&r).await.unwrap_err();
        assert_eq!(err, PersistError::RefConditionFailed(Box::new(live)));
    }

    #[tokio::test]
    async fn mark_of_unknown_reference_is_not_found() {
        let p = persist();
        let r = Reference::new("ghost", id(0), 1, None);
        assert_eq!(
            p.mark_reference_as_deleted(&r).await.unwrap_err(),
            PersistError::RefNotFound { name: "ghost".into() }
        );
    }

    #[tokio::test]
    async fn purge_requires_the_tombstone() {
        let p = persist();
        let r = Reference::new("main", id(0), 1, None);
        p.add_reference(&r).await.unwrap();
        assert!(matches!(
            p.purge_reference(&r).await,
            Err(PersistError::RefConditionFailed(_))
        ));
        assert!(p.fetch_reference("main").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn deleted_reference_cannot_move() {
        let p = persist();
        let r = Reference::new("main", id(0), 1, None);
        p.add_reference(&r).await.unwrap();
        let deleted = p.mark_reference_as_deleted(&r).await.unwrap();
        assert_eq!(
            p.update_reference_pointer(&deleted, id(1)).await.unwrap_err(),
            PersistError::RefConditionFailed(Box::new(deleted))
        );
    }

    // -----------------------------------------------------------------------
    // Pointer updates
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn history_is_kept_oldest_first() {
        let p = persist();
        let r0 = Reference::new("main", id(0), 1, None);
        p.add_reference(&r0).await.unwrap();
        let r1 = p.update_reference_pointer(&r0, id(1)).await.unwrap();
        let r2 = p.update_reference_pointer(&r1, id(2)).await.unwrap();

        assert_eq!(r2.pointer, id(2));
        assert_eq!(history(&r2), vec![id(0), id(1)]);
        assert_eq!(r2.previous_pointers[0].timestamp_micros, 100);
        assert_eq!(r2.previous_pointers[1].timestamp_micros, 110);
        assert_eq!(p.fetch_reference("main").await.unwrap(), Some(r2));
    }

    #[tokio::test]
    async fn history_is_capped_by_config() {
        let p = persist_with(StoreConfig {
            reference_previous_head_count: 3,
            ..StoreConfig::for_repository("repo")
        });
        let mut r = Reference::new("main", id(0), 1, None);
        p.add_reference(&r).await.unwrap();
        for n in 1..=6 {
            r = p.update_reference_pointer(&r, id(n)).await.unwrap();
        }
        assert_eq!(history(&r), vec![id(3), id(4), id(5)]);
        assert_eq!(p.fetch_reference("main").await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let p = persist();
        let r0 = Reference::new("main", id(0), 1, None);
        p.add_reference(&r0).await.unwrap();
        let r1 = p.update_reference_pointer(&r0, id(1)).await.unwrap();

        assert_eq!(
            p.update_reference_pointer(&r0, id(2)).await.unwrap_err(),
            PersistError::RefConditionFailed(Box::new(r1))
        );
    }

    #[tokio::test]
    async fn update_of_unknown_reference_is_not_found() {
        let p = persist();
        let r = Reference::new("ghost", id(0), 1, None);
        assert!(matches!(
            p.update_reference_pointer(&r, id(1)).await,
            Err(PersistError::RefNotFound { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Batched reads
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn fetch_references_aligns_with_input() {
        let counting = Arc::new(CountingBackend::new(InMemoryBackend::with_max_keys_per_query(2)));
        let backend: Arc<dyn Backend> = counting.clone();
        let p = Persist::new(backend, StoreConfig::for_repository("repo")).unwrap();
        let refs: Vec<Reference> = (0..3)
            .map(|n| Reference::new(format!("r{n}"), id(n), 1, None))
            .collect();
        for r in &refs {
            p.add_reference(r).await.unwrap();
        }
        let before = counting.queries();

        let names = vec![
            Some("r2".to_string()),
            None,
            Some("missing".to_string()),
            Some("r0".to_string()),
            Some("r2".to_string()),
        ];
        let fetched = p.fetch_references(&names).await.unwrap();
        assert_eq!(
            fetched,
            vec![
                Some(refs[2].clone()),
                None,
                None,
                Some(refs[0].clone()),
                Some(refs[2].clone()),
            ]
        );
        // Three distinct names at two per query.
        assert_eq!(counting.queries() - before, 2);
    }

    #[test]
    fn empty_history_is_stored_as_null() {
        let r = Reference::new("main", id(0), 1, None);
        let fields = encode_reference(&r).unwrap();
        assert!(fields.get_or_null(columns::PREV_PTR).is_null());
        assert!(fields.get_or_null(columns::EXT_INFO).is_null());
    }
}
