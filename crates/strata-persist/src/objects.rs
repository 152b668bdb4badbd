//! Content-addressed object operations.

use std::collections::HashSet;

use strata_backend::{Fields, Row, StatementKind};
use strata_types::{Obj, ObjId, ObjType, TypedObj};
use tracing::debug;

use crate::batch::fetch_batched;
use crate::error::{PersistError, PersistResult};
use crate::fanout::WriteFanout;
use crate::persist::Persist;
use crate::scan::ScanAllObjects;
use crate::serializers::{row_id, row_type};

impl Persist {
    /// Fetch one object of any type.
    pub async fn fetch_obj(&self, id: ObjId) -> PersistResult<Obj> {
        self.fetch_single(id, None).await
    }

    /// Fetch one object and extract its payload struct. An object of another
    /// type is reported as not found.
    pub async fn fetch_typed_obj<T: TypedObj>(&self, id: ObjId) -> PersistResult<T> {
        let expected = ObjType::from(T::TYPE);
        let obj = self.fetch_single(id, Some(&expected)).await?;
        T::from_obj(obj).ok_or_else(|| PersistError::ObjNotFound(vec![id]))
    }

    /// Look up only the type of an object.
    pub async fn fetch_obj_type(&self, id: ObjId) -> PersistResult<ObjType> {
        let stmt = self.statement(StatementKind::FetchObjType).key(id.to_hex());
        let row = self
            .backend
            .execute(&stmt)?
            .one()
            .ok_or_else(|| PersistError::ObjNotFound(vec![id]))?;
        row_type(&row)
    }

    /// Fetch many objects; the result is aligned with `ids`.
    ///
    /// `None` slots are not queried and stay `None`. Fails with one
    /// [`PersistError::ObjNotFound`] listing every missing id.
    pub async fn fetch_objs(&self, ids: &[Option<ObjId>]) -> PersistResult<Vec<Option<Obj>>> {
        self.fetch_many(ids, None).await
    }

    /// Like [`fetch_objs`](Self::fetch_objs), but objects that are not of
    /// `obj_type` count as missing.
    pub async fn fetch_objs_of_type(
        &self,
        ids: &[Option<ObjId>],
        obj_type: &ObjType,
    ) -> PersistResult<Vec<Option<Obj>>> {
        self.fetch_many(ids, Some(obj_type)).await
    }

    /// Insert `obj` unless an object with its id exists. Returns whether the
    /// write was applied.
    pub async fn store_obj(
        &self,
        obj: &Obj,
        ignore_soft_size_restrictions: bool,
    ) -> PersistResult<bool> {
        let params = self.encode(obj, ignore_soft_size_restrictions)?;
        let stmt = self
            .statement(StatementKind::StoreObj)
            .key(obj.id().to_hex())
            .params(params);
        let applied = self.backend.execute_cas(&stmt)?;
        debug!(id = %obj.id(), obj_type = %obj.obj_type(), applied, "store object");
        Ok(applied)
    }

    /// Insert many objects; returns one applied flag per input slot (`false`
    /// for `None` slots). Every object is encoded before the first write.
    pub async fn store_objs(&self, objs: &[Option<Obj>]) -> PersistResult<Vec<bool>> {
        self.write_many(StatementKind::StoreObj, objs).await
    }

    /// Insert or overwrite `obj`. Soft size limits always apply.
    pub async fn upsert_obj(&self, obj: &Obj) -> PersistResult<()> {
        let params = self.encode(obj, false)?;
        let stmt = self
            .statement(StatementKind::UpsertObj)
            .key(obj.id().to_hex())
            .params(params);
        self.backend.execute(&stmt)?;
        Ok(())
    }

    pub async fn upsert_objs(&self, objs: &[Option<Obj>]) -> PersistResult<()> {
        self.write_many(StatementKind::UpsertObj, objs).await?;
        Ok(())
    }

    /// Remove an object. Absent ids are ignored.
    pub async fn delete_obj(&self, id: ObjId) -> PersistResult<()> {
        let stmt = self.statement(StatementKind::DeleteObj).key(id.to_hex());
        self.backend.execute(&stmt)?;
        Ok(())
    }

    pub async fn delete_objs(&self, ids: &[Option<ObjId>]) -> PersistResult<()> {
        let mut fanout = WriteFanout::new(
            self.backend.clone(),
            self.config.max_concurrent_requests,
            ids.len(),
        );
        for (index, id) in ids.iter().enumerate() {
            let Some(id) = id else { continue };
            if fanout.failed() {
                break;
            }
            let stmt = self.statement(StatementKind::DeleteObj).key(id.to_hex());
            fanout.submit(index, stmt).await;
        }
        fanout.finish().await?;
        Ok(())
    }

    /// Lazily iterate over every object of the repository whose type is in
    /// `returned_types`.
    pub async fn scan_all_objects(
        &self,
        returned_types: &HashSet<ObjType>,
    ) -> PersistResult<ScanAllObjects> {
        let rows = self.backend.execute(&self.statement(StatementKind::ScanObjs))?;
        debug!(repo = %self.config.repository_id, types = returned_types.len(), "scanning objects");
        Ok(ScanAllObjects::new(rows, returned_types.clone(), self.registry))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn encode(&self, obj: &Obj, ignore_soft_size_restrictions: bool) -> PersistResult<Fields> {
        self.registry
            .encode_row(obj, &self.size_budget(ignore_soft_size_restrictions))
    }

    /// Decode `row`, or `None` when it is not of the expected type.
    fn decode_expecting(&self, row: Row, expected: Option<&ObjType>) -> PersistResult<Option<Obj>> {
        if let Some(expected) = expected {
            if &row_type(&row)? != expected {
                return Ok(None);
            }
        }
        self.registry.decode_row(&row).map(Some)
    }

    async fn fetch_single(&self, id: ObjId, expected: Option<&ObjType>) -> PersistResult<Obj> {
        let stmt = self.statement(StatementKind::FindObjs).key(id.to_hex());
        let row = self.backend.execute(&stmt)?.one();
        match row {
            Some(row) => self
                .decode_expecting(row, expected)?
                .ok_or_else(|| PersistError::ObjNotFound(vec![id])),
            None => Err(PersistError::ObjNotFound(vec![id])),
        }
    }

    async fn fetch_many(
        &self,
        ids: &[Option<ObjId>],
        expected: Option<&ObjType>,
    ) -> PersistResult<Vec<Option<Obj>>> {
        let results = fetch_batched(
            &self.backend,
            self.config.max_concurrent_requests,
            ids,
            |chunk: &[ObjId]| {
                self.statement(StatementKind::FindObjs)
                    .keys(chunk.iter().map(ObjId::to_hex))
            },
            row_id,
            |row| self.decode_expecting(row, expected),
        )
        .await?;

        let mut seen = HashSet::new();
        let missing: Vec<ObjId> = ids
            .iter()
            .zip(&results)
            .filter_map(|(id, found)| match (id, found) {
                (Some(id), None) if seen.insert(*id) => Some(*id),
                _ => None,
            })
            .collect();
        if !missing.is_empty() {
            return Err(PersistError::ObjNotFound(missing));
        }
        Ok(results)
    }

    async fn write_many(
        &self,
        kind: StatementKind,
        objs: &[Option<Obj>],
    ) -> PersistResult<Vec<bool>> {
        let mut encoded = Vec::with_capacity(objs.len());
        for obj in objs {
            encoded.push(match obj {
                Some(obj) => Some((obj.id(), self.encode(obj, false)?)),
                None => None,
            });
        }

        let mut fanout = WriteFanout::new(
            self.backend.clone(),
            self.config.max_concurrent_requests,
            objs.len(),
        );
        for (index, item) in encoded.into_iter().enumerate() {
            let Some((id, params)) = item else { continue };
            if fanout.failed() {
                break;
            }
            let stmt = self.statement(kind).key(id.to_hex()).params(params);
            fanout.submit(index, stmt).await;
        }
        fanout.finish().await
    }
}
