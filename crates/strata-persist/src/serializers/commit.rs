use strata_backend::Fields;
use strata_types::{CommitObj, CommitType, Obj, ObjId, ObjType, StandardObjType};

use super::{
    headers_value, ids_value, opt_id_value, stripes_value, wrong_variant, FieldReader, ObjCodec,
    SizeBudget,
};
use crate::error::{PersistError, PersistResult};

/// Codec for [`CommitObj`]. The embedded incremental index is subject to the
/// incremental index limit.
pub struct CommitCodec;

impl ObjCodec for CommitCodec {
    fn attribute_name(&self) -> &'static str {
        "c"
    }

    fn encode(&self, obj: &Obj, budget: &SizeBudget) -> PersistResult<Fields> {
        let Obj::Commit(c) = obj else {
            return Err(wrong_variant(obj, StandardObjType::Commit));
        };
        SizeBudget::check(c.incremental_index.len(), budget.incremental_index)?;
        let seq = i64::try_from(c.seq).map_err(|_| PersistError::Encode {
            id: c.id,
            reason: format!("sequence number {} out of range", c.seq),
        })?;
        Ok(Fields::new()
            .with("created", c.created_micros)
            .with("seq", seq)
            .with("message", c.message.as_str())
            .with("headers", headers_value(&c.headers))
            .with("ref_index", opt_id_value(c.reference_index.as_ref()))
            .with("ref_stripes", stripes_value(&c.reference_index_stripes))
            .with("tail", ids_value(&c.tail))
            .with("parents", ids_value(&c.secondary_parents))
            .with("inc_index", c.incremental_index.clone())
            .with("inc_incomplete", c.incomplete_index)
            .with("commit_type", c.commit_type.name()))
    }

    fn decode(&self, fields: &Fields, id: ObjId, _: &ObjType) -> PersistResult<Obj> {
        let r = FieldReader::new(id, fields);
        let seq = r.int("seq")?;
        let commit_type = r.text("commit_type")?;
        Ok(Obj::Commit(CommitObj {
            id,
            created_micros: r.int("created")?,
            seq: u64::try_from(seq)
                .map_err(|_| PersistError::decode(id, format!("negative sequence number {seq}")))?,
            message: r.text("message")?.to_string(),
            headers: r.headers("headers")?,
            reference_index: r.opt_obj_id("ref_index")?,
            reference_index_stripes: r.stripes("ref_stripes")?,
            tail: r.obj_ids("tail")?,
            secondary_parents: r.obj_ids("parents")?,
            incremental_index: r.bytes("inc_index")?,
            incomplete_index: r.bool("inc_incomplete")?,
            commit_type: CommitType::from_name(commit_type).ok_or_else(|| {
                PersistError::decode(id, format!("unknown commit type `{commit_type}`"))
            })?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::IndexStripe;

    fn id(n: u8) -> ObjId {
        ObjId::from_hash([n; 32])
    }

    fn full_commit() -> CommitObj {
        CommitObj::new(1_700_000_000_000_000, 42, "initial import", vec![id(1), id(2)])
            .with_header("author", "alice")
            .with_header("author", "bob")
            .with_reference_index(id(3), vec![IndexStripe::new("a", "m", id(4))])
            .with_secondary_parents(vec![id(5)])
            .with_incremental_index(vec![7u8; 16])
            .with_commit_type(CommitType::Internal)
    }

    #[test]
    fn all_fields_survive_encoding() {
        let commit = full_commit();
        let fields = CommitCodec
            .encode(&commit.clone().into(), &SizeBudget::unbounded())
            .unwrap();
        let decoded = CommitCodec.decode(&fields, commit.id, &ObjType::COMMIT).unwrap();
        assert_eq!(decoded, Obj::Commit(commit));
    }

    #[test]
    fn incremental_index_over_limit_is_rejected() {
        let commit = CommitObj::new(1, 1, "big", vec![]).with_incremental_index(vec![0u8; 101]);
        let err = CommitCodec
            .encode(&commit.into(), &SizeBudget::new(100, usize::MAX))
            .unwrap_err();
        assert_eq!(err, PersistError::ObjTooLarge { size: 101, max: 100 });
    }

    #[test]
    fn index_segment_limit_does_not_apply_to_commits() {
        let commit = CommitObj::new(1, 1, "big", vec![]).with_incremental_index(vec![0u8; 101]);
        assert!(CommitCodec
            .encode(&commit.into(), &SizeBudget::new(usize::MAX, 10))
            .is_ok());
    }

    #[test]
    fn unknown_commit_type_fails_decoding() {
        let commit = full_commit();
        let mut fields = CommitCodec
            .encode(&commit.clone().into(), &SizeBudget::unbounded())
            .unwrap();
        fields.insert("commit_type", "merge");
        let err = CommitCodec.decode(&fields, commit.id, &ObjType::COMMIT).unwrap_err();
        assert!(matches!(err, PersistError::Decode { .. }));
    }
}
