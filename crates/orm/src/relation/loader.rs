//! Relation graph loading
//!
//! Resolves EAGER relations after every single-entity and collection
//! fetch. Each resolution is one hop: related entities are fetched and
//! applied, but their own relations are not resolved in turn, which
//! bounds a read to the relations the mapping itself declares.

use crate::backend::{ActiveTransaction, Backend};
use crate::entity::{Entity, Record};
use crate::error::OrmResult;
use crate::mapping::EntityMapping;
use crate::relation::{FetchPolicy, RelationDescriptor, RelationKind};

/// Resolve and apply every EAGER relation of a freshly fetched entity.
///
/// The record is the row/document the entity was decoded from; owning
/// foreign keys are read from it directly. A relation whose target
/// mapping fails extraction fails the whole fetch.
pub(crate) async fn load_eager_relations<T: Entity>(
    entity: &mut T,
    record: &Record,
    mapping: &EntityMapping,
    backend: &Backend,
    tx: &mut Option<ActiveTransaction>,
) -> OrmResult<()> {
    for relation in &mapping.relations {
        if relation.fetch != FetchPolicy::Eager {
            continue;
        }
        let related = resolve_relation(record, relation, mapping, backend, tx).await?;
        entity.apply_relation(&relation.attribute, related)?;
    }
    Ok(())
}

/// Fetch the records a single relation points at.
///
/// Also used for explicit resolution of LAZY relations.
pub(crate) async fn resolve_relation(
    record: &Record,
    relation: &RelationDescriptor,
    mapping: &EntityMapping,
    backend: &Backend,
    tx: &mut Option<ActiveTransaction>,
) -> OrmResult<Vec<Record>> {
    let target = (relation.target)()?;

    match relation.kind {
        RelationKind::ManyToOne => {
            fetch_owning_to_one(record, relation, target, backend, tx).await
        }
        RelationKind::OneToOne => {
            if relation.is_owning() {
                fetch_owning_to_one(record, relation, target, backend, tx).await
            } else if relation.is_inverse() {
                let owner_id = record.value_or_null(mapping.identity_column());
                if owner_id.is_null() {
                    return Ok(Vec::new());
                }
                let fk_column = relation.fk_column_on_target(mapping, target);
                let related = backend
                    .fetch_one_by_column(tx, target, &fk_column, &owner_id)
                    .await?;
                Ok(related.into_iter().collect())
            } else {
                // Neither side declared a join hint; the association
                // can only be resolved through an explicit query.
                Ok(Vec::new())
            }
        }
        RelationKind::OneToMany => {
            let owner_id = record.value_or_null(mapping.identity_column());
            if owner_id.is_null() {
                return Ok(Vec::new());
            }
            let fk_column = relation.fk_column_on_target(mapping, target);
            backend
                .fetch_all_by_column(tx, target, &fk_column, &owner_id)
                .await
        }
        RelationKind::ManyToMany => {
            let owner_id = record.value_or_null(mapping.identity_column());
            if owner_id.is_null() {
                return Ok(Vec::new());
            }
            backend
                .fetch_via_join(
                    tx,
                    target,
                    &relation.join_table_name(mapping, target),
                    &relation.join_column_name(mapping),
                    &relation.inverse_join_column_name(target),
                    &owner_id,
                )
                .await
        }
    }
}

/// Owning to-one: the foreign key sits on the fetched record; follow
/// it with a fetch-by-identity on the target.
async fn fetch_owning_to_one(
    record: &Record,
    relation: &RelationDescriptor,
    target: &'static EntityMapping,
    backend: &Backend,
    tx: &mut Option<ActiveTransaction>,
) -> OrmResult<Vec<Record>> {
    let fk_value = record.value_or_null(&relation.owning_fk_column());
    if fk_value.is_null() {
        return Ok(Vec::new());
    }
    let related = backend.fetch_by_identity(tx, target, &fk_value).await?;
    Ok(related.into_iter().collect())
}
