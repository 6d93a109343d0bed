//! Cascade engine
//!
//! Propagates save and delete from an owner to its cascading
//! relations, and keeps many-to-many join rows in sync with the
//! owner's in-memory collection. Save cascades run before the owner's
//! own write so foreign keys referencing related rows are valid by the
//! time the owner lands; the join-table sync runs after it, once the
//! owner's identity (possibly generated by the write) is known.
//!
//! Cascades do not recurse into the related type's own cascading
//! relations, so a cycle between two mapped types cannot loop.

use crate::backend::{ActiveTransaction, Backend};
use crate::entity::{Entity, Record};
use crate::error::OrmResult;
use crate::mapping::EntityMapping;
use crate::relation::RelationKind;

/// Save every cascading related entity, insert-or-update by existence
/// check. Generated identities are written back into the owner's
/// in-memory relations, and an owning one-to-one's foreign-key column
/// on the owner record is backfilled with the related identity.
pub(crate) async fn cascade_save<T: Entity>(
    entity: &mut T,
    owner_record: &mut Record,
    mapping: &EntityMapping,
    backend: &Backend,
    tx: &mut Option<ActiveTransaction>,
) -> OrmResult<()> {
    for relation in mapping.relations.iter().filter(|r| r.cascade) {
        let Some(mut records) = entity.relation_records(&relation.attribute)? else {
            continue;
        };
        let target = (relation.target)()?;

        // Related rows holding the foreign key (children of a
        // one-to-many, the target of an inverse one-to-one) get their
        // back-reference filled in when the owner's identity is already
        // known before they are written.
        let target_holds_fk = relation.kind == RelationKind::OneToMany
            || (relation.kind == RelationKind::OneToOne && relation.is_inverse());
        if target_holds_fk {
            let owner_id = owner_record.value_or_null(mapping.identity_column());
            if !owner_id.is_null() {
                let fk_column = relation.fk_column_on_target(mapping, target);
                if target.column(&fk_column).is_some() {
                    for record in &mut records {
                        record.set(&fk_column, owner_id.clone());
                    }
                }
            }
        }

        for record in records.iter_mut() {
            save_record(backend, tx, target, record).await?;
        }

        if relation.kind == RelationKind::OneToOne && relation.is_owning() {
            if let Some(first) = records.first() {
                let related_id = first.value_or_null(target.identity_column());
                if !related_id.is_null() {
                    owner_record.set(&relation.owning_fk_column(), related_id);
                }
            }
        }

        entity.apply_relation(&relation.attribute, records)?;
    }
    Ok(())
}

/// The same insert-or-update primitive the repository itself uses.
async fn save_record(
    backend: &Backend,
    tx: &mut Option<ActiveTransaction>,
    mapping: &'static EntityMapping,
    record: &mut Record,
) -> OrmResult<()> {
    let id = record.value_or_null(mapping.identity_column());
    if !id.is_null() && backend.exists(tx, mapping, &id).await? {
        backend.update(tx, mapping, record).await?;
    } else {
        backend.insert(tx, mapping, record).await?;
    }
    Ok(())
}

/// Delete cascading related rows before the owner's own delete.
/// To-one and one-to-many cascades delete the related rows by
/// identity; many-to-many cascades remove only the join rows and
/// leave the target entities in place.
pub(crate) async fn cascade_delete<T: Entity>(
    entity: &T,
    owner_record: &Record,
    mapping: &EntityMapping,
    backend: &Backend,
    tx: &mut Option<ActiveTransaction>,
) -> OrmResult<()> {
    for relation in mapping.relations.iter().filter(|r| r.cascade) {
        match relation.kind {
            RelationKind::OneToOne | RelationKind::OneToMany => {
                let Some(records) = entity.relation_records(&relation.attribute)? else {
                    continue;
                };
                let target = (relation.target)()?;
                for record in records {
                    let id = record.value_or_null(target.identity_column());
                    if !id.is_null() {
                        backend.delete_by_identity(tx, target, &id).await?;
                    }
                }
            }
            RelationKind::ManyToMany => {
                let target = (relation.target)()?;
                let owner_id = owner_record.value_or_null(mapping.identity_column());
                if !owner_id.is_null() {
                    backend
                        .delete_join_rows(
                            tx,
                            &relation.join_table_name(mapping, target),
                            &relation.join_column_name(mapping),
                            &owner_id,
                        )
                        .await?;
                }
            }
            // The parent's lifecycle is not owned by the child side.
            RelationKind::ManyToOne => {}
        }
    }
    Ok(())
}

/// Reconcile join tables with the owner's current collections: delete
/// every join row for the owner, then insert one per related identity.
/// A full replace, not a diff: an empty or unset collection clears
/// all links.
pub(crate) async fn sync_many_to_many<T: Entity>(
    entity: &T,
    owner_record: &Record,
    mapping: &EntityMapping,
    backend: &Backend,
    tx: &mut Option<ActiveTransaction>,
) -> OrmResult<()> {
    for relation in mapping
        .relations
        .iter()
        .filter(|r| r.kind == RelationKind::ManyToMany)
    {
        let target = (relation.target)()?;
        let owner_id = owner_record.value_or_null(mapping.identity_column());
        if owner_id.is_null() {
            continue;
        }

        let join_table = relation.join_table_name(mapping, target);
        let join_column = relation.join_column_name(mapping);
        let inverse_join_column = relation.inverse_join_column_name(target);

        backend
            .delete_join_rows(tx, &join_table, &join_column, &owner_id)
            .await?;

        if let Some(records) = entity.relation_records(&relation.attribute)? {
            for record in records {
                let related_id = record.value_or_null(target.identity_column());
                if !related_id.is_null() {
                    backend
                        .insert_join_row(
                            tx,
                            &join_table,
                            &join_column,
                            &inverse_join_column,
                            &owner_id,
                            &related_id,
                        )
                        .await?;
                }
            }
        }
    }
    Ok(())
}
