//! Repository façade
//!
//! One repository per mapped type, bound to a backend chosen once at
//! construction. Sequences existence-check → insert/update → cascade →
//! relation-load, and scopes explicit transactions over every
//! subsequent call until commit or rollback.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::backend::{ActiveTransaction, Backend};
use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::mapping::{registry, EntityMapping};
use crate::query::Query;
use crate::relation::{cascade, loader};
use crate::validation;
use crate::value::Value;

/// Persistence surface for one mapped type.
pub struct Repository<T: Entity> {
    backend: Arc<Backend>,
    pub(crate) transaction: Option<ActiveTransaction>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Repository<T> {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self {
            backend,
            transaction: None,
            _entity: PhantomData,
        }
    }

    pub(crate) fn mapping() -> OrmResult<&'static EntityMapping> {
        registry::mapping_of::<T>()
    }

    pub(crate) fn backend(&self) -> Arc<Backend> {
        self.backend.clone()
    }

    /// Insert or update based on an existence check: an entity whose
    /// identity already names a stored row is updated, anything else is
    /// inserted and its generated identity written back. Cascading
    /// relations are saved first; many-to-many links are reconciled
    /// after the owner lands.
    pub async fn save(&mut self, entity: &mut T) -> OrmResult<()> {
        let mapping = Self::mapping()?;
        let mut record = entity.to_record();
        validation::validate(mapping, &record)?;

        let backend = self.backend();
        let id = entity.identity_value();
        let exists = if id.is_null() {
            false
        } else {
            backend.exists(&mut self.transaction, mapping, &id).await?
        };

        cascade::cascade_save(entity, &mut record, mapping, &backend, &mut self.transaction)
            .await?;

        if exists {
            backend.update(&mut self.transaction, mapping, &record).await?;
        } else {
            let new_id = backend
                .insert(&mut self.transaction, mapping, &mut record)
                .await?;
            entity.set_identity_value(new_id);
        }

        cascade::sync_many_to_many(entity, &record, mapping, &backend, &mut self.transaction)
            .await?;
        tracing::debug!(collection = %mapping.collection, updated = exists, "saved entity");
        Ok(())
    }

    /// Update the stored row/document for this entity's identity.
    pub async fn update(&mut self, entity: &mut T) -> OrmResult<()> {
        let mapping = Self::mapping()?;
        let mut record = entity.to_record();
        validation::validate(mapping, &record)?;

        let backend = self.backend();
        cascade::cascade_save(entity, &mut record, mapping, &backend, &mut self.transaction)
            .await?;
        backend.update(&mut self.transaction, mapping, &record).await?;
        cascade::sync_many_to_many(entity, &record, mapping, &backend, &mut self.transaction)
            .await?;
        Ok(())
    }

    /// Delete the entity's row/document, cascading first.
    pub async fn delete(&mut self, entity: &T) -> OrmResult<()> {
        let mapping = Self::mapping()?;
        let id = entity.identity_value();
        if id.is_null() {
            return Err(OrmError::Validation(
                "cannot delete an entity without an identity value".into(),
            ));
        }

        let backend = self.backend();
        let record = entity.to_record();
        cascade::cascade_delete(entity, &record, mapping, &backend, &mut self.transaction)
            .await?;
        backend
            .delete_by_identity(&mut self.transaction, mapping, &id)
            .await?;
        tracing::debug!(collection = %mapping.collection, "deleted entity");
        Ok(())
    }

    /// Delete by identity without cascading. Returns whether a
    /// row/document was removed.
    pub async fn delete_by_id(&mut self, id: impl Into<Value>) -> OrmResult<bool> {
        let mapping = Self::mapping()?;
        let id = id.into();
        if id.is_null() {
            return Err(OrmError::Validation("identity value is required".into()));
        }
        let backend = self.backend();
        let removed = backend
            .delete_by_identity(&mut self.transaction, mapping, &id)
            .await?;
        Ok(removed > 0)
    }

    /// Fetch one entity by identity, resolving its EAGER relations.
    pub async fn find_by_id(&mut self, id: impl Into<Value>) -> OrmResult<Option<T>> {
        let mapping = Self::mapping()?;
        let id = id.into();
        if id.is_null() {
            return Ok(None);
        }
        let backend = self.backend();
        let Some(record) = backend
            .fetch_by_identity(&mut self.transaction, mapping, &id)
            .await?
        else {
            return Ok(None);
        };
        let mut entity = T::from_record(&record)?;
        loader::load_eager_relations(
            &mut entity,
            &record,
            mapping,
            &backend,
            &mut self.transaction,
        )
        .await?;
        Ok(Some(entity))
    }

    /// Fetch every entity in the collection, resolving EAGER relations.
    pub async fn find_all(&mut self) -> OrmResult<Vec<T>> {
        let mapping = Self::mapping()?;
        let backend = self.backend();
        let records = backend.fetch_all(&mut self.transaction, mapping).await?;
        let mut entities = Vec::with_capacity(records.len());
        for record in records {
            let mut entity = T::from_record(&record)?;
            loader::load_eager_relations(
                &mut entity,
                &record,
                mapping,
                &backend,
                &mut self.transaction,
            )
            .await?;
            entities.push(entity);
        }
        Ok(entities)
    }

    /// Equality lookup on one attribute, through the query model.
    pub async fn find_by_attribute(
        &mut self,
        attribute: &str,
        value: impl Into<Value>,
    ) -> OrmResult<Vec<T>> {
        self.query().filter_eq(attribute, value).execute().await
    }

    /// Start a fluent query over this repository's mapped type.
    pub fn query(&mut self) -> Query<'_, T> {
        Query::new(self)
    }

    /// Run backend-native query text and map the results. SQL for the
    /// relational backend, a filter document for the document backend.
    pub async fn execute_query(&mut self, raw: &str) -> OrmResult<Vec<T>> {
        self.query().raw(raw).execute().await
    }

    /// Like [`execute_query`](Self::execute_query), but a failure is
    /// handed to the callback and the call yields an empty result.
    pub async fn execute_query_handled(
        &mut self,
        raw: &str,
        handler: impl FnOnce(&OrmError),
    ) -> OrmResult<Vec<T>> {
        match self.execute_query(raw).await {
            Ok(entities) => Ok(entities),
            Err(error) => {
                handler(&error);
                Ok(Vec::new())
            }
        }
    }

    /// Run a backend-native update statement. Relational only; the
    /// document backend rejects it.
    pub async fn execute_update(&mut self, raw: &str) -> OrmResult<u64> {
        let backend = self.backend();
        backend
            .execute_raw_update(&mut self.transaction, raw, &[])
            .await
    }

    /// Like [`execute_update`](Self::execute_update), but a failure is
    /// handed to the callback and the call completes normally.
    pub async fn execute_update_handled(
        &mut self,
        raw: &str,
        handler: impl FnOnce(&OrmError),
    ) -> OrmResult<u64> {
        match self.execute_update(raw).await {
            Ok(affected) => Ok(affected),
            Err(error) => {
                handler(&error);
                Ok(0)
            }
        }
    }

    /// Explicitly resolve one relation (typically LAZY) on a loaded
    /// entity.
    pub async fn load_relation(&mut self, entity: &mut T, attribute: &str) -> OrmResult<()> {
        let mapping = Self::mapping()?;
        let relation = mapping
            .relations
            .iter()
            .find(|r| r.attribute == attribute)
            .ok_or_else(|| {
                OrmError::Mapping(format!(
                    "'{}' is not a relation on '{}'",
                    attribute, mapping.collection
                ))
            })?;
        let backend = self.backend();
        let record = entity.to_record();
        let related =
            loader::resolve_relation(&record, relation, mapping, &backend, &mut self.transaction)
                .await?;
        entity.apply_relation(attribute, related)
    }

    /// Begin an explicit transaction scoping all subsequent calls on
    /// this repository. Non-reentrant: beginning twice without an
    /// intervening commit or rollback is an error.
    pub async fn begin_transaction(&mut self) -> OrmResult<()> {
        if self.transaction.is_some() {
            return Err(OrmError::Transaction("transaction already active".into()));
        }
        let transaction = self.backend.begin().await?;
        self.transaction = Some(transaction);
        tracing::debug!("transaction started");
        Ok(())
    }

    pub async fn commit_transaction(&mut self) -> OrmResult<()> {
        let transaction = self
            .transaction
            .take()
            .ok_or_else(|| OrmError::Transaction("no active transaction to commit".into()))?;
        self.backend.commit(transaction).await?;
        tracing::debug!("transaction committed");
        Ok(())
    }

    pub async fn rollback_transaction(&mut self) -> OrmResult<()> {
        let transaction = self
            .transaction
            .take()
            .ok_or_else(|| OrmError::Transaction("no active transaction to rollback".into()))?;
        self.backend.rollback(transaction).await?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }
}
