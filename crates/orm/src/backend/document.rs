//! Embedded document store
//!
//! Collections of records filtered by Mongo-style filter documents.
//! Writes go through single-document operations (insert, replace,
//! delete); sessions give snapshot transactions: begin copies the
//! working set, commit publishes it, rollback drops it.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};

use serde_json::Value as JsonValue;

use crate::entity::Record;
use crate::error::{OrmError, OrmResult};
use crate::mapping::EntityMapping;
use crate::query::{filter, QueryState};
use crate::value::{Value, ValueKind};

/// In-process document engine shared by every repository bound to it.
#[derive(Debug, Default)]
pub struct DocumentBackend {
    store: RwLock<HashMap<String, Vec<Record>>>,
}

/// A snapshot transaction over the document store.
///
/// All operations inside the session see and mutate the snapshot;
/// nothing is visible outside until commit replaces the shared state.
#[derive(Debug)]
pub struct DocumentSession {
    working: HashMap<String, Vec<Record>>,
}

impl DocumentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_store(&self) -> OrmResult<RwLockWriteGuard<'_, HashMap<String, Vec<Record>>>> {
        self.store
            .write()
            .map_err(|_| OrmError::Connection("document store lock poisoned".into()))
    }

    fn read_collection(
        &self,
        session: Option<&DocumentSession>,
        name: &str,
    ) -> OrmResult<Vec<Record>> {
        match session {
            Some(session) => Ok(session.working.get(name).cloned().unwrap_or_default()),
            None => {
                let guard = self
                    .store
                    .read()
                    .map_err(|_| OrmError::Connection("document store lock poisoned".into()))?;
                Ok(guard.get(name).cloned().unwrap_or_default())
            }
        }
    }

    fn with_collection_mut<R>(
        &self,
        session: Option<&mut DocumentSession>,
        name: &str,
        f: impl FnOnce(&mut Vec<Record>) -> R,
    ) -> OrmResult<R> {
        match session {
            Some(session) => Ok(f(session.working.entry(name.to_string()).or_default())),
            None => {
                let mut guard = self.write_store()?;
                Ok(f(guard.entry(name.to_string()).or_default()))
            }
        }
    }

    pub fn begin_session(&self) -> OrmResult<DocumentSession> {
        let guard = self
            .store
            .read()
            .map_err(|_| OrmError::Connection("document store lock poisoned".into()))?;
        Ok(DocumentSession {
            working: guard.clone(),
        })
    }

    pub fn commit_session(&self, session: DocumentSession) -> OrmResult<()> {
        let mut guard = self.write_store()?;
        *guard = session.working;
        Ok(())
    }

    /// Insert one document; null fields are not persisted. Returns the
    /// identity, generating one when the record carries none: the next
    /// integer for Int identities, a fresh UUID for Text identities.
    pub fn insert(
        &self,
        session: Option<&mut DocumentSession>,
        mapping: &EntityMapping,
        record: &mut Record,
    ) -> OrmResult<Value> {
        let identity_column = mapping.identity_column().to_string();
        let supplied = record.value_or_null(&identity_column);

        self.with_collection_mut(session, &mapping.collection, |documents| {
            let id = if supplied.is_null() {
                match mapping.identity.kind {
                    ValueKind::Int => {
                        let max = documents
                            .iter()
                            .filter_map(|d| d.value_or_null(&identity_column).as_i64())
                            .max()
                            .unwrap_or(0);
                        Value::Int(max + 1)
                    }
                    ValueKind::Text => Value::Text(uuid::Uuid::new_v4().to_string()),
                    _ => Value::Null,
                }
            } else {
                supplied
            };
            record.set(&identity_column, id.clone());
            documents.push(record.without_nulls());
            id
        })
    }

    /// Replace the document with the record's identity, if present.
    pub fn update(
        &self,
        session: Option<&mut DocumentSession>,
        mapping: &EntityMapping,
        record: &Record,
    ) -> OrmResult<u64> {
        let identity_column = mapping.identity_column();
        let id = record.value_or_null(identity_column);
        if id.is_null() {
            return Err(OrmError::query_in(
                "update",
                &mapping.collection,
                "record has no identity value",
            ));
        }
        let replacement = record.without_nulls();
        let column = identity_column.to_string();
        self.with_collection_mut(session, &mapping.collection, |documents| {
            match documents
                .iter_mut()
                .find(|d| d.value_or_null(&column) == id)
            {
                Some(slot) => {
                    *slot = replacement;
                    1
                }
                None => 0,
            }
        })
    }

    pub fn delete_by_identity(
        &self,
        session: Option<&mut DocumentSession>,
        mapping: &EntityMapping,
        id: &Value,
    ) -> OrmResult<u64> {
        let column = mapping.identity_column().to_string();
        self.with_collection_mut(session, &mapping.collection, |documents| {
            match documents.iter().position(|d| d.value_or_null(&column) == *id) {
                Some(position) => {
                    documents.remove(position);
                    1
                }
                None => 0,
            }
        })
    }

    pub fn exists(
        &self,
        session: Option<&DocumentSession>,
        mapping: &EntityMapping,
        id: &Value,
    ) -> OrmResult<bool> {
        let documents = self.read_collection(session, &mapping.collection)?;
        let column = mapping.identity_column();
        Ok(documents.iter().any(|d| d.value_or_null(column) == *id))
    }

    pub fn fetch_by_identity(
        &self,
        session: Option<&DocumentSession>,
        mapping: &EntityMapping,
        id: &Value,
    ) -> OrmResult<Option<Record>> {
        let documents = self.read_collection(session, &mapping.collection)?;
        let column = mapping.identity_column();
        Ok(documents
            .iter()
            .find(|d| d.value_or_null(column) == *id)
            .cloned()
            .map(|r| mapping.coerce_record(r)))
    }

    pub fn fetch_all(
        &self,
        session: Option<&DocumentSession>,
        mapping: &EntityMapping,
    ) -> OrmResult<Vec<Record>> {
        let documents = self.read_collection(session, &mapping.collection)?;
        Ok(documents
            .into_iter()
            .map(|r| mapping.coerce_record(r))
            .collect())
    }

    pub fn fetch_one_by_column(
        &self,
        session: Option<&DocumentSession>,
        mapping: &EntityMapping,
        column: &str,
        value: &Value,
    ) -> OrmResult<Option<Record>> {
        let documents = self.read_collection(session, &mapping.collection)?;
        Ok(documents
            .iter()
            .find(|d| d.value_or_null(column) == *value)
            .cloned()
            .map(|r| mapping.coerce_record(r)))
    }

    pub fn fetch_all_by_column(
        &self,
        session: Option<&DocumentSession>,
        mapping: &EntityMapping,
        column: &str,
        value: &Value,
    ) -> OrmResult<Vec<Record>> {
        let documents = self.read_collection(session, &mapping.collection)?;
        Ok(documents
            .into_iter()
            .filter(|d| d.value_or_null(column) == *value)
            .map(|r| mapping.coerce_record(r))
            .collect())
    }

    /// Resolve a many-to-many association: join documents for the
    /// owner, then the targets those rows point at, in join-row order.
    pub fn fetch_via_join(
        &self,
        session: Option<&DocumentSession>,
        target: &EntityMapping,
        join_table: &str,
        join_column: &str,
        inverse_join_column: &str,
        owner_id: &Value,
    ) -> OrmResult<Vec<Record>> {
        let join_rows = self.read_collection(session, join_table)?;
        let related_ids: Vec<Value> = join_rows
            .iter()
            .filter(|row| row.value_or_null(join_column) == *owner_id)
            .map(|row| row.value_or_null(inverse_join_column))
            .filter(|id| !id.is_null())
            .collect();

        let targets = self.read_collection(session, &target.collection)?;
        let identity_column = target.identity_column();
        let mut related = Vec::with_capacity(related_ids.len());
        for id in related_ids {
            if let Some(record) = targets.iter().find(|d| d.value_or_null(identity_column) == id)
            {
                related.push(target.coerce_record(record.clone()));
            }
        }
        Ok(related)
    }

    pub fn delete_join_rows(
        &self,
        session: Option<&mut DocumentSession>,
        join_table: &str,
        join_column: &str,
        owner_id: &Value,
    ) -> OrmResult<u64> {
        let column = join_column.to_string();
        let owner = owner_id.clone();
        self.with_collection_mut(session, join_table, |documents| {
            let before = documents.len();
            documents.retain(|d| d.value_or_null(&column) != owner);
            (before - documents.len()) as u64
        })
    }

    pub fn insert_join_row(
        &self,
        session: Option<&mut DocumentSession>,
        join_table: &str,
        join_column: &str,
        inverse_join_column: &str,
        owner_id: &Value,
        related_id: &Value,
    ) -> OrmResult<()> {
        let row = Record::new()
            .with(join_column, owner_id.clone())
            .with(inverse_join_column, related_id.clone());
        self.with_collection_mut(session, join_table, |documents| documents.push(row))
    }

    /// Run a query: a supplied filter document, raw filter text, or the
    /// compiled predicate chain, then ordering, offset and limit.
    pub fn select(
        &self,
        session: Option<&DocumentSession>,
        mapping: &EntityMapping,
        state: &QueryState,
    ) -> OrmResult<Vec<Record>> {
        let filter_doc = self.resolve_filter(mapping, state)?;
        let documents = self.read_collection(session, &mapping.collection)?;

        let mut matches = Vec::new();
        for document in documents {
            if filter::matches(&filter_doc, &document)? {
                matches.push(document);
            }
        }

        if !state.order_by.is_empty() {
            matches.sort_by(|a, b| {
                for order in &state.order_by {
                    let column = mapping
                        .column_for_attribute(&order.attribute)
                        .unwrap_or(&order.attribute);
                    let ordering = a.value_or_null(column).sort_cmp(&b.value_or_null(column));
                    let ordering = if order.ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    };
                    if ordering != std::cmp::Ordering::Equal {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let skip = state.offset.unwrap_or(0).max(0) as usize;
        let take = state
            .effective_limit()
            .map(|l| l.max(0) as usize)
            .unwrap_or(usize::MAX);
        Ok(matches
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|r| mapping.coerce_record(r))
            .collect())
    }

    /// Count matching documents; pagination does not apply.
    pub fn count(
        &self,
        session: Option<&DocumentSession>,
        mapping: &EntityMapping,
        state: &QueryState,
    ) -> OrmResult<i64> {
        let filter_doc = self.resolve_filter(mapping, state)?;
        let documents = self.read_collection(session, &mapping.collection)?;
        let mut count = 0;
        for document in &documents {
            if filter::matches(&filter_doc, document)? {
                count += 1;
            }
        }
        Ok(count)
    }

    fn resolve_filter(&self, mapping: &EntityMapping, state: &QueryState) -> OrmResult<JsonValue> {
        if let Some(document) = &state.document_filter {
            return Ok(document.clone());
        }
        if let Some(raw) = &state.raw {
            return serde_json::from_str(raw).map_err(|e| {
                OrmError::query_in("raw query", &mapping.collection, format!("invalid filter document: {e}"))
            });
        }
        Ok(filter::compile_filter(mapping, &state.predicates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{ColumnSpec, MappingDescriptor};

    fn mapping() -> EntityMapping {
        MappingDescriptor::new("notes")
            .identity(ColumnSpec::new("id", ValueKind::Int))
            .column(ColumnSpec::new("body", ValueKind::Text))
            .column(ColumnSpec::new("pinned", ValueKind::Bool))
            .extract()
            .unwrap()
    }

    #[test]
    fn insert_generates_sequential_integer_identities() {
        let backend = DocumentBackend::new();
        let mapping = mapping();
        let mut first = Record::new().with("body", "a");
        let mut second = Record::new().with("body", "b");
        assert_eq!(
            backend.insert(None, &mapping, &mut first).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            backend.insert(None, &mapping, &mut second).unwrap(),
            Value::Int(2)
        );
    }

    #[test]
    fn null_fields_are_not_persisted() {
        let backend = DocumentBackend::new();
        let mapping = mapping();
        let mut record = Record::new().with("body", Value::Null).with("pinned", true);
        backend.insert(None, &mapping, &mut record).unwrap();
        let stored = backend
            .fetch_by_identity(None, &mapping, &Value::Int(1))
            .unwrap()
            .unwrap();
        assert!(!stored.contains("body"));
        assert_eq!(stored.value_or_null("pinned"), Value::Bool(true));
    }

    #[test]
    fn session_changes_invisible_until_commit() {
        let backend = DocumentBackend::new();
        let mapping = mapping();
        let mut session = backend.begin_session().unwrap();
        let mut record = Record::new().with("body", "draft");
        backend
            .insert(Some(&mut session), &mapping, &mut record)
            .unwrap();

        assert!(backend.fetch_all(None, &mapping).unwrap().is_empty());
        backend.commit_session(session).unwrap();
        assert_eq!(backend.fetch_all(None, &mapping).unwrap().len(), 1);
    }

    #[test]
    fn dropped_session_discards_changes() {
        let backend = DocumentBackend::new();
        let mapping = mapping();
        {
            let mut session = backend.begin_session().unwrap();
            let mut record = Record::new().with("body", "gone");
            backend
                .insert(Some(&mut session), &mapping, &mut record)
                .unwrap();
        }
        assert!(backend.fetch_all(None, &mapping).unwrap().is_empty());
    }

    #[test]
    fn update_replaces_whole_document() {
        let backend = DocumentBackend::new();
        let mapping = mapping();
        let mut record = Record::new().with("body", "old").with("pinned", true);
        backend.insert(None, &mapping, &mut record).unwrap();

        let replacement = Record::new().with("id", 1i64).with("body", "new");
        assert_eq!(backend.update(None, &mapping, &replacement).unwrap(), 1);
        let stored = backend
            .fetch_by_identity(None, &mapping, &Value::Int(1))
            .unwrap()
            .unwrap();
        assert_eq!(stored.value_or_null("body"), Value::Text("new".into()));
        assert!(!stored.contains("pinned"));
    }
}
