//! Mapped types and storage records
//!
//! `Entity` is the contract a persistable type implements: a
//! declarative mapping descriptor plus a codec between the type and a
//! column-keyed `Record`. The relation accessors are the statically
//! written equivalent of reflective field access: each implementor
//! matches on its own relation attribute names and encodes/decodes
//! with the related type's codec.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::OrmResult;
use crate::mapping::MappingDescriptor;
use crate::value::Value;

/// A storage-level row or document: column name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, for codecs and fixtures.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(column.to_string(), value.into());
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.fields.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// Missing columns read as null, like an absent document field.
    pub fn value_or_null(&self, column: &str) -> Value {
        self.fields.get(column).cloned().unwrap_or(Value::Null)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.fields.remove(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Drop null fields; the document store does not persist them.
    pub fn without_nulls(&self) -> Record {
        Record {
            fields: self
                .fields
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Record {
            fields: iter.into_iter().collect(),
        }
    }
}

/// A type persistable through the engine.
///
/// The descriptor is pure data; it is validated and cached once per
/// process by the mapping registry. `to_record`/`from_record` speak
/// storage column names, not attribute names.
pub trait Entity: Sized + Send + Sync + 'static {
    /// Declarative mapping for this type. Called once on first access;
    /// the validated result is cached for the process lifetime.
    fn descriptor() -> MappingDescriptor;

    /// Encode the plain-column state of this instance.
    fn to_record(&self) -> Record;

    /// Decode an instance from a storage record. Missing columns decode
    /// to their unset defaults.
    fn from_record(record: &Record) -> OrmResult<Self>;

    /// Current identity value; `Value::Null` when unset.
    fn identity_value(&self) -> Value;

    /// Write back a (possibly generated) identity value.
    fn set_identity_value(&mut self, value: Value);

    /// Encode the entities held under a relation attribute.
    ///
    /// Returns `Ok(None)` when the attribute is unset; a to-one
    /// relation yields at most one record. Unknown attributes are a
    /// mapping error.
    fn relation_records(&self, attribute: &str) -> OrmResult<Option<Vec<Record>>>;

    /// Replace the entities held under a relation attribute with ones
    /// decoded from `records`. A to-one relation takes the first record.
    fn apply_relation(&mut self, attribute: &str, records: Vec<Record>) -> OrmResult<()>;
}
