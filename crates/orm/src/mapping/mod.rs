//! Mapping metadata
//!
//! A mapped type declares a `MappingDescriptor`; extraction validates
//! it into an immutable `EntityMapping` that every other component
//! consumes. Extraction happens once per type and the result is cached
//! for the process lifetime (see [`registry`]).

pub mod registry;

use std::collections::{BTreeMap, HashSet};

use crate::error::{OrmError, OrmResult};
use crate::relation::{RelationDescriptor, RelationKind};
use crate::sanitize;
use crate::value::{Value, ValueKind};

/// One plain column on a mapped type.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// Attribute name on the mapped type
    pub attribute: String,
    /// Storage column / document field name
    pub column: String,
    pub kind: ValueKind,
    pub nullable: bool,
    pub max_length: Option<usize>,
    pub default: Option<Value>,
}

/// Validated, immutable metadata for one mapped type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMapping {
    /// Table or collection name
    pub collection: String,
    /// The attribute designated as primary key; always present
    pub identity: ColumnDescriptor,
    /// All plain columns in declaration order, identity first
    pub columns: Vec<ColumnDescriptor>,
    /// Attribute name to storage column, including synthetic
    /// foreign-key columns for owning to-one relations
    pub attribute_columns: BTreeMap<String, String>,
    /// Declared relations, in declaration order
    pub relations: Vec<RelationDescriptor>,
}

impl EntityMapping {
    /// Storage column for an attribute, if the attribute is mapped.
    pub fn column_for_attribute(&self, attribute: &str) -> Option<&str> {
        self.attribute_columns.get(attribute).map(String::as_str)
    }

    /// Column name of the identity attribute.
    pub fn identity_column(&self) -> &str {
        &self.identity.column
    }

    /// Descriptor of a plain column by storage name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.column == name)
    }

    /// Coerce a fetched record's fields to their declared kinds
    /// (INTEGER-stored booleans back to booleans, widened numerics
    /// back to their declared width). Undeclared fields pass through.
    pub fn coerce_record(&self, mut record: crate::entity::Record) -> crate::entity::Record {
        for column in &self.columns {
            if let Some(value) = record.remove(&column.column) {
                record.set(&column.column, value.coerce_to(column.kind));
            }
        }
        record
    }
}

/// Declarative column specification used inside a [`MappingDescriptor`].
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    attribute: String,
    column: Option<String>,
    kind: ValueKind,
    nullable: bool,
    max_length: Option<usize>,
    default: Option<Value>,
}

impl ColumnSpec {
    pub fn new(attribute: &str, kind: ValueKind) -> Self {
        Self {
            attribute: attribute.to_string(),
            column: None,
            kind,
            nullable: true,
            max_length: None,
            default: None,
        }
    }

    /// Override the storage column name; defaults to the attribute name.
    pub fn column(mut self, name: &str) -> Self {
        self.column = Some(name.to_string());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn max_length(mut self, length: usize) -> Self {
        self.max_length = Some(length);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn into_descriptor(self) -> ColumnDescriptor {
        let column = self.column.unwrap_or_else(|| self.attribute.clone());
        ColumnDescriptor {
            attribute: self.attribute,
            column,
            kind: self.kind,
            nullable: self.nullable,
            max_length: self.max_length,
            default: self.default,
        }
    }
}

/// Declarative mapping for one type, produced by [`crate::Entity::descriptor`].
///
/// Pure data; all validation happens in [`MappingDescriptor::extract`],
/// which the registry calls on first access.
#[derive(Debug, Clone)]
pub struct MappingDescriptor {
    collection: String,
    identity: Vec<ColumnSpec>,
    columns: Vec<ColumnSpec>,
    relations: Vec<RelationDescriptor>,
}

impl MappingDescriptor {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            identity: Vec::new(),
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Declare the identity attribute. Exactly one is required.
    pub fn identity(mut self, column: ColumnSpec) -> Self {
        self.identity.push(column);
        self
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn relation(mut self, relation: RelationDescriptor) -> Self {
        self.relations.push(relation);
        self
    }

    /// Validate into an immutable mapping.
    pub fn extract(self) -> OrmResult<EntityMapping> {
        if !sanitize::is_valid_identifier(&self.collection) {
            return Err(OrmError::Mapping(format!(
                "'{}' is not a valid collection name",
                self.collection
            )));
        }

        let mut identities = self.identity;
        let identity = match identities.len() {
            0 => {
                return Err(OrmError::Mapping(format!(
                    "mapping for '{}' declares no identity attribute",
                    self.collection
                )))
            }
            1 => {
                let mut spec = identities.remove(0);
                spec.nullable = false;
                spec.into_descriptor()
            }
            _ => {
                return Err(OrmError::Mapping(format!(
                    "mapping for '{}' declares more than one identity attribute",
                    self.collection
                )))
            }
        };

        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(identity.clone());
        for spec in self.columns {
            columns.push(spec.into_descriptor());
        }

        let mut seen = HashSet::new();
        for descriptor in &columns {
            if !seen.insert(descriptor.column.clone()) {
                return Err(OrmError::Mapping(format!(
                    "column '{}' on '{}' is claimed by more than one attribute",
                    descriptor.column, self.collection
                )));
            }
        }

        let mut relations = self.relations;
        for relation in &mut relations {
            if relation.attribute == identity.attribute {
                return Err(OrmError::Mapping(format!(
                    "identity attribute '{}' on '{}' cannot also be a relation",
                    identity.attribute, self.collection
                )));
            }
            if relation.is_owning()
                && relation.is_inverse()
                && relation.kind != RelationKind::ManyToMany
            {
                return Err(OrmError::Mapping(format!(
                    "relation '{}' on '{}' declares both a join column and mapped_by",
                    relation.attribute, self.collection
                )));
            }
            // The parent's lifecycle is never owned by the child side.
            if relation.kind == RelationKind::ManyToOne {
                relation.cascade = false;
            }
        }

        let mut attribute_columns: BTreeMap<String, String> = columns
            .iter()
            .map(|c| (c.attribute.clone(), c.column.clone()))
            .collect();

        // Owning to-one sides get a synthetic foreign-key column so the
        // relation attribute is addressable in query predicates and the
        // foreign key participates in writes.
        for relation in &relations {
            let owning_to_one = relation.kind == RelationKind::ManyToOne
                || (relation.kind == RelationKind::OneToOne && relation.is_owning());
            if owning_to_one {
                attribute_columns
                    .insert(relation.attribute.clone(), relation.owning_fk_column());
            }
        }

        Ok(EntityMapping {
            collection: self.collection,
            identity,
            columns,
            attribute_columns,
            relations,
        })
    }
}
