//! # tandem-orm
//!
//! A data-mapping engine that persists and queries plain Rust structs
//! against interchangeable storage backends (embedded SQLite via sqlx,
//! or an in-process document store) without rewriting query logic per
//! backend.
//!
//! Mapped types declare their metadata once through a builder
//! descriptor; extraction validates and caches it per type for the
//! process lifetime. One fluent query model compiles to parameterized
//! SQL or a filter document, a relation loader resolves eager
//! associations after every fetch, and a cascade engine propagates
//! saves and deletes through the declared relation graph.

pub mod backend;
pub mod entity;
pub mod error;
pub mod mapping;
pub mod query;
pub mod relation;
pub mod repository;
pub mod sanitize;
pub mod validation;
pub mod value;

pub use backend::{Backend, DocumentBackend, RelationalBackend};
pub use entity::{Entity, Record};
pub use error::{OrmError, OrmResult};
pub use mapping::{registry::mapping_of, ColumnSpec, EntityMapping, MappingDescriptor};
pub use query::{Operator, Query, DEFAULT_QUERY_LIMIT};
pub use relation::{FetchPolicy, RelationDescriptor, RelationKind};
pub use repository::Repository;
pub use value::{Value, ValueKind};
