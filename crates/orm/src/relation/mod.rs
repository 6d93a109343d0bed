//! Relation descriptors
//!
//! Describes how one mapped type points at another: the kind of
//! association, which side owns the foreign key, join-table layout for
//! many-to-many, and the fetch/cascade policy. The related type is
//! reached through the mapping registry rather than held directly, so
//! mutually related types can describe each other without recursion.

pub mod cascade;
pub mod loader;

use crate::entity::Entity;
use crate::error::OrmResult;
use crate::mapping::EntityMapping;
use crate::mapping::registry;

/// Association kind between two mapped types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationKind {
    /// Whether the relation attribute holds a collection.
    pub fn is_collection(self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

/// Whether a relation is resolved automatically on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    Eager,
    Lazy,
}

/// Deferred lookup of the related type's mapping.
pub type TargetMapping = fn() -> OrmResult<&'static EntityMapping>;

/// One association declared on a mapped type.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDescriptor {
    /// Attribute on the owning type holding the related value(s)
    pub attribute: String,
    pub kind: RelationKind,
    /// Registry hook resolving the related type's mapping on demand
    pub target: TargetMapping,
    /// Foreign-key column on this side (owning to-one), or the
    /// owner-side join column for many-to-many
    pub join_column: Option<String>,
    /// Attribute on the target that points back here (inverse side)
    pub mapped_by: Option<String>,
    /// Join table for many-to-many
    pub join_table: Option<String>,
    /// Target-side join column for many-to-many
    pub inverse_join_column: Option<String>,
    pub fetch: FetchPolicy,
    pub cascade: bool,
}

impl RelationDescriptor {
    fn new<T: Entity>(attribute: &str, kind: RelationKind, fetch: FetchPolicy) -> Self {
        Self {
            attribute: attribute.to_string(),
            kind,
            target: registry::mapping_of::<T>,
            join_column: None,
            mapped_by: None,
            join_table: None,
            inverse_join_column: None,
            fetch,
            cascade: false,
        }
    }

    /// To-one association, eager by default.
    pub fn one_to_one<T: Entity>(attribute: &str) -> Self {
        Self::new::<T>(attribute, RelationKind::OneToOne, FetchPolicy::Eager)
    }

    /// Owner-side collection of children, lazy by default.
    pub fn one_to_many<T: Entity>(attribute: &str) -> Self {
        Self::new::<T>(attribute, RelationKind::OneToMany, FetchPolicy::Lazy)
    }

    /// Child-side reference to a parent, eager by default. Never
    /// cascades: the parent's lifecycle is not owned by the child.
    pub fn many_to_one<T: Entity>(attribute: &str) -> Self {
        Self::new::<T>(attribute, RelationKind::ManyToOne, FetchPolicy::Eager)
    }

    /// Join-table association, lazy by default.
    pub fn many_to_many<T: Entity>(attribute: &str) -> Self {
        Self::new::<T>(attribute, RelationKind::ManyToMany, FetchPolicy::Lazy)
    }

    pub fn join_column(mut self, column: &str) -> Self {
        self.join_column = Some(column.to_string());
        self
    }

    pub fn mapped_by(mut self, attribute: &str) -> Self {
        self.mapped_by = Some(attribute.to_string());
        self
    }

    pub fn join_table(mut self, table: &str) -> Self {
        self.join_table = Some(table.to_string());
        self
    }

    pub fn inverse_join_column(mut self, column: &str) -> Self {
        self.inverse_join_column = Some(column.to_string());
        self
    }

    pub fn eager(mut self) -> Self {
        self.fetch = FetchPolicy::Eager;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.fetch = FetchPolicy::Lazy;
        self
    }

    pub fn cascade(mut self) -> Self {
        self.cascade = true;
        self
    }

    /// The side holding the foreign key.
    pub fn is_owning(&self) -> bool {
        self.join_column.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// The side resolved by looking up the owning side's foreign key.
    pub fn is_inverse(&self) -> bool {
        self.mapped_by.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Foreign-key column on the owning side for to-one relations.
    pub fn owning_fk_column(&self) -> String {
        self.join_column
            .clone()
            .unwrap_or_else(|| format!("{}_id", self.attribute))
    }

    /// Foreign-key column on the target for one-to-many and inverse
    /// one-to-one: resolved through the target's own attribute mapping
    /// when `mapped_by` names a relation there, otherwise the
    /// `<mapped_by>_id` / `<owner collection>_id` convention.
    pub fn fk_column_on_target(
        &self,
        owner: &EntityMapping,
        target: &EntityMapping,
    ) -> String {
        match self.mapped_by.as_deref().filter(|m| !m.is_empty()) {
            Some(mapped_by) => target
                .column_for_attribute(mapped_by)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}_id", mapped_by)),
            None => format!("{}_id", owner.collection),
        }
    }

    /// Join table for many-to-many, defaulting to `<owner>_<target>`.
    pub fn join_table_name(&self, owner: &EntityMapping, target: &EntityMapping) -> String {
        self.join_table
            .clone()
            .unwrap_or_else(|| format!("{}_{}", owner.collection, target.collection))
    }

    /// Owner-side join column, defaulting to `<owner>_id`.
    pub fn join_column_name(&self, owner: &EntityMapping) -> String {
        self.join_column
            .clone()
            .unwrap_or_else(|| format!("{}_id", owner.collection))
    }

    /// Target-side join column, defaulting to `<target>_id`.
    pub fn inverse_join_column_name(&self, target: &EntityMapping) -> String {
        self.inverse_join_column
            .clone()
            .unwrap_or_else(|| format!("{}_id", target.collection))
    }
}
