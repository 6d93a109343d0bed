//! Query model
//!
//! A fluent condition/ordering/pagination builder over one condition
//! AST. The same predicate list compiles into parameterized SQL for
//! the relational backend ([`sql`]) or a filter document for the
//! document backend ([`filter`]). Composition is a linear AND/OR chain
//! evaluated left to right with no precedence grouping.

pub mod filter;
pub mod sql;

use std::collections::HashSet;
use std::fmt;

use serde_json::Value as JsonValue;

use crate::entity::{Entity, Record};
use crate::error::OrmResult;
use crate::mapping::EntityMapping;
use crate::relation::loader;
use crate::repository::Repository;
use crate::value::Value;

/// Results are capped at this many rows unless the caller sets an
/// explicit limit or asks for unlimited results.
pub const DEFAULT_QUERY_LIMIT: i64 = 1000;

/// Comparison operator of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Like,
    In,
    IsNull,
    IsNotNull,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Equals => write!(f, "="),
            Operator::NotEquals => write!(f, "!="),
            Operator::GreaterThan => write!(f, ">"),
            Operator::LessThan => write!(f, "<"),
            Operator::GreaterOrEqual => write!(f, ">="),
            Operator::LessOrEqual => write!(f, "<="),
            Operator::Like => write!(f, "LIKE"),
            Operator::In => write!(f, "IN"),
            Operator::IsNull => write!(f, "IS NULL"),
            Operator::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// How a predicate chains onto the one before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

/// One condition in the chain
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub connector: Connector,
    pub attribute: String,
    pub operator: Operator,
    pub value: Value,
}

/// One ordering term
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub attribute: String,
    pub ascending: bool,
}

/// Accumulated query state, independent of the target backend.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<OrderBy>,
    pub group_by: Vec<String>,
    pub distinct: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub unlimited: bool,
    /// Backend-native query text, passed through uninterpreted
    pub raw: Option<String>,
    /// Named parameters for raw relational text (`:name` placeholders)
    pub parameters: Vec<(String, Value)>,
    /// Pre-built filter document for the document backend
    pub document_filter: Option<JsonValue>,
}

impl QueryState {
    /// The limit actually applied: explicit limit, or the default page
    /// size unless unlimited results were requested.
    pub fn effective_limit(&self) -> Option<i64> {
        match self.limit {
            Some(limit) => Some(limit),
            None if self.unlimited => None,
            None => Some(DEFAULT_QUERY_LIMIT),
        }
    }
}

/// Fluent query over one mapped type, executed through its repository.
pub struct Query<'r, T: Entity> {
    repository: &'r mut Repository<T>,
    state: QueryState,
}

impl<'r, T: Entity> Query<'r, T> {
    pub(crate) fn new(repository: &'r mut Repository<T>) -> Self {
        Self {
            repository,
            state: QueryState::default(),
        }
    }

    fn push(mut self, connector: Connector, attribute: &str, operator: Operator, value: Value) -> Self {
        // The first predicate has nothing to chain onto.
        let connector = if self.state.predicates.is_empty() {
            Connector::And
        } else {
            connector
        };
        self.state.predicates.push(Predicate {
            connector,
            attribute: attribute.to_string(),
            operator,
            value,
        });
        self
    }

    /// Add a predicate, AND-chained onto any existing ones.
    pub fn filter(self, attribute: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.push(Connector::And, attribute, operator, value.into())
    }

    /// Equality shorthand.
    pub fn filter_eq(self, attribute: &str, value: impl Into<Value>) -> Self {
        self.filter(attribute, Operator::Equals, value)
    }

    pub fn and(self, attribute: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.push(Connector::And, attribute, operator, value.into())
    }

    pub fn or(self, attribute: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.push(Connector::Or, attribute, operator, value.into())
    }

    pub fn order_by(mut self, attribute: &str) -> Self {
        self.state.order_by.push(OrderBy {
            attribute: attribute.to_string(),
            ascending: true,
        });
        self
    }

    pub fn order_by_desc(mut self, attribute: &str) -> Self {
        self.state.order_by.push(OrderBy {
            attribute: attribute.to_string(),
            ascending: false,
        });
        self
    }

    pub fn group_by(mut self, attribute: &str) -> Self {
        self.state.group_by.push(attribute.to_string());
        self
    }

    pub fn distinct(mut self) -> Self {
        self.state.distinct = true;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.state.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.state.offset = Some(offset);
        self
    }

    /// Lift the default page size; the backend returns every match.
    pub fn unlimited(mut self) -> Self {
        self.state.unlimited = true;
        self
    }

    /// Backend-native query text: SQL for the relational target, a
    /// filter document for the document target. Passed through without
    /// validation; execution failures surface as query errors.
    pub fn raw(mut self, text: &str) -> Self {
        self.state.raw = Some(text.to_string());
        self
    }

    /// Bind a named parameter for `:name` placeholders in raw SQL.
    pub fn parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.state.parameters.push((name.to_string(), value.into()));
        self
    }

    /// Supply a pre-built filter document for the document target.
    pub fn filter_document(mut self, document: JsonValue) -> Self {
        self.state.document_filter = Some(document);
        self
    }

    /// Execute and map the matching rows/documents.
    pub async fn execute(self) -> OrmResult<Vec<T>> {
        let mapping = Repository::<T>::mapping()?;
        let backend = self.repository.backend();
        let records = backend
            .select(&mut self.repository.transaction, mapping, &self.state)
            .await?;
        let records = dedupe_by_identity(mapping, records);

        let mut entities = Vec::with_capacity(records.len());
        for record in records {
            let mut entity = T::from_record(&record)?;
            loader::load_eager_relations(
                &mut entity,
                &record,
                mapping,
                &backend,
                &mut self.repository.transaction,
            )
            .await?;
            entities.push(entity);
        }
        Ok(entities)
    }

    /// Count matching rows/documents. Pagination is ignored.
    pub async fn count(self) -> OrmResult<i64> {
        let mapping = Repository::<T>::mapping()?;
        let backend = self.repository.backend();
        backend
            .count(&mut self.repository.transaction, mapping, &self.state)
            .await
    }
}

/// Drop duplicate rows produced by join fan-out: records sharing a
/// non-null identity keep only their first occurrence; records without
/// an identity value are kept as-is.
pub(crate) fn dedupe_by_identity(mapping: &EntityMapping, records: Vec<Record>) -> Vec<Record> {
    let identity_column = mapping.identity_column();
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique = Vec::with_capacity(records.len());
    for record in records {
        match record.get(identity_column) {
            Some(id) if !id.is_null() => {
                let key = format!("{:?}", id);
                if seen.insert(key) {
                    unique.push(record);
                }
            }
            _ => unique.push(record),
        }
    }
    unique
}
