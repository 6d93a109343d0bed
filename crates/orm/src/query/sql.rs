//! SQL compilation for the relational backend
//!
//! Predicates, orderings and pagination compile into one SELECT (or
//! COUNT) statement with positional bind parameters. Identifiers are
//! sanitized before interpolation; values always travel as binds,
//! except the two SQLite-specific literal inlinings below.

use crate::error::{OrmError, OrmResult};
use crate::mapping::EntityMapping;
use crate::query::{Operator, Predicate, QueryState};
use crate::sanitize;
use crate::value::Value;

/// A compiled statement and its bind values, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub binds: Vec<Value>,
}

/// Compile a SELECT over the mapped collection.
pub fn compile_select(mapping: &EntityMapping, state: &QueryState) -> OrmResult<SqlStatement> {
    let table = sanitize::identifier(&mapping.collection)?;
    let mut sql = String::from("SELECT ");
    if state.distinct {
        sql.push_str("DISTINCT ");
    }
    sql.push('*');
    sql.push_str(" FROM ");
    sql.push_str(table);

    let mut binds = Vec::new();
    push_where(mapping, &state.predicates, &mut sql, &mut binds)?;

    if !state.group_by.is_empty() {
        let mut columns = Vec::with_capacity(state.group_by.len());
        for attribute in &state.group_by {
            columns.push(resolve_column(mapping, attribute)?);
        }
        sql.push_str(" GROUP BY ");
        sql.push_str(&columns.join(", "));
    }

    if !state.order_by.is_empty() {
        let mut terms = Vec::with_capacity(state.order_by.len());
        for order in &state.order_by {
            let column = resolve_column(mapping, &order.attribute)?;
            let direction = if order.ascending { "ASC" } else { "DESC" };
            terms.push(format!("{} {}", column, direction));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }

    if let Some(limit) = state.effective_limit() {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = state.offset {
        sql.push_str(&format!(" OFFSET {}", offset));
    }

    Ok(SqlStatement { sql, binds })
}

/// Compile a COUNT over the same predicate chain. Ordering and
/// pagination do not apply to counts.
pub fn compile_count(mapping: &EntityMapping, state: &QueryState) -> OrmResult<SqlStatement> {
    let table = sanitize::identifier(&mapping.collection)?;
    let mut sql = format!("SELECT COUNT(*) FROM {}", table);
    let mut binds = Vec::new();
    push_where(mapping, &state.predicates, &mut sql, &mut binds)?;
    Ok(SqlStatement { sql, binds })
}

fn push_where(
    mapping: &EntityMapping,
    predicates: &[Predicate],
    sql: &mut String,
    binds: &mut Vec<Value>,
) -> OrmResult<()> {
    if predicates.is_empty() {
        return Ok(());
    }
    sql.push_str(" WHERE ");

    for (index, predicate) in predicates.iter().enumerate() {
        if index > 0 {
            sql.push_str(match predicate.connector {
                crate::query::Connector::And => " AND ",
                crate::query::Connector::Or => " OR ",
            });
        }

        let column = resolve_column(mapping, &predicate.attribute)?;
        sql.push_str(&column);

        match predicate.operator {
            Operator::Equals => push_equality(sql, binds, &predicate.value, false),
            Operator::NotEquals => push_equality(sql, binds, &predicate.value, true),
            Operator::GreaterThan => {
                sql.push_str(" > ?");
                binds.push(predicate.value.clone());
            }
            Operator::LessThan => {
                sql.push_str(" < ?");
                binds.push(predicate.value.clone());
            }
            Operator::GreaterOrEqual => {
                sql.push_str(" >= ?");
                binds.push(predicate.value.clone());
            }
            Operator::LessOrEqual => {
                sql.push_str(" <= ?");
                binds.push(predicate.value.clone());
            }
            Operator::Like => {
                sql.push_str(" LIKE ?");
                binds.push(Value::Text(wrap_like_pattern(&predicate.value)));
            }
            Operator::In => {
                let values = match &predicate.value {
                    Value::List(values) => values,
                    other => {
                        return Err(OrmError::Query(format!(
                            "IN predicate on '{}' requires a list of values, got {:?}",
                            predicate.attribute, other
                        )))
                    }
                };
                if values.is_empty() {
                    // An empty IN matches nothing, never everything.
                    sql.push_str(" IN (NULL)");
                } else {
                    let placeholders = vec!["?"; values.len()].join(", ");
                    sql.push_str(&format!(" IN ({})", placeholders));
                    binds.extend(values.iter().cloned());
                }
            }
            Operator::IsNull => sql.push_str(" IS NULL"),
            Operator::IsNotNull => sql.push_str(" IS NOT NULL"),
        }
    }
    Ok(())
}

/// EQUALS/NOT_EQUALS carry two SQLite-specific shapes: a null operand
/// becomes `IS [NOT] NULL`, and a boolean operand is inlined as the
/// INTEGER literal the engine stores (`= 1` / `= 0`) with no bind.
fn push_equality(sql: &mut String, binds: &mut Vec<Value>, value: &Value, negated: bool) {
    match value {
        Value::Null => {
            sql.push_str(if negated { " IS NOT NULL" } else { " IS NULL" });
        }
        Value::Bool(b) => {
            let literal = if *b { "1" } else { "0" };
            let op = if negated { "!=" } else { "=" };
            sql.push_str(&format!(" {} {}", op, literal));
        }
        other => {
            sql.push_str(if negated { " != ?" } else { " = ?" });
            binds.push(other.clone());
        }
    }
}

/// LIKE values without any wildcard are wrapped as `%value%`.
fn wrap_like_pattern(value: &Value) -> String {
    let pattern = match value {
        Value::Text(s) => s.clone(),
        other => format!("{:?}", other),
    };
    if pattern.contains('%') {
        pattern
    } else {
        format!("%{}%", pattern)
    }
}

/// Attribute names resolve through the mapping; unmapped names fall
/// through raw so predicates can address columns the mapping does not
/// describe. Either way the identifier is validated.
fn resolve_column(mapping: &EntityMapping, attribute: &str) -> OrmResult<String> {
    let column = mapping.column_for_attribute(attribute).unwrap_or(attribute);
    Ok(sanitize::identifier(column)?.to_string())
}

/// Replace `:name` placeholders in raw SQL with positional binds.
/// Occurrences are matched on word boundaries and bound in the order
/// they appear in the text.
pub fn apply_named_parameters(sql: &str, parameters: &[(String, Value)]) -> (String, Vec<Value>) {
    if parameters.is_empty() {
        return (sql.to_string(), Vec::new());
    }

    let mut occurrences: Vec<(usize, usize, Value)> = Vec::new();
    for (name, value) in parameters {
        let needle = format!(":{}", name);
        let mut search_from = 0;
        while let Some(found) = sql[search_from..].find(&needle) {
            let start = search_from + found;
            let end = start + needle.len();
            let boundary = sql[end..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric() && c != '_');
            if boundary {
                occurrences.push((start, end, value.clone()));
            }
            search_from = end;
        }
    }
    occurrences.sort_by_key(|(start, _, _)| *start);

    let mut rewritten = String::with_capacity(sql.len());
    let mut binds = Vec::with_capacity(occurrences.len());
    let mut cursor = 0;
    for (start, end, value) in occurrences {
        rewritten.push_str(&sql[cursor..start]);
        rewritten.push('?');
        binds.push(value);
        cursor = end;
    }
    rewritten.push_str(&sql[cursor..]);
    (rewritten, binds)
}
