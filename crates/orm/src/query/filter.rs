//! Filter-document compilation and evaluation for the document backend
//!
//! The same predicate chain that compiles to SQL compiles here into a
//! filter document using the document store's operator tokens. The
//! evaluator interprets those documents against records; conditions on
//! distinct fields combine conjunctively.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{json, Map, Value as JsonValue};

use crate::entity::Record;
use crate::error::{OrmError, OrmResult};
use crate::mapping::EntityMapping;
use crate::query::{Operator, Predicate};
use crate::value::Value;

/// Compile a predicate chain into a filter document.
pub fn compile_filter(mapping: &EntityMapping, predicates: &[Predicate]) -> JsonValue {
    let mut filter = Map::new();

    for predicate in predicates {
        let column = mapping
            .column_for_attribute(&predicate.attribute)
            .unwrap_or(&predicate.attribute)
            .to_string();

        match predicate.operator {
            Operator::Equals => {
                filter.insert(column, predicate.value.to_json());
            }
            Operator::NotEquals => {
                filter.insert(column, json!({ "$ne": predicate.value.to_json() }));
            }
            Operator::GreaterThan => {
                filter.insert(column, json!({ "$gt": predicate.value.to_json() }));
            }
            Operator::LessThan => {
                filter.insert(column, json!({ "$lt": predicate.value.to_json() }));
            }
            Operator::GreaterOrEqual => {
                filter.insert(column, json!({ "$gte": predicate.value.to_json() }));
            }
            Operator::LessOrEqual => {
                filter.insert(column, json!({ "$lte": predicate.value.to_json() }));
            }
            Operator::Like => {
                let pattern = match &predicate.value {
                    Value::Text(s) => s.clone(),
                    other => format!("{:?}", other),
                };
                // Patterns without any wildcard are wrapped the same
                // way the SQL target wraps them.
                let pattern = if pattern.contains('%') {
                    pattern
                } else {
                    format!("%{}%", pattern)
                };
                filter.insert(
                    column,
                    json!({ "$regex": like_to_regex(&pattern), "$options": "i" }),
                );
            }
            Operator::In => {
                filter.insert(column, json!({ "$in": predicate.value.to_json() }));
            }
            Operator::IsNull => {
                filter.insert(column, json!({ "$exists": false }));
            }
            Operator::IsNotNull => {
                filter.insert(column, json!({ "$exists": true }));
            }
        }
    }

    JsonValue::Object(filter)
}

/// Translate a LIKE pattern into an anchored regular expression.
///
/// Literal segments are regex-escaped and each `%` becomes `.*`; the
/// result is anchored at whichever ends of the pattern carry no
/// wildcard. Pattern text can never smuggle regex syntax through.
pub fn like_to_regex(pattern: &str) -> String {
    let anchor_start = !pattern.starts_with('%');
    let anchor_end = !pattern.ends_with('%');

    let body = pattern
        .split('%')
        .map(|segment| regex::escape(segment))
        .collect::<Vec<_>>()
        .join(".*");

    let mut translated = String::with_capacity(body.len() + 2);
    if anchor_start {
        translated.push('^');
    }
    translated.push_str(&body);
    if anchor_end {
        translated.push('$');
    }
    translated
}

/// Evaluate a filter document against one record.
pub fn matches(filter: &JsonValue, record: &Record) -> OrmResult<bool> {
    let conditions = match filter {
        JsonValue::Object(map) => map,
        JsonValue::Null => return Ok(true),
        other => {
            return Err(OrmError::Query(format!(
                "filter document must be an object, got {}",
                other
            )))
        }
    };

    for (column, condition) in conditions {
        let field = record.get(column);
        let present = field.map(|v| !v.is_null()).unwrap_or(false);
        let field_json = field.map(Value::to_json).unwrap_or(JsonValue::Null);

        match condition {
            JsonValue::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                for (op, operand) in ops {
                    if !operator_holds(op, operand, ops, &field_json, present)? {
                        return Ok(false);
                    }
                }
            }
            literal => {
                if !json_eq(&field_json, literal) {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

fn operator_holds(
    op: &str,
    operand: &JsonValue,
    all_ops: &Map<String, JsonValue>,
    field: &JsonValue,
    present: bool,
) -> OrmResult<bool> {
    match op {
        "$ne" => Ok(!json_eq(field, operand)),
        "$gt" => Ok(compare_json(field, operand) == Some(Ordering::Greater)),
        "$lt" => Ok(compare_json(field, operand) == Some(Ordering::Less)),
        "$gte" => Ok(matches!(
            compare_json(field, operand),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        "$lte" => Ok(matches!(
            compare_json(field, operand),
            Some(Ordering::Less | Ordering::Equal)
        )),
        "$regex" => {
            let pattern = operand
                .as_str()
                .ok_or_else(|| OrmError::Query("$regex operand must be a string".into()))?;
            let case_insensitive = all_ops
                .get("$options")
                .and_then(JsonValue::as_str)
                .is_some_and(|o| o.contains('i'));
            let full_pattern = if case_insensitive {
                format!("(?i){}", pattern)
            } else {
                pattern.to_string()
            };
            let regex = Regex::new(&full_pattern)
                .map_err(|e| OrmError::Query(format!("invalid $regex '{}': {}", pattern, e)))?;
            Ok(field.as_str().is_some_and(|s| regex.is_match(s)))
        }
        // Consumed together with $regex.
        "$options" => Ok(true),
        "$in" => {
            let candidates = operand
                .as_array()
                .ok_or_else(|| OrmError::Query("$in operand must be an array".into()))?;
            Ok(candidates.iter().any(|candidate| json_eq(field, candidate)))
        }
        "$exists" => {
            let expected = operand
                .as_bool()
                .ok_or_else(|| OrmError::Query("$exists operand must be a boolean".into()))?;
            Ok(present == expected)
        }
        other => Err(OrmError::Query(format!(
            "unsupported filter operator '{}'",
            other
        ))),
    }
}

/// Equality with numeric cross-type comparison (int vs float).
fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_json(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
