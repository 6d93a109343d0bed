//! Pre-write validation
//!
//! Declared constraints are checked against the encoded record before
//! any backend I/O, so a constraint violation never reaches storage.

use crate::entity::Record;
use crate::error::{OrmError, OrmResult};
use crate::mapping::EntityMapping;
use crate::value::Value;

/// Check a record against its mapping's declared constraints.
///
/// The identity column is exempt from the nullability check; an unset
/// identity means the backend generates one at insert.
pub fn validate(mapping: &EntityMapping, record: &Record) -> OrmResult<()> {
    let mut errors = Vec::new();

    for column in &mapping.columns {
        let value = record.value_or_null(&column.column);
        let is_identity = column.column == mapping.identity.column;

        if !column.nullable && !is_identity && value.is_null() {
            errors.push(format!("{}: value is required", column.attribute));
        }

        if let (Some(max_length), Value::Text(text)) = (column.max_length, &value) {
            if text.chars().count() > max_length {
                errors.push(format!(
                    "{}: exceeds maximum length of {}",
                    column.attribute, max_length
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(OrmError::Validation(format!(
            "validation failed: {}",
            errors.join(", ")
        )))
    }
}
