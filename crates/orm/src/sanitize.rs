//! SQL identifier sanitization
//!
//! Table, column and join-table names are interpolated into generated
//! statements and must be validated first; values always go through
//! bind parameters and never pass here.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{OrmError, OrmResult};

const MAX_IDENTIFIER_LENGTH: usize = 128;

static VALID_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-zA-Z_][a-zA-Z0-9_]*$").expect("identifier pattern"));

/// Validate an identifier for interpolation into generated SQL.
///
/// Accepts `[a-zA-Z_][a-zA-Z0-9_]*` up to 128 characters and returns
/// the identifier unchanged; anything else is a query error.
pub fn identifier(name: &str) -> OrmResult<&str> {
    if name.is_empty() {
        return Err(OrmError::Query("SQL identifier cannot be empty".into()));
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(OrmError::Query(format!(
            "SQL identifier exceeds maximum length of {}",
            MAX_IDENTIFIER_LENGTH
        )));
    }
    if !VALID_IDENTIFIER.is_match(name) {
        return Err(OrmError::Query(format!(
            "invalid SQL identifier '{}': only alphanumerics and underscores are allowed, starting with a letter or underscore",
            name
        )));
    }
    Ok(name)
}

/// Check without building an error.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_IDENTIFIER_LENGTH && VALID_IDENTIFIER.is_match(name)
}
