//! Relational primitives over sqlx/SQLite
//!
//! Every primitive takes a live connection; the caller resolves it
//! from the active transaction or a scoped pool acquisition. Record
//! decoding is driven by the mapping's declared kinds so INTEGER
//! booleans read back as booleans.

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::entity::Record;
use crate::error::{OrmError, OrmResult};
use crate::mapping::EntityMapping;
use crate::query::sql::{self, SqlStatement};
use crate::query::QueryState;
use crate::sanitize;
use crate::value::{Value, ValueKind};

/// Connection pool handle for the relational backend.
#[derive(Debug, Clone)]
pub struct RelationalBackend {
    pool: SqlitePool,
}

impl RelationalBackend {
    /// Connect to a SQLite database URL (`sqlite::memory:`,
    /// `sqlite://path/to.db`).
    pub async fn connect(url: &str) -> OrmResult<Self> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(|e| OrmError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Wrap an externally configured pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) async fn acquire(&self) -> OrmResult<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| OrmError::Connection(e.to_string()))
    }

    pub(crate) async fn begin(&self) -> OrmResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| OrmError::Transaction(e.to_string()))
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        // Lists are expanded into per-element placeholders upstream.
        Value::List(_) => query.bind(Option::<String>::None),
    }
}

fn bind_all<'q>(mut query: SqliteQuery<'q>, binds: &[Value]) -> SqliteQuery<'q> {
    for value in binds {
        query = bind_value(query, value);
    }
    query
}

/// Decode a row into a record using the declared column kinds. Columns
/// a raw projection left out (or retyped) are skipped rather than
/// failing the whole row.
fn record_from_row(mapping: &EntityMapping, row: &SqliteRow) -> Record {
    let mut record = Record::new();
    for column in &mapping.columns {
        let name = column.column.as_str();
        let value = match column.kind {
            ValueKind::Bool => row
                .try_get::<Option<bool>, _>(name)
                .map(|v| v.map(Value::Bool)),
            ValueKind::Int => row
                .try_get::<Option<i64>, _>(name)
                .map(|v| v.map(Value::Int)),
            ValueKind::Float => row
                .try_get::<Option<f64>, _>(name)
                .map(|v| v.map(Value::Float)),
            ValueKind::Text => row
                .try_get::<Option<String>, _>(name)
                .map(|v| v.map(Value::Text)),
        };
        match value {
            Ok(Some(value)) => record.set(name, value),
            Ok(None) => record.set(name, Value::Null),
            Err(_) => {}
        }
    }
    record
}

pub(crate) async fn select(
    conn: &mut SqliteConnection,
    mapping: &EntityMapping,
    state: &QueryState,
) -> OrmResult<Vec<Record>> {
    let statement = match &state.raw {
        Some(raw) => {
            let (sql, binds) = sql::apply_named_parameters(raw, &state.parameters);
            SqlStatement { sql, binds }
        }
        None => sql::compile_select(mapping, state)?,
    };
    tracing::debug!(sql = %statement.sql, "executing select");
    let rows = bind_all(sqlx::query(&statement.sql), &statement.binds)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| OrmError::query_in("select", &mapping.collection, e))?;
    Ok(rows.iter().map(|row| record_from_row(mapping, row)).collect())
}

pub(crate) async fn count(
    conn: &mut SqliteConnection,
    mapping: &EntityMapping,
    state: &QueryState,
) -> OrmResult<i64> {
    let statement = sql::compile_count(mapping, state)?;
    let row = bind_all(sqlx::query(&statement.sql), &statement.binds)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| OrmError::query_in("count", &mapping.collection, e))?;
    row.try_get::<i64, _>(0)
        .map_err(|e| OrmError::query_in("count", &mapping.collection, e))
}

/// Insert a record and return its identity. An unset integer identity
/// is left to the engine and read back from last-insert-rowid; an
/// unset text identity gets a UUID before the statement is built.
pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    mapping: &EntityMapping,
    record: &mut Record,
) -> OrmResult<Value> {
    let identity_column = mapping.identity_column().to_string();
    let mut identity = record.value_or_null(&identity_column);

    if identity.is_null() && mapping.identity.kind == ValueKind::Text {
        identity = Value::Text(uuid::Uuid::new_v4().to_string());
        record.set(&identity_column, identity.clone());
    }

    let mut columns = Vec::new();
    let mut binds = Vec::new();
    for column in &mapping.columns {
        if column.column == identity_column && identity.is_null() {
            continue;
        }
        columns.push(sanitize::identifier(&column.column)?.to_string());
        binds.push(record.value_or_null(&column.column));
    }

    let table = sanitize::identifier(&mapping.collection)?;
    let statement = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", table)
    } else {
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        )
    };

    tracing::debug!(sql = %statement, "executing insert");
    let result = bind_all(sqlx::query(&statement), &binds)
        .execute(&mut *conn)
        .await
        .map_err(|e| OrmError::query_in("insert", &mapping.collection, e))?;

    if identity.is_null() && mapping.identity.kind == ValueKind::Int {
        identity = Value::Int(result.last_insert_rowid());
        record.set(&identity_column, identity.clone());
    }
    Ok(identity)
}

pub(crate) async fn update(
    conn: &mut SqliteConnection,
    mapping: &EntityMapping,
    record: &Record,
) -> OrmResult<u64> {
    let identity_column = mapping.identity_column().to_string();
    let identity = record.value_or_null(&identity_column);
    if identity.is_null() {
        return Err(OrmError::query_in(
            "update",
            &mapping.collection,
            "record has no identity value",
        ));
    }

    let mut assignments = Vec::new();
    let mut binds = Vec::new();
    for column in &mapping.columns {
        if column.column == identity_column {
            continue;
        }
        assignments.push(format!("{} = ?", sanitize::identifier(&column.column)?));
        binds.push(record.value_or_null(&column.column));
    }
    binds.push(identity);

    let statement = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        sanitize::identifier(&mapping.collection)?,
        assignments.join(", "),
        sanitize::identifier(&identity_column)?,
    );
    tracing::debug!(sql = %statement, "executing update");
    let result = bind_all(sqlx::query(&statement), &binds)
        .execute(&mut *conn)
        .await
        .map_err(|e| OrmError::query_in("update", &mapping.collection, e))?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_by_identity(
    conn: &mut SqliteConnection,
    mapping: &EntityMapping,
    id: &Value,
) -> OrmResult<u64> {
    let statement = format!(
        "DELETE FROM {} WHERE {} = ?",
        sanitize::identifier(&mapping.collection)?,
        sanitize::identifier(mapping.identity_column())?,
    );
    let result = bind_value(sqlx::query(&statement), id)
        .execute(&mut *conn)
        .await
        .map_err(|e| OrmError::query_in("delete", &mapping.collection, e))?;
    Ok(result.rows_affected())
}

pub(crate) async fn exists(
    conn: &mut SqliteConnection,
    mapping: &EntityMapping,
    id: &Value,
) -> OrmResult<bool> {
    let statement = format!(
        "SELECT 1 FROM {} WHERE {} = ? LIMIT 1",
        sanitize::identifier(&mapping.collection)?,
        sanitize::identifier(mapping.identity_column())?,
    );
    let row = bind_value(sqlx::query(&statement), id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| OrmError::query_in("exists", &mapping.collection, e))?;
    Ok(row.is_some())
}

pub(crate) async fn fetch_by_identity(
    conn: &mut SqliteConnection,
    mapping: &EntityMapping,
    id: &Value,
) -> OrmResult<Option<Record>> {
    fetch_one_by_column(conn, mapping, mapping.identity_column(), id).await
}

pub(crate) async fn fetch_all(
    conn: &mut SqliteConnection,
    mapping: &EntityMapping,
) -> OrmResult<Vec<Record>> {
    let statement = format!("SELECT * FROM {}", sanitize::identifier(&mapping.collection)?);
    let rows = sqlx::query(&statement)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| OrmError::query_in("select", &mapping.collection, e))?;
    Ok(rows.iter().map(|row| record_from_row(mapping, row)).collect())
}

pub(crate) async fn fetch_one_by_column(
    conn: &mut SqliteConnection,
    mapping: &EntityMapping,
    column: &str,
    value: &Value,
) -> OrmResult<Option<Record>> {
    let statement = format!(
        "SELECT * FROM {} WHERE {} = ? LIMIT 1",
        sanitize::identifier(&mapping.collection)?,
        sanitize::identifier(column)?,
    );
    let row = bind_value(sqlx::query(&statement), value)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| OrmError::query_in("select", &mapping.collection, e))?;
    Ok(row.map(|row| record_from_row(mapping, &row)))
}

pub(crate) async fn fetch_all_by_column(
    conn: &mut SqliteConnection,
    mapping: &EntityMapping,
    column: &str,
    value: &Value,
) -> OrmResult<Vec<Record>> {
    let statement = format!(
        "SELECT * FROM {} WHERE {} = ?",
        sanitize::identifier(&mapping.collection)?,
        sanitize::identifier(column)?,
    );
    let rows = bind_value(sqlx::query(&statement), value)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| OrmError::query_in("select", &mapping.collection, e))?;
    Ok(rows.iter().map(|row| record_from_row(mapping, row)).collect())
}

/// Resolve a many-to-many association through its join table.
pub(crate) async fn fetch_via_join(
    conn: &mut SqliteConnection,
    target: &EntityMapping,
    join_table: &str,
    join_column: &str,
    inverse_join_column: &str,
    owner_id: &Value,
) -> OrmResult<Vec<Record>> {
    let statement = format!(
        "SELECT t.* FROM {} t INNER JOIN {} j ON t.{} = j.{} WHERE j.{} = ?",
        sanitize::identifier(&target.collection)?,
        sanitize::identifier(join_table)?,
        sanitize::identifier(target.identity_column())?,
        sanitize::identifier(inverse_join_column)?,
        sanitize::identifier(join_column)?,
    );
    let rows = bind_value(sqlx::query(&statement), owner_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| OrmError::query_in("join select", &target.collection, e))?;
    Ok(rows.iter().map(|row| record_from_row(target, row)).collect())
}

pub(crate) async fn delete_join_rows(
    conn: &mut SqliteConnection,
    join_table: &str,
    join_column: &str,
    owner_id: &Value,
) -> OrmResult<u64> {
    let statement = format!(
        "DELETE FROM {} WHERE {} = ?",
        sanitize::identifier(join_table)?,
        sanitize::identifier(join_column)?,
    );
    let result = bind_value(sqlx::query(&statement), owner_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| OrmError::query_in("join delete", join_table, e))?;
    Ok(result.rows_affected())
}

pub(crate) async fn insert_join_row(
    conn: &mut SqliteConnection,
    join_table: &str,
    join_column: &str,
    inverse_join_column: &str,
    owner_id: &Value,
    related_id: &Value,
) -> OrmResult<()> {
    let statement = format!(
        "INSERT INTO {} ({}, {}) VALUES (?, ?)",
        sanitize::identifier(join_table)?,
        sanitize::identifier(join_column)?,
        sanitize::identifier(inverse_join_column)?,
    );
    bind_value(bind_value(sqlx::query(&statement), owner_id), related_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| OrmError::query_in("join insert", join_table, e))?;
    Ok(())
}

/// Raw statement escape hatch; `:name` placeholders are replaced with
/// binds from the supplied parameters.
pub(crate) async fn execute_raw_update(
    conn: &mut SqliteConnection,
    raw: &str,
    parameters: &[(String, Value)],
) -> OrmResult<u64> {
    let (statement, binds) = sql::apply_named_parameters(raw, parameters);
    tracing::debug!(sql = %statement, "executing raw update");
    let result = bind_all(sqlx::query(&statement), &binds)
        .execute(&mut *conn)
        .await
        .map_err(|e| OrmError::Query(format!("raw update failed: {e}")))?;
    Ok(result.rows_affected())
}
