//! Backend capability interface
//!
//! One enum with a relational and a document variant exposes the full
//! primitive set; every backend dispatch in the engine lives here.
//! Each primitive either reuses the repository's active transaction or
//! acquires a scoped connection released on every exit path.

pub mod document;
pub mod relational;

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, Transaction};

pub use document::{DocumentBackend, DocumentSession};
pub use relational::RelationalBackend;

use crate::entity::Record;
use crate::error::{OrmError, OrmResult};
use crate::mapping::EntityMapping;
use crate::query::QueryState;
use crate::value::Value;

/// Storage engine a repository is bound to, chosen once at construction.
#[derive(Debug)]
pub enum Backend {
    Relational(RelationalBackend),
    Document(DocumentBackend),
}

/// A transaction in flight, held by the repository that began it.
pub enum ActiveTransaction {
    Relational(Transaction<'static, Sqlite>),
    Document(DocumentSession),
}

impl std::fmt::Debug for ActiveTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActiveTransaction::Relational(_) => f.write_str("ActiveTransaction::Relational"),
            ActiveTransaction::Document(_) => f.write_str("ActiveTransaction::Document"),
        }
    }
}

/// Connection resolved for one relational primitive call: borrowed
/// from the active transaction, or owned and returned to the pool on
/// drop.
enum SqlConn<'a> {
    Borrowed(&'a mut SqliteConnection),
    Owned(PoolConnection<Sqlite>),
}

impl SqlConn<'_> {
    fn get(&mut self) -> &mut SqliteConnection {
        match self {
            SqlConn::Borrowed(conn) => conn,
            SqlConn::Owned(conn) => &mut *conn,
        }
    }
}

async fn sql_conn<'a>(
    backend: &RelationalBackend,
    tx: &'a mut Option<ActiveTransaction>,
) -> OrmResult<SqlConn<'a>> {
    match tx {
        Some(ActiveTransaction::Relational(transaction)) => {
            Ok(SqlConn::Borrowed(&mut **transaction))
        }
        Some(ActiveTransaction::Document(_)) => Err(OrmError::Transaction(
            "active transaction belongs to the document backend".into(),
        )),
        None => Ok(SqlConn::Owned(backend.acquire().await?)),
    }
}

fn doc_session<'a>(
    tx: &'a mut Option<ActiveTransaction>,
) -> OrmResult<Option<&'a mut DocumentSession>> {
    match tx {
        Some(ActiveTransaction::Document(session)) => Ok(Some(session)),
        Some(ActiveTransaction::Relational(_)) => Err(OrmError::Transaction(
            "active transaction belongs to the relational backend".into(),
        )),
        None => Ok(None),
    }
}

impl Backend {
    /// Relational backend over a SQLite database URL.
    pub async fn sqlite(url: &str) -> OrmResult<Backend> {
        Ok(Backend::Relational(RelationalBackend::connect(url).await?))
    }

    /// Fresh in-process document backend.
    pub fn documents() -> Backend {
        Backend::Document(DocumentBackend::new())
    }

    pub fn is_relational(&self) -> bool {
        matches!(self, Backend::Relational(_))
    }

    pub(crate) async fn begin(&self) -> OrmResult<ActiveTransaction> {
        match self {
            Backend::Relational(backend) => {
                Ok(ActiveTransaction::Relational(backend.begin().await?))
            }
            Backend::Document(backend) => {
                Ok(ActiveTransaction::Document(backend.begin_session()?))
            }
        }
    }

    pub(crate) async fn commit(&self, transaction: ActiveTransaction) -> OrmResult<()> {
        match (self, transaction) {
            (Backend::Relational(_), ActiveTransaction::Relational(tx)) => tx
                .commit()
                .await
                .map_err(|e| OrmError::Transaction(e.to_string())),
            (Backend::Document(backend), ActiveTransaction::Document(session)) => {
                backend.commit_session(session)
            }
            _ => Err(OrmError::Transaction(
                "transaction does not belong to this backend".into(),
            )),
        }
    }

    pub(crate) async fn rollback(&self, transaction: ActiveTransaction) -> OrmResult<()> {
        match (self, transaction) {
            (Backend::Relational(_), ActiveTransaction::Relational(tx)) => tx
                .rollback()
                .await
                .map_err(|e| OrmError::Transaction(e.to_string())),
            // Dropping the session discards its working set.
            (Backend::Document(_), ActiveTransaction::Document(_)) => Ok(()),
            _ => Err(OrmError::Transaction(
                "transaction does not belong to this backend".into(),
            )),
        }
    }

    pub(crate) async fn insert(
        &self,
        tx: &mut Option<ActiveTransaction>,
        mapping: &EntityMapping,
        record: &mut Record,
    ) -> OrmResult<Value> {
        match self {
            Backend::Relational(backend) => {
                let mut conn = sql_conn(backend, tx).await?;
                relational::insert(conn.get(), mapping, record).await
            }
            Backend::Document(backend) => backend.insert(doc_session(tx)?, mapping, record),
        }
    }

    pub(crate) async fn update(
        &self,
        tx: &mut Option<ActiveTransaction>,
        mapping: &EntityMapping,
        record: &Record,
    ) -> OrmResult<u64> {
        match self {
            Backend::Relational(backend) => {
                let mut conn = sql_conn(backend, tx).await?;
                relational::update(conn.get(), mapping, record).await
            }
            Backend::Document(backend) => backend.update(doc_session(tx)?, mapping, record),
        }
    }

    pub(crate) async fn delete_by_identity(
        &self,
        tx: &mut Option<ActiveTransaction>,
        mapping: &EntityMapping,
        id: &Value,
    ) -> OrmResult<u64> {
        match self {
            Backend::Relational(backend) => {
                let mut conn = sql_conn(backend, tx).await?;
                relational::delete_by_identity(conn.get(), mapping, id).await
            }
            Backend::Document(backend) => backend.delete_by_identity(doc_session(tx)?, mapping, id),
        }
    }

    pub(crate) async fn exists(
        &self,
        tx: &mut Option<ActiveTransaction>,
        mapping: &EntityMapping,
        id: &Value,
    ) -> OrmResult<bool> {
        match self {
            Backend::Relational(backend) => {
                let mut conn = sql_conn(backend, tx).await?;
                relational::exists(conn.get(), mapping, id).await
            }
            Backend::Document(backend) => backend.exists(doc_session(tx)?.as_deref(), mapping, id),
        }
    }

    pub(crate) async fn fetch_by_identity(
        &self,
        tx: &mut Option<ActiveTransaction>,
        mapping: &EntityMapping,
        id: &Value,
    ) -> OrmResult<Option<Record>> {
        match self {
            Backend::Relational(backend) => {
                let mut conn = sql_conn(backend, tx).await?;
                relational::fetch_by_identity(conn.get(), mapping, id).await
            }
            Backend::Document(backend) => {
                backend.fetch_by_identity(doc_session(tx)?.as_deref(), mapping, id)
            }
        }
    }

    pub(crate) async fn fetch_all(
        &self,
        tx: &mut Option<ActiveTransaction>,
        mapping: &EntityMapping,
    ) -> OrmResult<Vec<Record>> {
        match self {
            Backend::Relational(backend) => {
                let mut conn = sql_conn(backend, tx).await?;
                relational::fetch_all(conn.get(), mapping).await
            }
            Backend::Document(backend) => backend.fetch_all(doc_session(tx)?.as_deref(), mapping),
        }
    }

    pub(crate) async fn fetch_one_by_column(
        &self,
        tx: &mut Option<ActiveTransaction>,
        mapping: &EntityMapping,
        column: &str,
        value: &Value,
    ) -> OrmResult<Option<Record>> {
        match self {
            Backend::Relational(backend) => {
                let mut conn = sql_conn(backend, tx).await?;
                relational::fetch_one_by_column(conn.get(), mapping, column, value).await
            }
            Backend::Document(backend) => {
                backend.fetch_one_by_column(doc_session(tx)?.as_deref(), mapping, column, value)
            }
        }
    }

    pub(crate) async fn fetch_all_by_column(
        &self,
        tx: &mut Option<ActiveTransaction>,
        mapping: &EntityMapping,
        column: &str,
        value: &Value,
    ) -> OrmResult<Vec<Record>> {
        match self {
            Backend::Relational(backend) => {
                let mut conn = sql_conn(backend, tx).await?;
                relational::fetch_all_by_column(conn.get(), mapping, column, value).await
            }
            Backend::Document(backend) => {
                backend.fetch_all_by_column(doc_session(tx)?.as_deref(), mapping, column, value)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn fetch_via_join(
        &self,
        tx: &mut Option<ActiveTransaction>,
        target: &EntityMapping,
        join_table: &str,
        join_column: &str,
        inverse_join_column: &str,
        owner_id: &Value,
    ) -> OrmResult<Vec<Record>> {
        match self {
            Backend::Relational(backend) => {
                let mut conn = sql_conn(backend, tx).await?;
                relational::fetch_via_join(
                    conn.get(),
                    target,
                    join_table,
                    join_column,
                    inverse_join_column,
                    owner_id,
                )
                .await
            }
            Backend::Document(backend) => backend.fetch_via_join(
                doc_session(tx)?.as_deref(),
                target,
                join_table,
                join_column,
                inverse_join_column,
                owner_id,
            ),
        }
    }

    pub(crate) async fn delete_join_rows(
        &self,
        tx: &mut Option<ActiveTransaction>,
        join_table: &str,
        join_column: &str,
        owner_id: &Value,
    ) -> OrmResult<u64> {
        match self {
            Backend::Relational(backend) => {
                let mut conn = sql_conn(backend, tx).await?;
                relational::delete_join_rows(conn.get(), join_table, join_column, owner_id).await
            }
            Backend::Document(backend) => {
                backend.delete_join_rows(doc_session(tx)?, join_table, join_column, owner_id)
            }
        }
    }

    pub(crate) async fn insert_join_row(
        &self,
        tx: &mut Option<ActiveTransaction>,
        join_table: &str,
        join_column: &str,
        inverse_join_column: &str,
        owner_id: &Value,
        related_id: &Value,
    ) -> OrmResult<()> {
        match self {
            Backend::Relational(backend) => {
                let mut conn = sql_conn(backend, tx).await?;
                relational::insert_join_row(
                    conn.get(),
                    join_table,
                    join_column,
                    inverse_join_column,
                    owner_id,
                    related_id,
                )
                .await
            }
            Backend::Document(backend) => backend.insert_join_row(
                doc_session(tx)?,
                join_table,
                join_column,
                inverse_join_column,
                owner_id,
                related_id,
            ),
        }
    }

    pub(crate) async fn select(
        &self,
        tx: &mut Option<ActiveTransaction>,
        mapping: &EntityMapping,
        state: &QueryState,
    ) -> OrmResult<Vec<Record>> {
        match self {
            Backend::Relational(backend) => {
                let mut conn = sql_conn(backend, tx).await?;
                relational::select(conn.get(), mapping, state).await
            }
            Backend::Document(backend) => {
                backend.select(doc_session(tx)?.as_deref(), mapping, state)
            }
        }
    }

    pub(crate) async fn count(
        &self,
        tx: &mut Option<ActiveTransaction>,
        mapping: &EntityMapping,
        state: &QueryState,
    ) -> OrmResult<i64> {
        match self {
            Backend::Relational(backend) => {
                let mut conn = sql_conn(backend, tx).await?;
                relational::count(conn.get(), mapping, state).await
            }
            Backend::Document(backend) => {
                backend.count(doc_session(tx)?.as_deref(), mapping, state)
            }
        }
    }

    /// Raw update escape hatch; relational only.
    pub(crate) async fn execute_raw_update(
        &self,
        tx: &mut Option<ActiveTransaction>,
        raw: &str,
        parameters: &[(String, Value)],
    ) -> OrmResult<u64> {
        match self {
            Backend::Relational(backend) => {
                let mut conn = sql_conn(backend, tx).await?;
                relational::execute_raw_update(conn.get(), raw, parameters).await
            }
            Backend::Document(_) => Err(OrmError::Query(
                "raw updates are only supported on the relational backend".into(),
            )),
        }
    }
}
