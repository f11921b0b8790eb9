//! # SQLite executor
//!
//! Implements the `SqlExecutor` port over a sqlx pool. Rows come back as
//! engine-neutral `SqlRow`s; every driver error becomes `Internal`.

use anyhow::Context;
use async_trait::async_trait;
use domains::{DomainError, Query, Result, SqlExecutor, SqlRow, SqlValue};
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqlitePool, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Wait this long on a locked database before failing the statement.
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

#[derive(Debug, Clone)]
pub struct SqliteExecutor {
    pool: SqlitePool,
}

impl SqliteExecutor {
    /// Opens an existing database, e.g. `sqlite:data/content.db`.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url {url}"))?
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;
        Ok(Self { pool })
    }

    /// A private in-memory database on a single long-lived connection
    /// (each new connection to `:memory:` would see an empty database).
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn prepare<'q>(query: &'q Query) -> Result<SqliteQuery<'q>> {
        query.check()?;
        debug!(sql = query.sql(), params = query.params().len(), "executing");

        let mut prepared = sqlx::query(query.sql());
        for param in query.params() {
            prepared = match param {
                SqlValue::Null => prepared.bind(None::<i64>),
                SqlValue::Integer(v) => prepared.bind(*v),
                SqlValue::Real(v) => prepared.bind(*v),
                SqlValue::Text(v) => prepared.bind(v.as_str()),
                SqlValue::Blob(v) => prepared.bind(v.as_slice()),
            };
        }
        Ok(prepared)
    }
}

/// Copies a driver row into a `SqlRow`, keeping each value's storage class.
fn to_sql_row(row: &SqliteRow) -> Result<SqlRow> {
    let mut out = SqlRow::new();
    for (i, column) in row.columns().iter().enumerate() {
        let is_null = row.try_get_raw(i).map_err(DomainError::internal)?.is_null();
        let value = if is_null {
            SqlValue::Null
        } else if let Ok(v) = row.try_get::<i64, _>(i) {
            SqlValue::Integer(v)
        } else if let Ok(v) = row.try_get::<f64, _>(i) {
            SqlValue::Real(v)
        } else if let Ok(v) = row.try_get::<String, _>(i) {
            SqlValue::Text(v)
        } else {
            SqlValue::Blob(row.try_get::<Vec<u8>, _>(i).map_err(DomainError::internal)?)
        };
        out.push(column.name(), value);
    }
    Ok(out)
}

#[async_trait]
impl SqlExecutor for SqliteExecutor {
    async fn fetch_optional(&self, query: &Query) -> Result<Option<SqlRow>> {
        Self::prepare(query)?
            .fetch_optional(&self.pool)
            .await
            .map_err(DomainError::internal)?
            .as_ref()
            .map(to_sql_row)
            .transpose()
    }

    async fn fetch_all(&self, query: &Query) -> Result<Vec<SqlRow>> {
        Self::prepare(query)?
            .fetch_all(&self.pool)
            .await
            .map_err(DomainError::internal)?
            .iter()
            .map(to_sql_row)
            .collect()
    }

    async fn fetch_scalar(&self, query: &Query) -> Result<i64> {
        let row = Self::prepare(query)?
            .fetch_one(&self.pool)
            .await
            .map_err(DomainError::internal)?;
        row.try_get::<i64, _>(0).map_err(DomainError::internal)
    }
}
