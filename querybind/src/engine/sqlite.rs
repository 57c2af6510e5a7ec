//! SQLite engine backed by a `sqlx` pool

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use crate::config::Config;
use crate::error::EngineError;
use crate::query::sql::SqlWriter;
use crate::value::Value;

use super::{QueryEngine, Row, SelectQuery};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

#[derive(Clone)]
pub struct SqliteEngine {
    pool: SqlitePool,
}

impl SqliteEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool from the configured database URL.
    pub async fn connect(config: &Config) -> Result<Self, EngineError> {
        Self::connect_url(&config.database_url, config.database_max_connections).await
    }

    pub async fn connect_url(url: &str, max_connections: u32) -> Result<Self, EngineError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Each in-memory connection would otherwise see its own empty database
        let max_connections = if url.contains(":memory:") {
            1
        } else {
            max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        tracing::debug!(url = %url, max_connections, "Connected SQLite pool");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run a statement without results, such as schema setup.
    pub async fn execute(&self, sql: &str) -> Result<u64, EngineError> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &'q Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(if *b { 1i32 } else { 0i32 }),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.as_str()),
        other => query.bind(other.to_key_string()),
    }
}

fn decode_row(row: &SqliteRow) -> Result<Row, EngineError> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let type_name = {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                out.push(column.name(), Value::Null);
                continue;
            }
            raw.type_info().name().to_string()
        };

        let value = match type_name.as_str() {
            "INTEGER" | "BOOLEAN" => Value::Int(row.try_get_unchecked::<i64, _>(i)?),
            "REAL" => Value::Float(row.try_get_unchecked::<f64, _>(i)?),
            "TEXT" | "DATE" | "DATETIME" | "TIME" => {
                Value::Text(row.try_get_unchecked::<String, _>(i)?)
            }
            "BLOB" => {
                let bytes: Vec<u8> = row.try_get_unchecked(i)?;
                Value::Text(String::from_utf8(bytes).map_err(|e| EngineError::Decode {
                    column: column.name().to_string(),
                    message: e.to_string(),
                })?)
            }
            other => {
                return Err(EngineError::Decode {
                    column: column.name().to_string(),
                    message: format!("unsupported storage class {}", other),
                });
            }
        };
        out.push(column.name(), value);
    }
    Ok(out)
}

#[async_trait]
impl QueryEngine for SqliteEngine {
    async fn query(&self, query: &SelectQuery) -> Result<Vec<Row>, EngineError> {
        let (sql, binds) = SqlWriter::select(query)?;
        tracing::debug!(sql = %sql, binds = binds.len(), "Executing select");

        let mut q = sqlx::query(&sql);
        for value in &binds {
            q = bind_value(q, value);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn count(&self, query: &SelectQuery) -> Result<i64, EngineError> {
        let (sql, binds) = SqlWriter::count(query)?;
        tracing::debug!(sql = %sql, binds = binds.len(), "Executing count");

        let mut q = sqlx::query(&sql);
        for value in &binds {
            q = bind_value(q, value);
        }

        let row = q.fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }
}
