//! Statement execution against sqlx executors.
//!
//! Pools and open transactions both run statements through the functions
//! here. Each backend module is generic over the sqlx executor, so a
//! `&MySqlPool` and the `&mut MySqlConnection` behind a transaction share one
//! code path.
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific execution and preparation
//! - `postgres`: PostgreSQL-specific execution and preparation
//! - `sqlite`: SQLite-specific execution and preparation
//!
//! Each submodule provides identical functionality adapted to the database's type system.

use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnInfo, ExecResult, Query, Row, StatementInfo};
use sqlx::{Column, Either, Statement, TypeInfo};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

// =============================================================================
// Common Helper Functions
// =============================================================================

/// Await a driver future, bounded by the query's timeout when it has one.
async fn bounded<T, F>(limit: Option<Duration>, operation: &str, fut: F) -> DbResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let Some(limit) = limit else {
        return Ok(fut.await?);
    };
    match timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(DbError::timeout(operation, limit.as_millis() as u64)),
    }
}

fn log_statement(query: &Query) {
    debug!(
        sql = %query.sql,
        params = query.params.len(),
        timeout_ms = ?query.timeout.map(|t| t.as_millis()),
        "Executing statement"
    );
}

fn statement_info<'q, S: Statement<'q>>(sql: &str, statement: &S) -> StatementInfo {
    let columns = statement
        .columns()
        .iter()
        .map(|col| ColumnInfo {
            name: col.name().to_string(),
            type_name: col.type_info().name().to_string(),
        })
        .collect();
    let parameters = statement.parameters().map(|p| match p {
        Either::Left(types) => types.len(),
        Either::Right(count) => count,
    });
    StatementInfo {
        sql: sql.to_string(),
        columns,
        parameters,
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// Statements without parameters run as raw SQL, since some statements (stored
// procedure definitions, multi-statement batches) cannot be prepared.

pub(crate) mod mysql {
    use super::*;
    use sqlx::MySql;

    pub async fn execute<'c, E>(executor: E, query: &Query) -> DbResult<ExecResult>
    where
        E: sqlx::Executor<'c, Database = MySql>,
    {
        log_statement(query);
        let result = if query.params.is_empty() {
            bounded(query.timeout, "execute", executor.execute(query.sql.as_str())).await?
        } else {
            let mut q = sqlx::query(&query.sql);
            for param in &query.params {
                q = bind_mysql_param(q, param);
            }
            bounded(query.timeout, "execute", q.execute(executor)).await?
        };
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: i64::try_from(result.last_insert_id()).ok(),
        })
    }

    pub async fn fetch_all<'c, E>(executor: E, query: &Query) -> DbResult<Vec<Row>>
    where
        E: sqlx::Executor<'c, Database = MySql>,
    {
        log_statement(query);
        let rows = if query.params.is_empty() {
            bounded(query.timeout, "fetch", executor.fetch_all(query.sql.as_str())).await?
        } else {
            let mut q = sqlx::query(&query.sql);
            for param in &query.params {
                q = bind_mysql_param(q, param);
            }
            bounded(query.timeout, "fetch", q.fetch_all(executor)).await?
        };
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    pub async fn fetch_optional<'c, E>(executor: E, query: &Query) -> DbResult<Option<Row>>
    where
        E: sqlx::Executor<'c, Database = MySql>,
    {
        log_statement(query);
        let row = if query.params.is_empty() {
            bounded(
                query.timeout,
                "fetch",
                executor.fetch_optional(query.sql.as_str()),
            )
            .await?
        } else {
            let mut q = sqlx::query(&query.sql);
            for param in &query.params {
                q = bind_mysql_param(q, param);
            }
            bounded(query.timeout, "fetch", q.fetch_optional(executor)).await?
        };
        Ok(row.as_ref().map(RowToJson::to_json_map))
    }

    pub async fn prepare<'c, E>(executor: E, sql: &str) -> DbResult<StatementInfo>
    where
        E: sqlx::Executor<'c, Database = MySql>,
    {
        let statement = executor.prepare(sql).await?;
        Ok(statement_info(sql, &statement))
    }
}

pub(crate) mod postgres {
    use super::*;
    use sqlx::Postgres;

    pub async fn execute<'c, E>(executor: E, query: &Query) -> DbResult<ExecResult>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        log_statement(query);
        let result = if query.params.is_empty() {
            bounded(query.timeout, "execute", executor.execute(query.sql.as_str())).await?
        } else {
            let mut q = sqlx::query(&query.sql);
            for param in &query.params {
                q = bind_postgres_param(q, param);
            }
            bounded(query.timeout, "execute", q.execute(executor)).await?
        };
        // PostgreSQL has no last-insert id; use RETURNING instead.
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }

    pub async fn fetch_all<'c, E>(executor: E, query: &Query) -> DbResult<Vec<Row>>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        log_statement(query);
        let rows = if query.params.is_empty() {
            bounded(query.timeout, "fetch", executor.fetch_all(query.sql.as_str())).await?
        } else {
            let mut q = sqlx::query(&query.sql);
            for param in &query.params {
                q = bind_postgres_param(q, param);
            }
            bounded(query.timeout, "fetch", q.fetch_all(executor)).await?
        };
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    pub async fn fetch_optional<'c, E>(executor: E, query: &Query) -> DbResult<Option<Row>>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        log_statement(query);
        let row = if query.params.is_empty() {
            bounded(
                query.timeout,
                "fetch",
                executor.fetch_optional(query.sql.as_str()),
            )
            .await?
        } else {
            let mut q = sqlx::query(&query.sql);
            for param in &query.params {
                q = bind_postgres_param(q, param);
            }
            bounded(query.timeout, "fetch", q.fetch_optional(executor)).await?
        };
        Ok(row.as_ref().map(RowToJson::to_json_map))
    }

    pub async fn prepare<'c, E>(executor: E, sql: &str) -> DbResult<StatementInfo>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let statement = executor.prepare(sql).await?;
        Ok(statement_info(sql, &statement))
    }
}

pub(crate) mod sqlite {
    use super::*;
    use sqlx::Sqlite;

    pub async fn execute<'c, E>(executor: E, query: &Query) -> DbResult<ExecResult>
    where
        E: sqlx::Executor<'c, Database = Sqlite>,
    {
        log_statement(query);
        let result = if query.params.is_empty() {
            bounded(query.timeout, "execute", executor.execute(query.sql.as_str())).await?
        } else {
            let mut q = sqlx::query(&query.sql);
            for param in &query.params {
                q = bind_sqlite_param(q, param);
            }
            bounded(query.timeout, "execute", q.execute(executor)).await?
        };
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    pub async fn fetch_all<'c, E>(executor: E, query: &Query) -> DbResult<Vec<Row>>
    where
        E: sqlx::Executor<'c, Database = Sqlite>,
    {
        log_statement(query);
        let rows = if query.params.is_empty() {
            bounded(query.timeout, "fetch", executor.fetch_all(query.sql.as_str())).await?
        } else {
            let mut q = sqlx::query(&query.sql);
            for param in &query.params {
                q = bind_sqlite_param(q, param);
            }
            bounded(query.timeout, "fetch", q.fetch_all(executor)).await?
        };
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    pub async fn fetch_optional<'c, E>(executor: E, query: &Query) -> DbResult<Option<Row>>
    where
        E: sqlx::Executor<'c, Database = Sqlite>,
    {
        log_statement(query);
        let row = if query.params.is_empty() {
            bounded(
                query.timeout,
                "fetch",
                executor.fetch_optional(query.sql.as_str()),
            )
            .await?
        } else {
            let mut q = sqlx::query(&query.sql);
            for param in &query.params {
                q = bind_sqlite_param(q, param);
            }
            bounded(query.timeout, "fetch", q.fetch_optional(executor)).await?
        };
        Ok(row.as_ref().map(RowToJson::to_json_map))
    }

    pub async fn prepare<'c, E>(executor: E, sql: &str) -> DbResult<StatementInfo>
    where
        E: sqlx::Executor<'c, Database = Sqlite>,
    {
        let statement = executor.prepare(sql).await?;
        Ok(statement_info(sql, &statement))
    }
}
