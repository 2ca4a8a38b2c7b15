//! Nested transactions over sqlx connections.
//!
//! A [`Handle`] wraps a connection pool. Calling [`Handle::begin`] opens a
//! real transaction; calling it again on the returned handle opens a nested
//! scope inside the same transaction. With savepoints enabled each nested
//! scope gets its own `SAVEPOINT`, so rolling it back only discards its own
//! work. Without them nested scopes are logical and only the outermost
//! scope commits or rolls back.
//!
//! ```no_run
//! # async fn run() -> db_nested_tx::DbResult<()> {
//! use db_nested_tx::{Handle, HandleOption, Query};
//!
//! let db = Handle::connect("postgres", "postgres://localhost/app", [HandleOption::SavePoint(true)]).await?;
//! let mut tx = db.begin().await?;
//! tx.execute(Query::new("INSERT INTO users (name) VALUES ($1)").bind("ada")).await?;
//!
//! let mut inner = tx.begin().await?;
//! inner.execute("DELETE FROM users").await?;
//! inner.rollback().await?;
//!
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod handle;
pub mod models;
pub mod named;
pub mod options;
pub mod savepoint;

pub use config::{ConnectConfig, PoolOptions};
pub use db::{DbPool, DbTransaction};
pub use driver::{Connector, Executor, TransactionDriver};
pub use error::{DbError, DbResult};
pub use handle::{Handle, SharedTransaction};
pub use models::{
    Dialect, ExecResult, IsolationLevel, Query, QueryParam, Row, StatementInfo, TxOptions,
};
pub use options::HandleOption;
pub use savepoint::SavepointId;
