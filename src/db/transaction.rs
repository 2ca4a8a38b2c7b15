//! Real transactions on the sqlx backends.
//!
//! A [`DbTransaction`] holds a dedicated connection until it is committed or
//! rolled back. Dropping it unfinished lets sqlx roll it back when the
//! connection returns to the pool.

use crate::db::executor;
use crate::driver::{Executor, TransactionDriver};
use crate::error::{DbError, DbResult};
use crate::models::{Dialect, ExecResult, IsolationLevel, Query, Row, StatementInfo, TxOptions};
use sqlx::{MySql, Postgres, Sqlite, Transaction};

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    /// MySQL transaction
    MySql(Transaction<'static, MySql>),
    /// PostgreSQL transaction
    Postgres(Transaction<'static, Postgres>),
    /// SQLite transaction
    SQLite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    /// Get the dialect of this transaction.
    pub fn dialect(&self) -> Dialect {
        match self {
            DbTransaction::MySql(_) => Dialect::MySQL,
            DbTransaction::Postgres(_) => Dialect::PostgreSQL,
            DbTransaction::SQLite(_) => Dialect::SQLite,
        }
    }
}

impl std::fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DbTransaction")
            .field(&self.dialect())
            .finish()
    }
}

impl From<Transaction<'static, MySql>> for DbTransaction {
    fn from(tx: Transaction<'static, MySql>) -> Self {
        DbTransaction::MySql(tx)
    }
}

impl From<Transaction<'static, Postgres>> for DbTransaction {
    fn from(tx: Transaction<'static, Postgres>) -> Self {
        DbTransaction::Postgres(tx)
    }
}

impl From<Transaction<'static, Sqlite>> for DbTransaction {
    fn from(tx: Transaction<'static, Sqlite>) -> Self {
        DbTransaction::SQLite(tx)
    }
}

impl Executor for DbTransaction {
    fn driver_name(&self) -> &str {
        self.dialect().driver_name()
    }

    async fn execute(&mut self, query: &Query) -> DbResult<ExecResult> {
        impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => executor::mysql::execute(&mut **tx, query).await,
            Postgres(tx) => executor::postgres::execute(&mut **tx, query).await,
            SQLite(tx) => executor::sqlite::execute(&mut **tx, query).await,
        })
    }

    async fn fetch_all(&mut self, query: &Query) -> DbResult<Vec<Row>> {
        impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => executor::mysql::fetch_all(&mut **tx, query).await,
            Postgres(tx) => executor::postgres::fetch_all(&mut **tx, query).await,
            SQLite(tx) => executor::sqlite::fetch_all(&mut **tx, query).await,
        })
    }

    async fn fetch_optional(&mut self, query: &Query) -> DbResult<Option<Row>> {
        impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => executor::mysql::fetch_optional(&mut **tx, query).await,
            Postgres(tx) => executor::postgres::fetch_optional(&mut **tx, query).await,
            SQLite(tx) => executor::sqlite::fetch_optional(&mut **tx, query).await,
        })
    }

    async fn prepare(&mut self, sql: &str) -> DbResult<StatementInfo> {
        impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => executor::mysql::prepare(&mut **tx, sql).await,
            Postgres(tx) => executor::postgres::prepare(&mut **tx, sql).await,
            SQLite(tx) => executor::sqlite::prepare(&mut **tx, sql).await,
        })
    }
}

impl TransactionDriver for DbTransaction {
    async fn commit(self) -> DbResult<()> {
        match self {
            DbTransaction::MySql(tx) => tx.commit().await.map_err(DbError::from),
            DbTransaction::Postgres(tx) => tx.commit().await.map_err(DbError::from),
            DbTransaction::SQLite(tx) => tx.commit().await.map_err(DbError::from),
        }
    }

    async fn rollback(self) -> DbResult<()> {
        match self {
            DbTransaction::MySql(tx) => tx.rollback().await.map_err(DbError::from),
            DbTransaction::Postgres(tx) => tx.rollback().await.map_err(DbError::from),
            DbTransaction::SQLite(tx) => tx.rollback().await.map_err(DbError::from),
        }
    }
}

/// Build the statement that opens a transaction with `options`.
///
/// `None` means the driver's plain BEGIN already matches. SQLite transactions
/// are always serializable and cannot be declared read-only, so any other
/// request is rejected rather than silently ignored.
pub(crate) fn begin_statement(dialect: Dialect, options: &TxOptions) -> DbResult<Option<String>> {
    if options.is_default_mode() {
        return Ok(None);
    }

    match dialect {
        Dialect::PostgreSQL => {
            let mut sql = String::from("BEGIN");
            if let Some(level) = options.isolation {
                sql.push_str(" ISOLATION LEVEL ");
                sql.push_str(level.as_sql());
            }
            if options.read_only {
                sql.push_str(" READ ONLY");
            }
            Ok(Some(sql))
        }
        Dialect::MySQL => {
            // SET TRANSACTION only affects the next transaction on this session.
            let mut sql = String::new();
            if let Some(level) = options.isolation {
                sql.push_str("SET TRANSACTION ISOLATION LEVEL ");
                sql.push_str(level.as_sql());
                sql.push_str("; ");
            }
            sql.push_str("START TRANSACTION");
            if options.read_only {
                sql.push_str(" READ ONLY");
            }
            Ok(Some(sql))
        }
        Dialect::SQLite => {
            if options.read_only {
                return Err(DbError::incompatible_option("read_only", "sqlite"));
            }
            match options.isolation {
                None | Some(IsolationLevel::Serializable) => Ok(None),
                Some(level) => Err(DbError::incompatible_option(
                    format!("isolation level {level}"),
                    "sqlite",
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_statement_default_uses_plain_begin() {
        for dialect in [Dialect::PostgreSQL, Dialect::MySQL, Dialect::SQLite] {
            assert_eq!(begin_statement(dialect, &TxOptions::default()).unwrap(), None);
        }
    }

    #[test]
    fn test_begin_statement_postgres() {
        let opts = TxOptions::new()
            .with_isolation(IsolationLevel::RepeatableRead)
            .read_only();
        assert_eq!(
            begin_statement(Dialect::PostgreSQL, &opts).unwrap().as_deref(),
            Some("BEGIN ISOLATION LEVEL REPEATABLE READ READ ONLY")
        );
        assert_eq!(
            begin_statement(Dialect::PostgreSQL, &TxOptions::new().read_only())
                .unwrap()
                .as_deref(),
            Some("BEGIN READ ONLY")
        );
    }

    #[test]
    fn test_begin_statement_mysql() {
        let opts = TxOptions::new().with_isolation(IsolationLevel::ReadCommitted);
        assert_eq!(
            begin_statement(Dialect::MySQL, &opts).unwrap().as_deref(),
            Some("SET TRANSACTION ISOLATION LEVEL READ COMMITTED; START TRANSACTION")
        );
        assert_eq!(
            begin_statement(Dialect::MySQL, &TxOptions::new().read_only())
                .unwrap()
                .as_deref(),
            Some("START TRANSACTION READ ONLY")
        );
    }

    #[test]
    fn test_begin_statement_sqlite() {
        let serializable = TxOptions::new().with_isolation(IsolationLevel::Serializable);
        assert_eq!(begin_statement(Dialect::SQLite, &serializable).unwrap(), None);

        let err = begin_statement(Dialect::SQLite, &TxOptions::new().read_only()).unwrap_err();
        assert!(err.is_incompatible_option());

        let relaxed = TxOptions::new().with_isolation(IsolationLevel::ReadCommitted);
        let err = begin_statement(Dialect::SQLite, &relaxed).unwrap_err();
        assert!(err.to_string().contains("READ COMMITTED"));
    }
}
