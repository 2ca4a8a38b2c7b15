//! Nested transaction handles.
//!
//! A [`Handle`] is one logical transaction scope. A chain of handles shares
//! a single real transaction; inner scopes either map to a savepoint or are
//! purely logical, depending on how the root handle was configured.
//!
//! ```text
//! root (connection)
//!   └─ begin ─> owner            BEGIN ... COMMIT / ROLLBACK
//!                 └─ begin ─> nested   SAVEPOINT sp_... (or nothing)
//! ```
//!
//! Only the owner finishes the real transaction, and only the handle that
//! created a savepoint releases or rolls back to it. A handle becomes
//! terminal after its first successful `commit` or `rollback`: further
//! commits fail with [`DbError::NotInTransaction`], further rollbacks are
//! no-ops, and forwarding a query through it panics.

use crate::config::{ConnectConfig, PoolOptions};
use crate::db::DbPool;
use crate::driver::{Connector, Executor, TransactionDriver};
use crate::error::{DbError, DbResult};
use crate::models::{
    Dialect, ExecResult, PlaceholderStyle, Query, Row, StatementInfo, TxOptions,
};
use crate::named;
use crate::options::{HandleOption, Settings};
use crate::savepoint::SavepointId;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// The real transaction of a chain, shared by every handle in it.
///
/// The owning handle takes the transaction out of the cell to finish it;
/// an empty cell means the real transaction is over.
pub type SharedTransaction<T> = Arc<Mutex<Option<T>>>;

/// Where forwarded queries go.
enum ActiveDriver<C: Connector> {
    Connection(C),
    Transaction(SharedTransaction<C::Transaction>),
}

impl<C: Connector> Clone for ActiveDriver<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Connection(conn) => Self::Connection(conn.clone()),
            Self::Transaction(tx) => Self::Transaction(Arc::clone(tx)),
        }
    }
}

/// Forward one call to the active driver.
///
/// The connection arm works on a clone of the connector; the transaction arm
/// holds the shared lock for the duration of the call.
macro_rules! forward {
    ($self:ident, |$d:ident| $call:expr) => {
        match $self.active_driver() {
            ActiveDriver::Connection(conn) => {
                let mut $d = conn.clone();
                $call.await
            }
            ActiveDriver::Transaction(shared) => {
                let mut guard = shared.lock().await;
                let $d = guard.as_mut().ok_or(DbError::TransactionDone)?;
                $call.await
            }
        }
    };
}

/// A nested transaction scope over a database connection.
pub struct Handle<C: Connector = DbPool> {
    connection: Option<C>,
    driver: Option<ActiveDriver<C>>,
    transaction: Option<SharedTransaction<C::Transaction>>,
    savepoint: Option<SavepointId>,
    nested: bool,
    settings: Settings,
}

impl<C: Connector> Handle<C> {
    /// Wrap an open connection as a root handle.
    ///
    /// Fails with [`DbError::IncompatibleOption`] when an option cannot be
    /// honoured by the connection's driver.
    pub fn new(
        connection: C,
        options: impl IntoIterator<Item = HandleOption>,
    ) -> DbResult<Self> {
        let settings = Settings::resolve(connection.driver_name(), options)?;
        Ok(Self {
            driver: Some(ActiveDriver::Connection(connection.clone())),
            connection: Some(connection),
            transaction: None,
            savepoint: None,
            nested: false,
            settings,
        })
    }

    /// Like [`Handle::new`], but closes `connection` when an option is
    /// rejected so no pool outlives a failed construction.
    pub async fn open(
        connection: C,
        options: impl IntoIterator<Item = HandleOption>,
    ) -> DbResult<Self> {
        match Self::new(connection.clone(), options) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                connection.close().await;
                Err(err)
            }
        }
    }

    /// Wrap a real transaction opened elsewhere as a root handle.
    ///
    /// The returned handle owns the transaction: committing or rolling it
    /// back finishes the real transaction.
    pub fn from_transaction(
        transaction: C::Transaction,
        options: impl IntoIterator<Item = HandleOption>,
    ) -> DbResult<Self> {
        let settings = Settings::resolve(transaction.driver_name(), options)?;
        let shared = Arc::new(Mutex::new(Some(transaction)));
        Ok(Self {
            connection: None,
            driver: Some(ActiveDriver::Transaction(Arc::clone(&shared))),
            transaction: Some(shared),
            savepoint: None,
            nested: false,
            settings,
        })
    }

    /// Begin a nested scope with default options.
    pub async fn begin(&self) -> DbResult<Handle<C>> {
        self.begin_with(&TxOptions::default()).await
    }

    /// Begin a nested scope.
    ///
    /// `options` only apply when this call opens the real transaction; inner
    /// scopes reuse the outer one as is. On error this handle is unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the handle has neither a transaction nor a connection to
    /// open one on, which happens once a handle built with
    /// [`Handle::from_transaction`] has been finished.
    pub async fn begin_with(&self, options: &TxOptions) -> DbResult<Handle<C>> {
        let Some(shared) = &self.transaction else {
            let Some(connection) = &self.connection else {
                panic!("begin called on a transaction handle with no connection to open one on");
            };
            let tx = connection.begin(options).await?;
            debug!(
                driver = %self.settings.driver_name,
                isolation = ?options.isolation,
                read_only = options.read_only,
                "Transaction started"
            );
            let shared = Arc::new(Mutex::new(Some(tx)));
            return Ok(Handle {
                connection: self.connection.clone(),
                driver: Some(ActiveDriver::Transaction(Arc::clone(&shared))),
                transaction: Some(shared),
                savepoint: None,
                nested: false,
                settings: self.settings.clone(),
            });
        };

        let savepoint = if self.settings.savepoints {
            let id = SavepointId::generate();
            execute_on(shared, &Query::new(id.create_statement())).await?;
            debug!(savepoint = %id, "Savepoint created");
            Some(id)
        } else {
            debug!("Nested scope reuses the current transaction");
            None
        };

        Ok(Handle {
            connection: self.connection.clone(),
            driver: Some(ActiveDriver::Transaction(Arc::clone(shared))),
            transaction: Some(Arc::clone(shared)),
            savepoint,
            nested: true,
            settings: self.settings.clone(),
        })
    }

    /// Commit this scope.
    ///
    /// Releases the savepoint this handle created, commits the real
    /// transaction if this handle owns it, and otherwise only closes the
    /// handle. Database errors are returned unchanged and leave the handle
    /// as it was.
    pub async fn commit(&mut self) -> DbResult<()> {
        let Some(shared) = self.transaction.clone() else {
            return Err(DbError::NotInTransaction);
        };

        if let Some(id) = &self.savepoint {
            execute_on(&shared, &Query::new(id.release_statement())).await?;
            debug!(savepoint = %id, "Savepoint released");
        } else if !self.nested {
            let tx = shared.lock().await.take().ok_or(DbError::TransactionDone)?;
            tx.commit().await?;
            debug!(driver = %self.settings.driver_name, "Transaction committed");
        } else {
            debug!("Nested scope closed; commit deferred to the owning scope");
        }

        self.finish();
        Ok(())
    }

    /// Roll back this scope.
    ///
    /// Calling it on a handle with no active transaction is a no-op, so it is
    /// safe to call after `commit` or twice in a row.
    pub async fn rollback(&mut self) -> DbResult<()> {
        let Some(shared) = self.transaction.clone() else {
            return Ok(());
        };

        match &self.savepoint {
            Some(id) if self.settings.savepoints => {
                execute_on(&shared, &Query::new(id.rollback_statement())).await?;
                debug!(savepoint = %id, "Rolled back to savepoint");
            }
            _ if !self.nested => {
                let tx = shared.lock().await.take().ok_or(DbError::TransactionDone)?;
                tx.rollback().await?;
                debug!(driver = %self.settings.driver_name, "Transaction rolled back");
            }
            _ => debug!("Nested scope closed; rollback deferred to the owning scope"),
        }

        self.finish();
        Ok(())
    }

    /// Run `f` inside a nested scope.
    ///
    /// The scope is committed when `f` succeeds and rolled back when it
    /// fails; the error from `f` is returned even if the rollback fails too.
    pub async fn scope<T, F>(&self, f: F) -> DbResult<T>
    where
        F: for<'h> FnOnce(&'h mut Handle<C>) -> BoxFuture<'h, DbResult<T>>,
    {
        let mut child = self.begin().await?;
        match f(&mut child).await {
            Ok(value) => {
                child.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = child.rollback().await {
                    warn!(error = %rollback_err, "Rollback after failed scope also failed");
                }
                Err(err)
            }
        }
    }

    /// Close the underlying connection.
    ///
    /// Does nothing for handles built from an existing transaction.
    pub async fn close(&self) {
        match &self.connection {
            Some(connection) => connection.close().await,
            None => debug!("Handle has no connection of its own to close"),
        }
    }

    fn finish(&mut self) {
        self.driver = None;
        self.transaction = None;
    }

    fn active_driver(&self) -> &ActiveDriver<C> {
        match &self.driver {
            Some(driver) => driver,
            None => panic!(
                "query forwarded through a closed transaction handle; \
                 handles cannot be used after commit or rollback"
            ),
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn driver_name(&self) -> &str {
        &self.settings.driver_name
    }

    pub fn dialect(&self) -> Option<Dialect> {
        Dialect::from_driver_name(&self.settings.driver_name)
    }

    pub fn savepoints_enabled(&self) -> bool {
        self.settings.savepoints
    }

    /// Identifier of the savepoint this handle created, if any.
    pub fn savepoint_id(&self) -> Option<&str> {
        self.savepoint.as_ref().map(SavepointId::as_str)
    }

    pub fn is_nested(&self) -> bool {
        self.nested
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// True once the handle has no driver left to forward queries to.
    pub fn is_closed(&self) -> bool {
        self.driver.is_none()
    }

    /// The real transaction shared by this handle's chain.
    pub fn transaction(&self) -> Option<SharedTransaction<C::Transaction>> {
        self.transaction.clone()
    }

    // =========================================================================
    // Forwarding
    // =========================================================================
    //
    // # Panics
    //
    // Every method below panics when called on a closed handle.

    /// Run a statement that returns no rows.
    pub async fn execute(&self, query: impl Into<Query>) -> DbResult<ExecResult> {
        let query = query.into();
        forward!(self, |driver| driver.execute(&query))
    }

    /// Fetch every row as a JSON map.
    pub async fn fetch_all(&self, query: impl Into<Query>) -> DbResult<Vec<Row>> {
        let query = query.into();
        forward!(self, |driver| driver.fetch_all(&query))
    }

    /// Fetch the first row, if any.
    pub async fn fetch_optional(&self, query: impl Into<Query>) -> DbResult<Option<Row>> {
        let query = query.into();
        forward!(self, |driver| driver.fetch_optional(&query))
    }

    /// Fetch exactly one row; no row is reported as `sqlx::Error::RowNotFound`.
    pub async fn fetch_one(&self, query: impl Into<Query>) -> DbResult<Row> {
        self.fetch_optional(query)
            .await?
            .ok_or(DbError::Database(sqlx::Error::RowNotFound))
    }

    /// Fetch all rows and scan each into `T` by column name.
    pub async fn fetch_all_as<T: DeserializeOwned>(
        &self,
        query: impl Into<Query>,
    ) -> DbResult<Vec<T>> {
        self.fetch_all(query)
            .await?
            .into_iter()
            .map(scan_row)
            .collect()
    }

    pub async fn fetch_one_as<T: DeserializeOwned>(&self, query: impl Into<Query>) -> DbResult<T> {
        scan_row(self.fetch_one(query).await?)
    }

    pub async fn fetch_optional_as<T: DeserializeOwned>(
        &self,
        query: impl Into<Query>,
    ) -> DbResult<Option<T>> {
        self.fetch_optional(query).await?.map(scan_row).transpose()
    }

    /// Prepare `sql` on the active driver and describe its columns.
    pub async fn prepare(&self, sql: &str) -> DbResult<StatementInfo> {
        forward!(self, |driver| driver.prepare(sql))
    }

    /// Compile `:name` parameters against `arg` for this handle's dialect.
    pub fn bind_named<T: Serialize + ?Sized>(&self, sql: &str, arg: &T) -> DbResult<Query> {
        named::bind_named(self.placeholder_style(), sql, arg)
    }

    pub async fn execute_named<T: Serialize + ?Sized>(
        &self,
        sql: &str,
        arg: &T,
    ) -> DbResult<ExecResult> {
        let query = self.bind_named(sql, arg)?;
        self.execute(query).await
    }

    pub async fn fetch_all_named<T: Serialize + ?Sized>(
        &self,
        sql: &str,
        arg: &T,
    ) -> DbResult<Vec<Row>> {
        let query = self.bind_named(sql, arg)?;
        self.fetch_all(query).await
    }

    /// Rewrite `?` placeholders into this handle's dialect.
    pub fn rebind(&self, sql: &str) -> String {
        named::rebind(self.placeholder_style(), sql)
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        self.dialect()
            .map(|d| d.placeholder_style())
            .unwrap_or(PlaceholderStyle::Question)
    }
}

impl Handle<DbPool> {
    /// Open a pool for `driver_name` on `url` and wrap it as a root handle.
    ///
    /// If an option is rejected the pool is closed before the error is
    /// returned. The pool uses [`PoolOptions`] defaults; a child transaction
    /// pins one pooled connection until it finishes, so the root keeps
    /// forwarding on the others. On SQLite, writes through the root still
    /// wait for the open transaction's write lock.
    pub async fn connect(
        driver_name: &str,
        url: &str,
        options: impl IntoIterator<Item = HandleOption>,
    ) -> DbResult<Self> {
        let options: Vec<HandleOption> = options.into_iter().collect();
        let pool = DbPool::connect(driver_name, url, &PoolOptions::default()).await?;
        Self::open(pool, options).await
    }

    /// Open a pool described by a parsed database URL.
    pub async fn connect_with(config: &ConnectConfig) -> DbResult<Self> {
        let pool = DbPool::connect(
            &config.driver_name,
            &config.connection_string,
            &config.pool_options,
        )
        .await?;
        Self::open(pool, config.options()).await
    }
}

impl<C: Connector> std::fmt::Debug for Handle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("driver_name", &self.settings.driver_name)
            .field("savepoints", &self.settings.savepoints)
            .field("in_transaction", &self.transaction.is_some())
            .field("nested", &self.nested)
            .field("savepoint", &self.savepoint)
            .field("closed", &self.driver.is_none())
            .finish()
    }
}

/// Run a statement on the shared real transaction.
async fn execute_on<T: TransactionDriver>(
    shared: &SharedTransaction<T>,
    query: &Query,
) -> DbResult<ExecResult> {
    let mut guard = shared.lock().await;
    let tx = guard.as_mut().ok_or(DbError::TransactionDone)?;
    tx.execute(query).await
}

fn scan_row<T: DeserializeOwned>(row: Row) -> DbResult<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(row))?)
}
