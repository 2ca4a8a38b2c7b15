//! The query capability a handle forwards to.
//!
//! A root connection and a real transaction expose the same query surface
//! ([`Executor`]). They differ in what they can do next: a [`Connector`]
//! opens real transactions, a [`TransactionDriver`] finishes one. The sqlx
//! implementations live in [`crate::db`].

use crate::error::DbResult;
use crate::models::{ExecResult, Query, Row, StatementInfo, TxOptions};
use std::future::Future;

/// Statement execution shared by connections and transactions.
pub trait Executor: Send {
    /// Name of the driver, used to validate savepoint support.
    fn driver_name(&self) -> &str;

    /// Run a statement that returns no rows.
    fn execute(&mut self, query: &Query) -> impl Future<Output = DbResult<ExecResult>> + Send;

    fn fetch_all(&mut self, query: &Query) -> impl Future<Output = DbResult<Vec<Row>>> + Send;

    /// Fetch at most one row.
    fn fetch_optional(
        &mut self,
        query: &Query,
    ) -> impl Future<Output = DbResult<Option<Row>>> + Send;

    /// Prepare a statement on the server and describe it.
    fn prepare(&mut self, sql: &str) -> impl Future<Output = DbResult<StatementInfo>> + Send;
}

/// A connection (or pool) that can open real transactions.
///
/// Connectors are cheap to clone; every handle in a chain keeps its own copy.
pub trait Connector: Executor + Clone + Sync + 'static {
    type Transaction: TransactionDriver;

    fn begin(
        &self,
        options: &TxOptions,
    ) -> impl Future<Output = DbResult<Self::Transaction>> + Send;

    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// An open real transaction.
pub trait TransactionDriver: Executor + 'static {
    fn commit(self) -> impl Future<Output = DbResult<()>> + Send;

    fn rollback(self) -> impl Future<Output = DbResult<()>> + Send;
}
