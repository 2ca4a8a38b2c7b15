//! A recording driver for statement-sequence tests.
//!
//! Every statement that reaches the mock is appended to a shared log.
//! Statements run on a real transaction are logged verbatim (including the
//! synthetic `BEGIN`, `COMMIT` and `ROLLBACK`); statements run directly on the
//! connection are logged with a `conn: ` prefix.

#![allow(dead_code)]

use db_nested_tx::models::{ExecResult, Query, Row, StatementInfo, TxOptions};
use db_nested_tx::{Connector, DbError, DbResult, Executor, TransactionDriver};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct State {
    log: Vec<String>,
    /// One-shot failures, matched by statement prefix.
    failures: Vec<String>,
    begun: usize,
    closed: bool,
}

impl State {
    fn run(&mut self, statement: String) -> DbResult<()> {
        if let Some(pos) = self
            .failures
            .iter()
            .position(|prefix| statement.starts_with(prefix.as_str()))
        {
            self.failures.remove(pos);
            return Err(DbError::Database(sqlx::Error::Protocol(format!(
                "injected failure: {}",
                statement
            ))));
        }
        self.log.push(statement);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MockConnector {
    driver_name: String,
    state: Arc<Mutex<State>>,
}

impl MockConnector {
    pub fn new(driver_name: &str) -> Self {
        Self {
            driver_name: driver_name.to_string(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().unwrap().log.clear();
    }

    /// Make the next statement starting with `prefix` fail.
    pub fn fail_next(&self, prefix: &str) {
        self.state.lock().unwrap().failures.push(prefix.to_string());
    }

    /// Number of real transactions opened so far.
    pub fn transactions_begun(&self) -> usize {
        self.state.lock().unwrap().begun
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Build a transaction directly, as if it had been opened elsewhere.
    pub fn open_transaction(&self) -> MockTransaction {
        MockTransaction {
            driver_name: self.driver_name.clone(),
            state: Arc::clone(&self.state),
        }
    }

    fn run(&self, sql: &str) -> DbResult<()> {
        self.state.lock().unwrap().run(format!("conn: {}", sql))
    }
}

fn row(via: &str, sql: &str) -> Row {
    match json!({ "via": via, "sql": sql }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

impl Executor for MockConnector {
    fn driver_name(&self) -> &str {
        &self.driver_name
    }

    async fn execute(&mut self, query: &Query) -> DbResult<ExecResult> {
        self.run(&query.sql)?;
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        })
    }

    async fn fetch_all(&mut self, query: &Query) -> DbResult<Vec<Row>> {
        self.run(&query.sql)?;
        Ok(vec![row("connection", &query.sql)])
    }

    async fn fetch_optional(&mut self, query: &Query) -> DbResult<Option<Row>> {
        self.run(&query.sql)?;
        Ok(Some(row("connection", &query.sql)))
    }

    async fn prepare(&mut self, sql: &str) -> DbResult<StatementInfo> {
        self.run(&format!("PREPARE {}", sql))?;
        Ok(StatementInfo {
            sql: sql.to_string(),
            columns: Vec::new(),
            parameters: Some(0),
        })
    }
}

impl Connector for MockConnector {
    type Transaction = MockTransaction;

    async fn begin(&self, _options: &TxOptions) -> DbResult<MockTransaction> {
        let mut state = self.state.lock().unwrap();
        state.run("BEGIN".to_string())?;
        state.begun += 1;
        drop(state);
        Ok(self.open_transaction())
    }

    async fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }
}

#[derive(Debug)]
pub struct MockTransaction {
    driver_name: String,
    state: Arc<Mutex<State>>,
}

impl MockTransaction {
    fn run(&self, sql: &str) -> DbResult<()> {
        self.state.lock().unwrap().run(sql.to_string())
    }
}

impl Executor for MockTransaction {
    fn driver_name(&self) -> &str {
        &self.driver_name
    }

    async fn execute(&mut self, query: &Query) -> DbResult<ExecResult> {
        self.run(&query.sql)?;
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        })
    }

    async fn fetch_all(&mut self, query: &Query) -> DbResult<Vec<Row>> {
        self.run(&query.sql)?;
        Ok(vec![row("transaction", &query.sql)])
    }

    async fn fetch_optional(&mut self, query: &Query) -> DbResult<Option<Row>> {
        self.run(&query.sql)?;
        Ok(Some(row("transaction", &query.sql)))
    }

    async fn prepare(&mut self, sql: &str) -> DbResult<StatementInfo> {
        self.run(&format!("PREPARE {}", sql))?;
        Ok(StatementInfo {
            sql: sql.to_string(),
            columns: Vec::new(),
            parameters: Some(0),
        })
    }
}

impl TransactionDriver for MockTransaction {
    async fn commit(self) -> DbResult<()> {
        self.run("COMMIT")
    }

    async fn rollback(self) -> DbResult<()> {
        self.run("ROLLBACK")
    }
}

/// Extract the savepoint id from a `SAVEPOINT <id>` log entry.
pub fn savepoint_id(entry: &str) -> &str {
    entry
        .strip_prefix("SAVEPOINT ")
        .unwrap_or_else(|| panic!("not a SAVEPOINT statement: {entry}"))
}

/// True if `id` matches `sp_[A-Za-z0-9_]+`.
pub fn is_valid_savepoint_id(id: &str) -> bool {
    id.strip_prefix("sp_").is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}
