//! Database abstraction layer.
//!
//! This module provides the sqlx-backed connection and transaction types a
//! handle runs on:
//! - Connection pool management
//! - Real transactions and their BEGIN statements
//! - Query execution
//! - Type mappings
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod executor;
pub mod params;
pub mod pool;
pub mod transaction;
pub mod types;

pub use pool::DbPool;
pub use transaction::DbTransaction;
