//! Data models shared by handles and drivers.

pub mod connection;
pub mod query;
pub mod transaction;

// Re-export commonly used types
pub use connection::{Dialect, PlaceholderStyle, supports_savepoints};
pub use query::{ColumnInfo, ExecResult, Query, QueryParam, Row, StatementInfo};
pub use transaction::{IsolationLevel, TxOptions};
