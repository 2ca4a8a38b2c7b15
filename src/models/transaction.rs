//! Options for opening a real transaction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transaction isolation levels understood by the supported dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Options used when a `begin` call opens the real transaction.
///
/// Nested scopes reuse the outer transaction and ignore these options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: Option<IsolationLevel>,
    pub read_only: bool,
    /// Upper bound for the BEGIN round trip.
    pub timeout: Option<Duration>,
}

impl TxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = Some(isolation);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// True when the driver's plain BEGIN is enough.
    pub fn is_default_mode(&self) -> bool {
        self.isolation.is_none() && !self.read_only
    }
}
