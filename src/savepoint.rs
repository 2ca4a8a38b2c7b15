//! Savepoint identifiers.
//!
//! Identifiers are `sp_` followed by the 32 hex digits of a random v4 UUID.
//! The prefix keeps the identifier from starting with a digit and the simple
//! UUID form carries no hyphens, so the result is a legal unquoted identifier
//! in every supported dialect.

use crate::error::{DbError, DbResult};

/// Fixed prefix of every generated identifier.
pub const SAVEPOINT_PREFIX: &str = "sp_";

/// Name of a savepoint created inside a real transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SavepointId(String);

impl SavepointId {
    /// Generate a fresh identifier from the OS random source.
    pub fn generate() -> Self {
        Self(format!(
            "{}{}",
            SAVEPOINT_PREFIX,
            uuid::Uuid::new_v4().simple()
        ))
    }

    /// Validate an externally supplied identifier against `sp_[A-Za-z0-9_]+`.
    pub fn parse(id: &str) -> DbResult<Self> {
        let valid = id
            .strip_prefix(SAVEPOINT_PREFIX)
            .is_some_and(|rest| {
                !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
        if !valid {
            return Err(DbError::invalid_input(format!(
                "Invalid savepoint identifier: {}",
                id
            )));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn create_statement(&self) -> String {
        format!("SAVEPOINT {}", self.0)
    }

    pub fn release_statement(&self) -> String {
        format!("RELEASE SAVEPOINT {}", self.0)
    }

    pub fn rollback_statement(&self) -> String {
        format!("ROLLBACK TO SAVEPOINT {}", self.0)
    }
}

impl std::fmt::Display for SavepointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SavepointId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
