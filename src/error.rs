//! Error types for nested transaction handles.
//!
//! Errors raised by the database driver are carried unchanged in
//! [`DbError::Database`] so callers can inspect dialect-specific codes.
//! The remaining variants describe misuse of the transaction state machine
//! or problems detected before any SQL reaches the server.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// `commit` was called on a handle that holds no real transaction.
    #[error("not in transaction")]
    NotInTransaction,

    /// A configuration option cannot be honoured by the selected driver.
    #[error("incompatible option: {option} is not supported by driver '{driver}'")]
    IncompatibleOption { option: String, driver: String },

    /// Failure reported by the underlying driver, forwarded as is.
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// The shared real transaction has already been committed or rolled back
    /// by the handle that owns it.
    #[error("transaction has already been committed or rolled back")]
    TransactionDone,

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A row could not be scanned into the requested type.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl DbError {
    /// Create an incompatible option error.
    pub fn incompatible_option(option: impl Into<String>, driver: impl Into<String>) -> Self {
        Self::IncompatibleOption {
            option: option.into(),
            driver: driver.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn is_not_in_transaction(&self) -> bool {
        matches!(self, Self::NotInTransaction)
    }

    pub fn is_incompatible_option(&self) -> bool {
        matches!(self, Self::IncompatibleOption { .. })
    }

    /// Get the server-side error, if the driver reported one.
    pub fn as_database_error(&self) -> Option<&dyn sqlx::error::DatabaseError> {
        match self {
            Self::Database(err) => err.as_database_error(),
            _ => None,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
