//! Connection-related data models.
//!
//! This module defines the SQL dialects the crate recognises and the table of
//! driver names known to support `SAVEPOINT` syntax.

use serde::{Deserialize, Serialize};

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

/// Placeholder syntax used for positional parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`
    Question,
    /// `$1`, `$2`, ...
    Dollar,
}

impl Dialect {
    /// Driver names accepted for savepoint-based nesting, with the dialect
    /// each one maps to. Extend this table to whitelist another driver.
    pub const SAVEPOINT_DRIVERS: &'static [(&'static str, Dialect)] = &[
        ("postgres", Dialect::PostgreSQL),
        ("postgresql", Dialect::PostgreSQL),
        ("pgx", Dialect::PostgreSQL),
        ("pgx/v5", Dialect::PostgreSQL),
        ("mysql", Dialect::MySQL),
        ("mariadb", Dialect::MySQL),
        ("sqlite", Dialect::SQLite),
        ("sqlite3", Dialect::SQLite),
    ];

    /// Resolve a driver name (case-insensitive) to a dialect.
    pub fn from_driver_name(driver_name: &str) -> Option<Self> {
        let lower = driver_name.trim().to_ascii_lowercase();
        Self::SAVEPOINT_DRIVERS
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, dialect)| *dialect)
    }

    /// Canonical driver name reported by connections of this dialect.
    pub fn driver_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgres",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    pub fn placeholder_style(&self) -> PlaceholderStyle {
        match self {
            Self::PostgreSQL => PlaceholderStyle::Dollar,
            Self::MySQL | Self::SQLite => PlaceholderStyle::Question,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Check whether a driver name belongs to a savepoint-capable dialect.
pub fn supports_savepoints(driver_name: &str) -> bool {
    Dialect::from_driver_name(driver_name).is_some()
}
