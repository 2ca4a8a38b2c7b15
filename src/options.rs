//! Construction options for root handles.
//!
//! Options are applied in order against the driver the handle wraps. The
//! first option that fails aborts construction.

use crate::error::{DbError, DbResult};
use crate::models::supports_savepoints;
use tracing::warn;

/// A configuration option for a root handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOption {
    /// Use savepoints for nested scopes. Enabling it requires a driver from
    /// [`Dialect::SAVEPOINT_DRIVERS`](crate::models::Dialect::SAVEPOINT_DRIVERS).
    SavePoint(bool),
}

impl HandleOption {
    pub(crate) fn apply(&self, settings: &mut Settings) -> DbResult<()> {
        match *self {
            HandleOption::SavePoint(enabled) => {
                if enabled && !supports_savepoints(&settings.driver_name) {
                    warn!(
                        driver = %settings.driver_name,
                        "Savepoints requested for a driver without savepoint support"
                    );
                    return Err(DbError::incompatible_option(
                        self.to_string(),
                        settings.driver_name.clone(),
                    ));
                }
                settings.savepoints = enabled;
                Ok(())
            }
        }
    }
}

impl std::fmt::Display for HandleOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleOption::SavePoint(enabled) => write!(f, "SavePoint({})", enabled),
        }
    }
}

/// Settings fixed when a root handle is built and inherited by every
/// descendant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub driver_name: String,
    pub savepoints: bool,
}

impl Settings {
    /// Build settings for a driver and apply `options` in order.
    pub(crate) fn resolve(
        driver_name: impl Into<String>,
        options: impl IntoIterator<Item = HandleOption>,
    ) -> DbResult<Self> {
        let mut settings = Settings {
            driver_name: driver_name.into(),
            savepoints: false,
        };
        for option in options {
            option.apply(&mut settings)?;
        }
        Ok(settings)
    }
}
