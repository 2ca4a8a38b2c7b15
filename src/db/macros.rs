//! Database dispatch macros for reducing code duplication.
//!
//! `DbPool` and `DbTransaction` carry one variant per backend. These macros
//! expand to the matching `match` so each operation reads as one line per
//! backend.

/// Macro for generating dispatch match arms over a backend enum in
/// `crate::db`.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(DbPool, pool, {
///     MySql(p) => do_mysql(p),
///     Postgres(p) => do_postgres(p),
///     SQLite(p) => do_sqlite(p),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($enum:ident, $value:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $value {
            $(
                $crate::db::$enum::$variant($p) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
