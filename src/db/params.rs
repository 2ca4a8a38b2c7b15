//! Parameter binding for sqlx queries.
//!
//! Each backend gets one binder that turns a [`QueryParam`] into the
//! matching sqlx argument. Values are borrowed from the caller's [`Query`]
//! so binding never copies strings or byte buffers.
//!
//! [`Query`]: crate::models::Query

use crate::models::QueryParam;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::query::Query as SqlxQuery;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{Encode, MySql, Postgres, Sqlite, Type};

/// A PostgreSQL NULL sent with an unspecified parameter type.
///
/// The server infers the type from the statement, so the same NULL can land
/// in a BIGINT, TIMESTAMP or TEXT column.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        // OID 0 leaves the parameter type to the server.
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

macro_rules! param_binder {
    (
        $(#[$doc:meta])* $name:ident<$q:lifetime>, $db:ty, $args:ty,
        null => $null:expr,
        |$json:ident| $bind_json:expr
    ) => {
        $(#[$doc])*
        pub(crate) fn $name<$q>(
            query: SqlxQuery<$q, $db, $args>,
            param: &$q QueryParam,
        ) -> SqlxQuery<$q, $db, $args> {
            match param {
                QueryParam::Null => query.bind($null),
                QueryParam::Bool(v) => query.bind(*v),
                QueryParam::Int(v) => query.bind(*v),
                QueryParam::Float(v) => query.bind(*v),
                QueryParam::String(v) => query.bind(v.as_str()),
                QueryParam::Bytes(v) => query.bind(v.as_slice()),
                QueryParam::Json($json) => query.bind($bind_json),
            }
        }
    };
}

param_binder!(
    /// Bind a parameter to a MySQL query.
    bind_mysql_param<'q>, MySql, MySqlArguments,
    null => None::<String>,
    |v| Json(v)
);

param_binder!(
    /// Bind a parameter to a PostgreSQL query.
    bind_postgres_param<'q>, Postgres, PgArguments,
    null => UntypedNull,
    |v| Json(v)
);

param_binder!(
    /// Bind a parameter to a SQLite query. SQLite has no JSON column type, so
    /// JSON values are stored as text.
    bind_sqlite_param<'q>, Sqlite, SqliteArguments<'q>,
    null => None::<String>,
    |v| v.to_string()
);
