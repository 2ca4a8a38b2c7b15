//! Query-related data models.
//!
//! This module defines the statement, parameter and result types that flow
//! through a handle to the active driver.

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// A decoded result row, keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Structured value bound as the dialect's JSON type
    Json(JsonValue),
}

impl QueryParam {
    /// Map a JSON value onto the closest scalar parameter.
    ///
    /// Arrays and objects are kept as [`QueryParam::Json`].
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(v) => Self::Bool(v),
            JsonValue::Number(n) => match n.as_i64() {
                Some(v) => Self::Int(v),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Json(JsonValue::Number(n))),
            },
            JsonValue::String(v) => Self::String(v),
            other => Self::Json(other),
        }
    }
}

macro_rules! impl_param_from {
    ($($ty:ty => |$v:ident| $body:expr),+ $(,)?) => {
        $(
            impl From<$ty> for QueryParam {
                fn from($v: $ty) -> Self {
                    $body
                }
            }
        )+
    };
}

impl_param_from! {
    bool => |v| QueryParam::Bool(v),
    i16 => |v| QueryParam::Int(v.into()),
    i32 => |v| QueryParam::Int(v.into()),
    i64 => |v| QueryParam::Int(v),
    u32 => |v| QueryParam::Int(v.into()),
    f32 => |v| QueryParam::Float(v.into()),
    f64 => |v| QueryParam::Float(v),
    &str => |v| QueryParam::String(v.to_string()),
    String => |v| QueryParam::String(v),
    &[u8] => |v| QueryParam::Bytes(v.to_vec()),
    Vec<u8> => |v| QueryParam::Bytes(v),
    JsonValue => |v| QueryParam::Json(v),
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(QueryParam::Null)
    }
}

/// A statement with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<QueryParam>,
    /// Upper bound for the round trip; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            timeout: None,
        }
    }

    /// Append a positional parameter.
    pub fn bind(mut self, param: impl Into<QueryParam>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Query::new(sql)
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Query::new(sql)
    }
}

impl From<&Query> for Query {
    fn from(query: &Query) -> Self {
        query.clone()
    }
}

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Populated by MySQL and SQLite; PostgreSQL reports none.
    pub last_insert_id: Option<i64>,
}

/// Column metadata reported by a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
}

/// Description of a statement prepared on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementInfo {
    pub sql: String,
    pub columns: Vec<ColumnInfo>,
    /// Number of parameters, when the driver can tell.
    pub parameters: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_builder() {
        let query = Query::new("SELECT * FROM users WHERE id = ? AND name = ?")
            .bind(42)
            .bind("alice")
            .with_timeout(Duration::from_secs(3));
        assert_eq!(
            query.params,
            vec![QueryParam::Int(42), QueryParam::String("alice".to_string())]
        );
        assert_eq!(query.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_query_from_str() {
        let query: Query = "DELETE FROM sessions".into();
        assert_eq!(query.sql, "DELETE FROM sessions");
        assert!(query.params.is_empty());
        assert!(query.timeout.is_none());
    }

    #[test]
    fn test_option_param() {
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(QueryParam::from(Some("x")), QueryParam::String("x".to_string()));
    }

    #[test]
    fn test_param_from_json() {
        assert_eq!(QueryParam::from_json(json!(null)), QueryParam::Null);
        assert_eq!(QueryParam::from_json(json!(7)), QueryParam::Int(7));
        assert_eq!(QueryParam::from_json(json!(1.5)), QueryParam::Float(1.5));
        assert_eq!(QueryParam::from_json(json!(true)), QueryParam::Bool(true));
        assert_eq!(
            QueryParam::from_json(json!({"a": 1})),
            QueryParam::Json(json!({"a": 1}))
        );
    }
}
