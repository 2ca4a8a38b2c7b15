//! Row decoding into JSON maps.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! Columns whose type cannot be classified (SQLite expressions, for example)
//! fall back to trying text, integer, float and binary in turn.
//!
//! Temporal values are rendered the way chrono serializes them, so a row can
//! be scanned straight back into a struct with `chrono` fields.

use crate::models::{ColumnInfo, Dialect, Row as JsonRow};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::error::BoxDynError;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    /// DATE, TIME, DATETIME and TIMESTAMP[TZ]
    DateTime,
    Uuid,
    Text,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, dialect: Dialect) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if dialect == Dialect::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }
    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }
    if lower.starts_with("timestamp") || matches!(lower.as_str(), "date" | "time" | "datetime") {
        return TypeCategory::DateTime;
    }
    if lower == "uuid" {
        return TypeCategory::Uuid;
    }
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }
    if lower.contains("char") || lower.contains("text") {
        return TypeCategory::Text;
    }
    TypeCategory::Unknown
}

/// Encode binary column data as base64.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => numeric_to_string(value.as_bytes()?).map(RawDecimal),
        }
    }
}

/// Render PostgreSQL's binary NUMERIC encoding as decimal text.
///
/// The layout is `ndigits, weight, sign, dscale` (16 bits each) followed by
/// `ndigits` base-10000 digits, most significant first.
fn numeric_to_string(buf: &[u8]) -> Result<String, BoxDynError> {
    let word = |i: usize| -> Result<i16, BoxDynError> {
        buf.get(i * 2..i * 2 + 2)
            .map(|b| i16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = usize::try_from(word(0)?).map_err(|_| "negative NUMERIC digit count")?;
    let weight = i32::from(word(1)?);
    let sign = word(2)? as u16;
    let dscale = usize::try_from(word(3)?).map_err(|_| "negative NUMERIC scale")?;

    match sign {
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<Result<Vec<_>, _>>()?;
    let digit = |group: i32| -> i16 {
        usize::try_from(group)
            .ok()
            .and_then(|g| digits.get(g).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit(0).to_string());
        for group in 1..=weight {
            out.push_str(&format!("{:04}", digit(group)));
        }
    }
    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut group = weight + 1;
        while frac.len() < dscale {
            frac.push_str(&format!("{:04}", digit(group)));
            group += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Ok(out)
}

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> JsonRow;
    fn column_info(&self) -> Vec<ColumnInfo>;
}

macro_rules! impl_row_to_json {
    ($row:ty, $dialect:expr, $decoder:path) => {
        impl RowToJson for $row {
            fn to_json_map(&self) -> JsonRow {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let category = categorize_type(col.type_info().name(), $dialect);
                        (col.name().to_string(), $decoder(self, idx, category))
                    })
                    .collect()
            }

            fn column_info(&self) -> Vec<ColumnInfo> {
                self.columns()
                    .iter()
                    .map(|col| ColumnInfo {
                        name: col.name().to_string(),
                        type_name: col.type_info().name().to_string(),
                    })
                    .collect()
            }
        }
    };
}

impl_row_to_json!(MySqlRow, Dialect::MySQL, mysql::decode_column);
impl_row_to_json!(PgRow, Dialect::PostgreSQL, postgres::decode_column);
impl_row_to_json!(SqliteRow, Dialect::SQLite, sqlite::decode_column);

/// Decode a nullable column as `T`.
///
/// `None` means the column is not compatible with `T`; `Some(None)` is SQL NULL.
fn get<'r, R, T>(row: &'r R, idx: usize) -> Option<Option<T>>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx).ok()
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn serialized<T: Serialize>(value: Option<T>) -> JsonValue {
    value
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(JsonValue::Null)
}

/// Decode a DATE, TIME, DATETIME or TIMESTAMP column.
///
/// DATETIME and TIMESTAMP keep the stored wall-clock value; TIMESTAMPTZ and
/// MySQL TIMESTAMP come out as RFC 3339 in UTC.
fn decode_temporal<R>(row: &R, idx: usize) -> JsonValue
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> DateTime<Utc>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveTime: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
{
    if let Some(v) = get::<R, NaiveDateTime>(row, idx) {
        return serialized(v);
    }
    if let Some(v) = get::<R, DateTime<Utc>>(row, idx) {
        return serialized(v);
    }
    if let Some(v) = get::<R, NaiveDate>(row, idx) {
        return serialized(v);
    }
    if let Some(v) = get::<R, NaiveTime>(row, idx) {
        return serialized(v);
    }
    // TIMETZ and friends
    get::<R, String>(row, idx)
        .flatten()
        .map(JsonValue::String)
        .unwrap_or(JsonValue::Null)
}

/// Decode a column that could not be classified by its type name.
fn decode_untyped<R>(row: &R, idx: usize) -> JsonValue
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
{
    if let Some(v) = get::<R, String>(row, idx) {
        return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
    }
    if let Some(v) = get::<R, i64>(row, idx) {
        return v.map(|v| JsonValue::Number(v.into())).unwrap_or(JsonValue::Null);
    }
    if let Some(v) = get::<R, f64>(row, idx) {
        return v.map(float_value).unwrap_or(JsonValue::Null);
    }
    if let Some(v) = get::<R, Vec<u8>>(row, idx) {
        return v.map(|b| encode_binary(&b)).unwrap_or(JsonValue::Null);
    }
    JsonValue::Null
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => match get::<_, RawDecimal>(row, idx) {
                Some(Some(v)) => JsonValue::String(v.0),
                _ => JsonValue::Null,
            },
            TypeCategory::Integer => {
                if let Some(v) = get::<_, i64>(row, idx) {
                    return v.map(|v| JsonValue::Number(v.into())).unwrap_or(JsonValue::Null);
                }
                // BIGINT UNSIGNED and friends
                get::<_, u64>(row, idx)
                    .flatten()
                    .map(|v| JsonValue::Number(v.into()))
                    .unwrap_or(JsonValue::Null)
            }
            TypeCategory::Boolean => get::<_, bool>(row, idx)
                .flatten()
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float => {
                if let Some(v) = get::<_, f64>(row, idx) {
                    return v.map(float_value).unwrap_or(JsonValue::Null);
                }
                get::<_, f32>(row, idx)
                    .flatten()
                    .map(|v| float_value(v as f64))
                    .unwrap_or(JsonValue::Null)
            }
            TypeCategory::Json => get::<_, JsonValue>(row, idx)
                .flatten()
                .unwrap_or(JsonValue::Null),
            TypeCategory::Binary => get::<_, Vec<u8>>(row, idx)
                .flatten()
                .map(|v| encode_binary(&v))
                .unwrap_or(JsonValue::Null),
            TypeCategory::DateTime => decode_temporal(row, idx),
            TypeCategory::Uuid | TypeCategory::Text | TypeCategory::Unknown => {
                decode_untyped(row, idx)
            }
        }
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => {
                if let Some(v) = get::<_, i64>(row, idx) {
                    return v.map(|v| JsonValue::Number(v.into())).unwrap_or(JsonValue::Null);
                }
                if let Some(v) = get::<_, i32>(row, idx) {
                    return v.map(|v| JsonValue::Number(v.into())).unwrap_or(JsonValue::Null);
                }
                get::<_, i16>(row, idx)
                    .flatten()
                    .map(|v| JsonValue::Number(v.into()))
                    .unwrap_or(JsonValue::Null)
            }
            TypeCategory::Boolean => get::<_, bool>(row, idx)
                .flatten()
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float => {
                if let Some(v) = get::<_, f64>(row, idx) {
                    return v.map(float_value).unwrap_or(JsonValue::Null);
                }
                get::<_, f32>(row, idx)
                    .flatten()
                    .map(|v| float_value(v as f64))
                    .unwrap_or(JsonValue::Null)
            }
            TypeCategory::Json => get::<_, JsonValue>(row, idx)
                .flatten()
                .unwrap_or(JsonValue::Null),
            TypeCategory::Binary => get::<_, Vec<u8>>(row, idx)
                .flatten()
                .map(|v| encode_binary(&v))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Decimal => match get::<_, RawDecimal>(row, idx) {
                Some(Some(v)) => JsonValue::String(v.0),
                Some(None) => JsonValue::Null,
                None => {
                    tracing::error!(column = idx, "Failed to decode NUMERIC");
                    JsonValue::Null
                }
            },
            TypeCategory::DateTime => decode_temporal(row, idx),
            TypeCategory::Uuid => get::<_, uuid::Uuid>(row, idx)
                .flatten()
                .map(|v| JsonValue::String(v.to_string()))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Text | TypeCategory::Unknown => decode_untyped(row, idx),
        }
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => get::<_, i64>(row, idx)
                .flatten()
                .map(|v| JsonValue::Number(v.into()))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Boolean => get::<_, bool>(row, idx)
                .flatten()
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float | TypeCategory::Decimal => get::<_, f64>(row, idx)
                .flatten()
                .map(float_value)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Binary => get::<_, Vec<u8>>(row, idx)
                .flatten()
                .map(|v| encode_binary(&v))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Json => match get::<_, String>(row, idx).flatten() {
                Some(text) => serde_json::from_str(&text).unwrap_or(JsonValue::String(text)),
                None => JsonValue::Null,
            },
            // SQLite keeps dates as text or numbers; return them as stored.
            TypeCategory::DateTime
            | TypeCategory::Uuid
            | TypeCategory::Text
            | TypeCategory::Unknown => decode_untyped(row, idx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", Dialect::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT", Dialect::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("TINYINT", Dialect::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INTEGER", Dialect::SQLite),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", Dialect::MySQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", Dialect::PostgreSQL),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("NUMERIC", Dialect::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_other() {
        assert_eq!(
            categorize_type("jsonb", Dialect::PostgreSQL),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("BYTEA", Dialect::PostgreSQL),
            TypeCategory::Binary
        );
        assert_eq!(
            categorize_type("VARCHAR", Dialect::MySQL),
            TypeCategory::Text
        );
        assert_eq!(categorize_type("NULL", Dialect::SQLite), TypeCategory::Unknown);
    }

    #[test]
    fn test_categorize_type_temporal_and_uuid() {
        for name in ["TIMESTAMPTZ", "TIMESTAMP", "DATE", "TIME"] {
            assert_eq!(
                categorize_type(name, Dialect::PostgreSQL),
                TypeCategory::DateTime,
                "{name}"
            );
        }
        assert_eq!(
            categorize_type("DATETIME", Dialect::MySQL),
            TypeCategory::DateTime
        );
        assert_eq!(
            categorize_type("UUID", Dialect::PostgreSQL),
            TypeCategory::Uuid
        );
    }

    fn numeric_bytes(weight: i16, sign: u16, dscale: i16, digits: &[i16]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(digits.len() as i16).to_be_bytes());
        buf.extend_from_slice(&weight.to_be_bytes());
        buf.extend_from_slice(&sign.to_be_bytes());
        buf.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            buf.extend_from_slice(&d.to_be_bytes());
        }
        buf
    }

    #[test]
    fn test_numeric_to_string() {
        let cases = [
            (numeric_bytes(0, 0, 1, &[1, 5000]), "1.5"),
            (numeric_bytes(1, 0, 3, &[1, 2345, 6780]), "12345.678"),
            (numeric_bytes(-1, 0, 4, &[1]), "0.0001"),
            (numeric_bytes(-1, 0x4000, 1, &[5000]), "-0.5"),
            (numeric_bytes(2, 0, 0, &[42]), "4200000000"),
            (numeric_bytes(0, 0, 2, &[]), "0.00"),
            (numeric_bytes(0, 0xC000, 0, &[]), "NaN"),
        ];
        for (bytes, expected) in cases {
            assert_eq!(numeric_to_string(&bytes).unwrap(), expected);
        }
        assert!(numeric_to_string(&[0, 1, 0]).is_err());
    }

    #[test]
    fn test_encode_binary() {
        assert_eq!(
            encode_binary(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(encode_binary(&[]), JsonValue::String(String::new()));
    }

    #[test]
    fn test_float_value_non_finite() {
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".to_string()));
        assert_eq!(float_value(2.5), serde_json::json!(2.5));
    }
}
