//! Named-parameter binding and placeholder rebinding.
//!
//! `bind_named` turns `:name` references into the dialect's positional
//! placeholders and collects the matching values from any serializable
//! argument. `rebind` rewrites `?` placeholders for dialects that number
//! them. Quoted strings, quoted identifiers, comments and PostgreSQL `::`
//! casts are left untouched.

use crate::error::{DbError, DbResult};
use crate::models::{PlaceholderStyle, Query, QueryParam};
use serde::Serialize;
use serde_json::Value as JsonValue;

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    Named(&'a str),
    Positional,
}

/// Compile a query with `:name` parameters against a serializable argument.
///
/// `arg` must serialize to a JSON object (a struct or a map). Each reference
/// becomes its own placeholder, so a name used twice is bound twice.
pub fn bind_named<T: Serialize + ?Sized>(
    style: PlaceholderStyle,
    sql: &str,
    arg: &T,
) -> DbResult<Query> {
    let fields = match serde_json::to_value(arg)? {
        JsonValue::Object(map) => map,
        other => {
            return Err(DbError::invalid_input(format!(
                "Named parameters require a struct or map argument, got {}",
                json_kind(&other)
            )));
        }
    };

    let mut compiled = String::with_capacity(sql.len());
    let mut params = Vec::new();
    for segment in segments(sql) {
        match segment {
            Segment::Text(text) => compiled.push_str(text),
            Segment::Positional => compiled.push('?'),
            Segment::Named(name) => {
                let value = fields.get(name).ok_or_else(|| {
                    DbError::invalid_input(format!(
                        "Could not find parameter '{}' in the named argument",
                        name
                    ))
                })?;
                params.push(QueryParam::from_json(value.clone()));
                push_placeholder(&mut compiled, style, params.len());
            }
        }
    }

    Ok(Query {
        sql: compiled,
        params,
        timeout: None,
    })
}

/// Rewrite `?` placeholders into the dialect's positional syntax.
pub fn rebind(style: PlaceholderStyle, sql: &str) -> String {
    if style == PlaceholderStyle::Question {
        return sql.to_string();
    }

    let mut rebound = String::with_capacity(sql.len() + 8);
    let mut position = 0;
    for segment in segments(sql) {
        match segment {
            Segment::Text(text) => rebound.push_str(text),
            Segment::Named(name) => {
                rebound.push(':');
                rebound.push_str(name);
            }
            Segment::Positional => {
                position += 1;
                push_placeholder(&mut rebound, style, position);
            }
        }
    }
    rebound
}

fn push_placeholder(out: &mut String, style: PlaceholderStyle, position: usize) {
    match style {
        PlaceholderStyle::Question => out.push('?'),
        PlaceholderStyle::Dollar => {
            out.push('$');
            out.push_str(&position.to_string());
        }
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Split SQL into verbatim text and parameter references.
///
/// Only ASCII bytes are significant, so slicing at their positions always
/// lands on a char boundary.
fn segments(sql: &str) -> Vec<Segment<'_>> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => i = skip_quoted(bytes, i, quote),
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(bytes.len(), |p| i + p + 1);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = bytes[i + 2..]
                    .windows(2)
                    .position(|w| w == b"*/")
                    .map_or(bytes.len(), |p| i + 2 + p + 2);
            }
            b':' if bytes.get(i + 1) == Some(&b':') => i += 2,
            b':' if bytes
                .get(i + 1)
                .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') =>
            {
                if start < i {
                    out.push(Segment::Text(&sql[start..i]));
                }
                let name_start = i + 1;
                let mut end = name_start;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                out.push(Segment::Named(&sql[name_start..end]));
                start = end;
                i = end;
            }
            b'?' => {
                if start < i {
                    out.push(Segment::Text(&sql[start..i]));
                }
                out.push(Segment::Positional);
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }

    if start < bytes.len() {
        out.push(Segment::Text(&sql[start..]));
    }
    out
}

/// Return the index just past the closing quote. A doubled quote is an
/// escaped quote; an unterminated literal runs to the end of the input.
fn skip_quoted(bytes: &[u8], open: usize, quote: u8) -> usize {
    let mut j = open + 1;
    while j < bytes.len() {
        if bytes[j] == quote {
            if bytes.get(j + 1) == Some(&quote) {
                j += 2;
                continue;
            }
            return j + 1;
        }
        j += 1;
    }
    bytes.len()
}
