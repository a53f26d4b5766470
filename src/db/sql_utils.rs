// =====================================================
// SQL UTILITIES
// Identifier quoting, dynamic binds, row conversion
// =====================================================

use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row};

/// Quotes an identifier for interpolation into statement text. Identifiers
/// (unlike values) cannot always be passed as query arguments.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Binds a JSON value with the closest Postgres type. Objects and arrays go
/// through as jsonb.
pub fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64())
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.clone()),
    }
}

/// Best-effort conversion of one result cell to JSON, probing the common
/// Postgres types in order.
pub fn row_value(row: &PgRow, index: usize) -> Value {
    row.try_get_unchecked::<i64, _>(index)
        .map(|v| serde_json::json!(v))
        .or_else(|_| {
            row.try_get_unchecked::<i32, _>(index)
                .map(|v| serde_json::json!(v))
        })
        .or_else(|_| {
            row.try_get_unchecked::<i16, _>(index)
                .map(|v| serde_json::json!(v))
        })
        .or_else(|_| {
            row.try_get_unchecked::<f64, _>(index)
                .map(|v| serde_json::json!(v))
        })
        .or_else(|_| {
            row.try_get_unchecked::<f32, _>(index)
                .map(|v| serde_json::json!(v))
        })
        .or_else(|_| {
            row.try_get_unchecked::<bool, _>(index)
                .map(|v| serde_json::json!(v))
        })
        .or_else(|_| {
            row.try_get_unchecked::<chrono::DateTime<chrono::Utc>, _>(index)
                .map(|v| serde_json::json!(v.to_rfc3339()))
        })
        .or_else(|_| {
            row.try_get_unchecked::<chrono::NaiveDateTime, _>(index)
                .map(|v| serde_json::json!(v.to_string()))
        })
        .or_else(|_| {
            row.try_get_unchecked::<chrono::NaiveDate, _>(index)
                .map(|v| serde_json::json!(v.to_string()))
        })
        .or_else(|_| {
            row.try_get_unchecked::<String, _>(index)
                .map(|v| serde_json::json!(v))
        })
        .or_else(|_| {
            row.try_get_unchecked::<Vec<u8>, _>(index)
                .map(|bytes| serde_json::json!(String::from_utf8_lossy(&bytes).to_string()))
        })
        .unwrap_or(Value::Null)
}

/// Converts a result row to a JSON object, preserving column order.
pub fn row_to_object(row: &PgRow) -> Map<String, Value> {
    let mut object = Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_string(), row_value(row, index));
    }
    object
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_wraps_in_double_quotes() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
    }

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_ident("a\"\"b"), "\"a\"\"\"\"b\"");
    }
}
