use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};
use tokio_postgres::SimpleQueryMessage;

/// Normalizes a simple-query result to a list of column-name → value objects.
/// Statements that produce no row set (DDL, UPDATE, ...) normalize to an
/// empty list.
pub fn normalize(messages: Vec<SimpleQueryMessage>) -> Vec<Value> {
    let mut rows = Vec::new();

    for message in messages {
        if let SimpleQueryMessage::Row(row) = message {
            let mut object = Map::with_capacity(row.len());
            for (idx, column) in row.columns().iter().enumerate() {
                let value = row.get(idx).map(scalar_to_json).unwrap_or(Value::Null);
                object.insert(column.name().to_string(), value);
            }
            rows.push(Value::Object(object));
        }
    }

    rows
}

/// The simple-query protocol delivers every value as text. Generated SQL has
/// no compile-time column types, so numbers, booleans, and timestamps are
/// recovered from their canonical Postgres text forms; anything ambiguous
/// stays a string.
fn scalar_to_json(text: &str) -> Value {
    match text {
        "t" => return Value::Bool(true),
        "f" => return Value::Bool(false),
        _ => {}
    }

    if looks_like_integer(text) {
        if let Ok(value) = text.parse::<i64>() {
            return Value::Number(value.into());
        }
    }

    if looks_like_decimal(text) {
        if let Ok(value) = text.parse::<f64>() {
            if let Some(number) = serde_json::Number::from_f64(value) {
                return Value::Number(number);
            }
        }
    }

    if let Some(rfc3339) = normalize_timestamp(text) {
        return Value::String(rfc3339);
    }

    Value::String(text.to_string())
}

/// Postgres renders timestamps as `2026-08-06 12:34:56.789+00`; emit RFC 3339
/// so both timestamp flavors reach JSON consumers in one format.
fn normalize_timestamp(text: &str) -> Option<String> {
    if let Ok(with_offset) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(with_offset.to_rfc3339());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    None
}

fn looks_like_integer(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    // "007" is an invoice number, not a count
    digits.len() == 1 || !digits.starts_with('0')
}

fn looks_like_decimal(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    let Some((int_part, frac_part)) = body.split_once('.') else {
        return false;
    };
    if int_part.is_empty()
        || frac_part.is_empty()
        || !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return false;
    }
    int_part.len() == 1 || !int_part.starts_with('0')
}
