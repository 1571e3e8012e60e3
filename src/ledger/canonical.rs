//! Canonical Encoding
//!
//! Deterministic JSON used as hash input. Object keys are sorted by byte
//! order, arrays keep their order, no whitespace is emitted, strings are
//! JSON-escaped and numbers are rendered exactly as `serde_json` renders them
//! (integers in decimal, floats in shortest round-trip form).
//!
//! The digest input of an entry is the canonical encoding of the array
//! `[payload, actor, timestamp, previous_hash]`. New hashed fields may only be
//! appended to that array behind a payload `schema_version` bump.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde_json::{Map, Value};

use crate::error::LedgerError;

/// Business fields of an entry
pub type Payload = Map<String, Value>;

/// Encode any JSON value canonically
pub fn canonicalize(value: &Value) -> Result<String, LedgerError> {
    let mut out = String::new();
    write_value(&mut out, value)?;
    Ok(out)
}

/// Encode a payload object canonically
pub fn canonicalize_payload(payload: &Payload) -> Result<String, LedgerError> {
    let mut out = String::new();
    write_object(&mut out, payload)?;
    Ok(out)
}

/// Build the exact bytes fed to the digest for one entry
pub fn hash_input(
    payload: &Payload,
    actor: &str,
    timestamp: &str,
    previous_hash: &str,
) -> Result<String, LedgerError> {
    let mut out = String::from("[");
    write_object(&mut out, payload)?;
    for field in [actor, timestamp, previous_hash] {
        out.push(',');
        write_string(&mut out, field)?;
    }
    out.push(']');
    Ok(out)
}

/// Years that render as plain four-digit RFC 3339 and parse back
pub const TIMESTAMP_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Truncate to the microsecond precision that is persisted and hashed
pub fn normalize_timestamp(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let micros = timestamp.nanosecond() / 1_000 * 1_000;
    timestamp.with_nanosecond(micros).unwrap_or(timestamp)
}

/// RFC 3339, UTC, six fractional digits, `Z` suffix
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| LedgerError::InvalidEntry(format!("Invalid timestamp '{}': {}", value, e)))
}

fn write_value(out: &mut String, value: &Value) -> Result<(), LedgerError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item)?;
            }
            out.push(']');
        }
        Value::Object(map) => write_object(out, map)?,
    }
    Ok(())
}

fn write_object(out: &mut String, map: &Map<String, Value>) -> Result<(), LedgerError> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(out, key)?;
        out.push(':');
        write_value(out, &map[key])?;
    }
    out.push('}');
    Ok(())
}

fn write_string(out: &mut String, value: &str) -> Result<(), LedgerError> {
    out.push_str(&serde_json::to_string(value)?);
    Ok(())
}
