use common::domain::{DomainError, DomainResult, RawReadingRecord};
use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::OnceLock;
use tracing::debug;

/// Substring that identifies payloads from older firmware
pub const LEGACY_DIALECT_MARKER: &str = "Channel:";

/// Text encodings produced by the different firmware generations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadDialect {
    /// JSON-like text with unquoted object keys, e.g. `[{ts:1,values:{Channel:12000}}]`
    Legacy,
    /// Plain JSON
    Current,
}

/// Decoded telemetry payload
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPayload {
    pub dialect: PayloadDialect,
    pub records: Vec<RawReadingRecord>,
}

fn unquoted_key_re() -> &'static Regex {
    static UNQUOTED_KEY_RE: OnceLock<Regex> = OnceLock::new();
    UNQUOTED_KEY_RE.get_or_init(|| Regex::new(r"((?-u:\w)+):").expect("valid unquoted key regex"))
}

pub fn detect_dialect(text: &str) -> PayloadDialect {
    if text.contains(LEGACY_DIALECT_MARKER) {
        PayloadDialect::Legacy
    } else {
        PayloadDialect::Current
    }
}

/// Quote every `word:` token so the legacy text parses as JSON.
///
/// Word characters are ASCII only (`[0-9A-Za-z_]`), matching the devices'
/// own encoder; a non-ASCII letter ends the key.
///
/// This is a plain textual substitution over the whole payload. It is only
/// correct for the shape legacy devices actually send; a word followed by a
/// colon inside a string value (a time such as `12:30`) is rewritten as well.
pub fn repair_legacy_payload(text: &str) -> Cow<'_, str> {
    unquoted_key_re().replace_all(text, "\"${1}\":")
}

/// Detect the dialect, repair if needed and decode into reading records.
///
/// Elements without a numeric `ts` or without an object `values` are dropped.
/// Anything that is not a JSON array of objects (or nulls) is a
/// [`DomainError::PayloadParse`] carrying the original payload text.
pub fn decode_telemetry_payload(payload: &[u8]) -> DomainResult<NormalizedPayload> {
    let text = String::from_utf8_lossy(payload);
    let dialect = detect_dialect(&text);

    let json_text = match dialect {
        PayloadDialect::Legacy => {
            let repaired = repair_legacy_payload(&text);
            debug!(repaired_payload = %repaired, "repaired legacy payload");
            repaired
        }
        PayloadDialect::Current => Cow::Borrowed(text.as_ref()),
    };

    let elements: Vec<Option<Map<String, Value>>> =
        serde_json::from_str(&json_text).map_err(|e| DomainError::PayloadParse {
            payload: text.to_string(),
            reason: e.to_string(),
        })?;

    let records = elements
        .into_iter()
        .flatten()
        .filter_map(reading_record)
        .collect();

    Ok(NormalizedPayload { dialect, records })
}

fn reading_record(mut element: Map<String, Value>) -> Option<RawReadingRecord> {
    // Devices send ts as a JSON number, possibly with a fraction; it is truncated
    let timestamp_ms = element.get("ts").and_then(Value::as_f64)? as i64;

    match element.remove("values") {
        Some(Value::Object(values)) => Some(RawReadingRecord {
            timestamp_ms,
            values,
        }),
        _ => None,
    }
}
