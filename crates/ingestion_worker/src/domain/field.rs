use serde_json::{Map, Value};

/// Outcome of looking up one dynamically-typed payload field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<T> {
    Absent,
    WrongType,
    Present(T),
}

impl<T> FieldValue<T> {
    /// True when the key exists, whatever its type
    pub fn is_present_key(&self) -> bool {
        !matches!(self, FieldValue::Absent)
    }

    pub fn present(self) -> Option<T> {
        match self {
            FieldValue::Present(value) => Some(value),
            _ => None,
        }
    }
}

pub fn number_field(values: &Map<String, Value>, key: &str) -> FieldValue<f64> {
    match values.get(key) {
        None => FieldValue::Absent,
        Some(value) => value
            .as_f64()
            .map(FieldValue::Present)
            .unwrap_or(FieldValue::WrongType),
    }
}

pub fn string_field<'a>(values: &'a Map<String, Value>, key: &str) -> FieldValue<&'a str> {
    match values.get(key) {
        None => FieldValue::Absent,
        Some(value) => value
            .as_str()
            .map(FieldValue::Present)
            .unwrap_or(FieldValue::WrongType),
    }
}

/// Number lookup over an alias chain; the first key that exists wins,
/// even when its value has the wrong type
pub fn aliased_number_field(values: &Map<String, Value>, keys: &[&str]) -> FieldValue<f64> {
    keys.iter()
        .map(|key| number_field(values, key))
        .find(FieldValue::is_present_key)
        .unwrap_or(FieldValue::Absent)
}

/// Single-character code from a string field, `None` unless it is a non-empty string
pub fn code_field(values: &Map<String, Value>, key: &str) -> Option<char> {
    string_field(values, key)
        .present()
        .and_then(|s| s.chars().next())
}
