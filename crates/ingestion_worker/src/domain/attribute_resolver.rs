use crate::domain::field::{code_field, number_field, string_field, FieldValue};
use common::domain::{AttributeSet, DomainError, DomainResult};
use serde_json::{Map, Value};
use tracing::warn;

const MAIN_POWER_KEY: &str = "main_power";
const GSM_SIGNAL_KEY: &str = "GSM_Signal";
const SAMPLING_RATE_KEY: &str = "SamplingRate";
const SENDING_RATE_KEY: &str = "SendingRate";
const UNBOX_KEY: &str = "UnBox";

/// Decode an attributes payload into a flat JSON object.
///
/// A literal `null` decodes to an empty object; anything else that is not an
/// object is a [`DomainError::PayloadParse`].
pub fn decode_attribute_payload(payload: &[u8]) -> DomainResult<Map<String, Value>> {
    serde_json::from_slice::<Option<Map<String, Value>>>(payload)
        .map(Option::unwrap_or_default)
        .map_err(|e| DomainError::PayloadParse {
            payload: String::from_utf8_lossy(payload).into_owned(),
            reason: e.to_string(),
        })
}

/// Resolve the sparse attribute set; each field is independent and a bad one
/// never spoils the rest
pub fn resolve_attributes(device_id: &str, values: &Map<String, Value>) -> AttributeSet {
    AttributeSet {
        main_power: main_power(device_id, values),
        gsm_signal: integer_field(device_id, values, GSM_SIGNAL_KEY),
        sample_time: integer_field(device_id, values, SAMPLING_RATE_KEY),
        sending_rate: integer_field(device_id, values, SENDING_RATE_KEY),
        unbox_code: code_field(values, UNBOX_KEY),
    }
}

// Firmware reports main power as a decimal string, e.g. "12.6"; surrounding
// whitespace is rejected
fn main_power(device_id: &str, values: &Map<String, Value>) -> Option<f64> {
    let raw = string_field(values, MAIN_POWER_KEY).present()?;
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            warn!(device_id = %device_id, main_power = %raw, "ignoring unparseable main_power");
            None
        }
    }
}

// Numbers are truncated toward zero; values outside the INTEGER column range
// are left out rather than clamped
fn integer_field(device_id: &str, values: &Map<String, Value>, key: &str) -> Option<i32> {
    let FieldValue::Present(value) = number_field(values, key) else {
        return None;
    };
    let truncated = value.trunc();
    if truncated >= f64::from(i32::MIN) && truncated <= f64::from(i32::MAX) {
        Some(truncated as i32)
    } else {
        warn!(device_id = %device_id, field = key, value, "ignoring out of range attribute");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_gsm_signal_only() {
        let attributes = resolve_attributes("T24000", &values(json!({"GSM_Signal": 42})));

        assert_eq!(
            attributes,
            AttributeSet {
                gsm_signal: Some(42),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_all_fields() {
        let attributes = resolve_attributes(
            "T24000",
            &values(json!({
                "main_power": "12.6",
                "GSM_Signal": 27,
                "SamplingRate": 60,
                "SendingRate": 300.9,
                "UnBox": "Open"
            })),
        );

        assert_eq!(
            attributes,
            AttributeSet {
                main_power: Some(12.6),
                gsm_signal: Some(27),
                sample_time: Some(60),
                sending_rate: Some(300),
                unbox_code: Some('O'),
            }
        );
    }

    #[test]
    fn test_bad_main_power_is_omitted() {
        let attributes = resolve_attributes(
            "T24000",
            &values(json!({"main_power": "high", "GSM_Signal": 10})),
        );

        assert_eq!(attributes.main_power, None);
        assert_eq!(attributes.gsm_signal, Some(10));
    }

    #[test]
    fn test_padded_main_power_is_omitted() {
        let attributes = resolve_attributes(
            "T24000",
            &values(json!({"main_power": " 12.6", "GSM_Signal": 7})),
        );

        assert_eq!(attributes.main_power, None);
        assert_eq!(attributes.gsm_signal, Some(7));
    }

    #[test]
    fn test_out_of_range_integers_are_omitted() {
        let attributes = resolve_attributes(
            "T24000",
            &values(json!({
                "GSM_Signal": 3_000_000_000_i64,
                "SamplingRate": -2_147_483_648_i64,
                "SendingRate": 300.9
            })),
        );

        assert_eq!(attributes.gsm_signal, None);
        assert_eq!(attributes.sample_time, Some(i32::MIN));
        assert_eq!(attributes.sending_rate, Some(300));
    }

    #[test]
    fn test_numeric_main_power_is_ignored() {
        let attributes = resolve_attributes("T24000", &values(json!({"main_power": 12.6})));
        assert!(attributes.is_empty());
    }

    #[test]
    fn test_wrong_types_resolve_to_nothing() {
        let attributes = resolve_attributes(
            "T24000",
            &values(json!({
                "GSM_Signal": "42",
                "SamplingRate": null,
                "SendingRate": [1],
                "UnBox": "",
                "firmware": "1.2.3"
            })),
        );

        assert!(attributes.is_empty());
    }

    #[test]
    fn test_decode_attribute_payload() {
        let decoded = decode_attribute_payload(br#"{"GSM_Signal":42}"#).unwrap();
        assert_eq!(decoded["GSM_Signal"], 42);

        assert!(decode_attribute_payload(b"null").unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        assert!(matches!(
            decode_attribute_payload(b"[1,2]"),
            Err(DomainError::PayloadParse { .. })
        ));
        assert!(matches!(
            decode_attribute_payload(b"{GSM_Signal:42}"),
            Err(DomainError::PayloadParse { .. })
        ));
    }
}
