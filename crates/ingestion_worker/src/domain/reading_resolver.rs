use crate::domain::calibration::calibrate_sensors;
use crate::domain::field::{aliased_number_field, number_field, string_field, FieldValue};
use chrono::{FixedOffset, NaiveDateTime, TimeZone, Utc};
use common::domain::{CanonicalReading, RawReadingRecord, ReadingKind};

/// Keys for the first channel, current name first, legacy alias second
const CHANNEL_KEYS: [&str; 2] = ["pressure1", "Channel"];
const LEVEL1_KEY: &str = "level1";
const PRESSURE2_KEY: &str = "pressure2";
const LEVEL2_KEY: &str = "level2";
const UNBOX_KEY: &str = "UnBox";

/// Why a record produced no reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Neither sensor values nor an unbox flag
    NoUsableData,
    /// Identifier-only record whose UnBox is not a non-empty string
    InvalidIdentifierFlag,
    /// Some but not all of the four sensor fields
    IncompleteReading,
    /// A sensor field is present but not a number
    NonNumericSensor(&'static str),
    /// Timestamp outside the representable range
    InvalidTimestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadingResolution {
    Resolved(CanonicalReading),
    Discarded(DiscardReason),
}

/// Resolves raw records into canonical readings
#[derive(Debug, Clone, Copy)]
pub struct ReadingResolver {
    timezone: FixedOffset,
}

impl ReadingResolver {
    /// `timezone` is the reporting system's zone used for civil timestamps
    pub fn new(timezone: FixedOffset) -> Self {
        Self { timezone }
    }

    /// Epoch milliseconds to wall-clock time in the reporting zone
    pub fn civil_timestamp(&self, timestamp_ms: i64) -> Option<NaiveDateTime> {
        Utc.timestamp_millis_opt(timestamp_ms)
            .single()
            .map(|utc| utc.with_timezone(&self.timezone).naive_local())
    }

    pub fn resolve(&self, device_id: &str, record: &RawReadingRecord) -> ReadingResolution {
        match self.resolve_kind(record) {
            Ok(kind) => match self.civil_timestamp(record.timestamp_ms) {
                Some(observed_at) => ReadingResolution::Resolved(CanonicalReading {
                    device_id: device_id.to_string(),
                    observed_at,
                    kind,
                }),
                None => ReadingResolution::Discarded(DiscardReason::InvalidTimestamp),
            },
            Err(reason) => ReadingResolution::Discarded(reason),
        }
    }

    fn resolve_kind(&self, record: &RawReadingRecord) -> Result<ReadingKind, DiscardReason> {
        let values = &record.values;

        let sensor_fields = [
            (CHANNEL_KEYS[0], aliased_number_field(values, &CHANNEL_KEYS)),
            (LEVEL1_KEY, number_field(values, LEVEL1_KEY)),
            (PRESSURE2_KEY, number_field(values, PRESSURE2_KEY)),
            (LEVEL2_KEY, number_field(values, LEVEL2_KEY)),
        ];
        let unbox = string_field(values, UNBOX_KEY);

        let no_sensor_keys = sensor_fields
            .iter()
            .all(|(_, field)| !field.is_present_key());

        if no_sensor_keys {
            if !unbox.is_present_key() {
                return Err(DiscardReason::NoUsableData);
            }
            let id_flag = unbox
                .present()
                .and_then(|s| s.chars().next())
                .ok_or(DiscardReason::InvalidIdentifierFlag)?;
            return Ok(ReadingKind::IdentifierOnly { id_flag });
        }

        let mut raw = [0.0f64; 4];
        for (slot, (key, field)) in raw.iter_mut().zip(sensor_fields) {
            *slot = match field {
                FieldValue::Present(value) => value,
                FieldValue::Absent => return Err(DiscardReason::IncompleteReading),
                FieldValue::WrongType => return Err(DiscardReason::NonNumericSensor(key)),
            };
        }

        Ok(ReadingKind::Full {
            sensors: calibrate_sensors(raw),
            unbox: unbox.present().and_then(|s| s.chars().next()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{ReadingMode, SensorValues};
    use serde_json::json;

    fn utc_plus_seven() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn record(ts: i64, values: serde_json::Value) -> RawReadingRecord {
        RawReadingRecord {
            timestamp_ms: ts,
            values: values.as_object().unwrap().clone(),
        }
    }

    fn resolve(values: serde_json::Value) -> ReadingResolution {
        ReadingResolver::new(utc_plus_seven()).resolve("T24000", &record(1_700_000_000_000, values))
    }

    fn resolved(resolution: ReadingResolution) -> CanonicalReading {
        match resolution {
            ReadingResolution::Resolved(reading) => reading,
            ReadingResolution::Discarded(reason) => panic!("unexpected discard: {:?}", reason),
        }
    }

    #[test]
    fn test_identifier_only_mode() {
        let reading = resolved(resolve(json!({"UnBox": "A"})));

        assert_eq!(reading.mode(), ReadingMode::IdentifierOnly);
        assert_eq!(reading.kind, ReadingKind::IdentifierOnly { id_flag: 'A' });
        assert_eq!(reading.sensors(), SensorValues::ZERO);
        assert_eq!(reading.device_id, "T24000");
    }

    #[test]
    fn test_identifier_only_takes_first_character() {
        let reading = resolved(resolve(json!({"UnBox": "Open"})));
        assert_eq!(reading.kind, ReadingKind::IdentifierOnly { id_flag: 'O' });
    }

    #[test]
    fn test_identifier_only_requires_non_empty_string() {
        assert_eq!(
            resolve(json!({"UnBox": ""})),
            ReadingResolution::Discarded(DiscardReason::InvalidIdentifierFlag)
        );
        assert_eq!(
            resolve(json!({"UnBox": 1})),
            ReadingResolution::Discarded(DiscardReason::InvalidIdentifierFlag)
        );
    }

    #[test]
    fn test_full_reading_defaults_unbox() {
        let reading = resolved(resolve(json!({
            "pressure1": 12000, "level1": 5000, "pressure2": 3000, "level2": 2000
        })));

        assert_eq!(reading.mode(), ReadingMode::FullReading);
        assert_eq!(reading.unbox_code(), 'C');
        assert_eq!(reading.payload_unbox_code(), None);
        assert_eq!(
            reading.sensors(),
            SensorValues {
                sensor1: 12.0,
                sensor2: 5.0,
                sensor3: 3.0,
                sensor4: 2.0,
            }
        );
    }

    #[test]
    fn test_full_reading_with_unbox() {
        let reading = resolved(resolve(json!({
            "pressure1": 12000, "level1": 5000, "pressure2": 3000, "level2": 2000, "UnBox": "Box"
        })));

        assert_eq!(reading.unbox_code(), 'B');
        assert_eq!(reading.payload_unbox_code(), Some('B'));
    }

    #[test]
    fn test_full_reading_empty_unbox_falls_back_to_default() {
        let reading = resolved(resolve(json!({
            "pressure1": 12000, "level1": 5000, "pressure2": 3000, "level2": 2000, "UnBox": ""
        })));

        assert_eq!(reading.unbox_code(), 'C');
        assert_eq!(reading.payload_unbox_code(), None);
    }

    #[test]
    fn test_legacy_channel_alias() {
        let reading = resolved(resolve(json!({
            "Channel": 12345, "level1": 1005, "pressure2": 12345, "level2": 999
        })));

        assert_eq!(
            reading.sensors(),
            SensorValues {
                sensor1: 12.35,
                sensor2: 1.0,
                sensor3: 12.345,
                sensor4: 0.999,
            }
        );
    }

    #[test]
    fn test_incomplete_reading_is_discarded() {
        assert_eq!(
            resolve(json!({"pressure1": 12000, "level1": 5000, "pressure2": 3000})),
            ReadingResolution::Discarded(DiscardReason::IncompleteReading)
        );
    }

    #[test]
    fn test_unbox_with_partial_sensors_is_discarded() {
        assert_eq!(
            resolve(json!({"pressure1": 12000, "UnBox": "A"})),
            ReadingResolution::Discarded(DiscardReason::IncompleteReading)
        );
    }

    #[test]
    fn test_non_numeric_sensor_is_discarded() {
        assert_eq!(
            resolve(json!({
                "pressure1": 12000, "level1": "5000", "pressure2": 3000, "level2": 2000
            })),
            ReadingResolution::Discarded(DiscardReason::NonNumericSensor("level1"))
        );
    }

    #[test]
    fn test_empty_values_are_discarded() {
        assert_eq!(
            resolve(json!({"temperature": 21})),
            ReadingResolution::Discarded(DiscardReason::NoUsableData)
        );
    }

    #[test]
    fn test_civil_timestamp_uses_reporting_zone() {
        let resolver = ReadingResolver::new(utc_plus_seven());

        // 2023-11-14 22:13:20 UTC
        let civil = resolver.civil_timestamp(1_700_000_000_000).unwrap();

        assert_eq!(civil.format("%Y-%m-%d %H:%M:%S").to_string(), "2023-11-15 05:13:20");
    }

    #[test]
    fn test_out_of_range_timestamp_is_discarded() {
        let resolution = ReadingResolver::new(utc_plus_seven())
            .resolve("T24000", &record(i64::MAX, json!({"UnBox": "A"})));

        assert_eq!(
            resolution,
            ReadingResolution::Discarded(DiscardReason::InvalidTimestamp)
        );
    }
}
