use crate::domain::{DomainResult, SensorValues};
use async_trait::async_trait;
use chrono::NaiveDateTime;

/// Status written on every reading row
pub const READING_STATUS_ACTIVE: &str = "active";

/// Power status written on every reading row
pub const SENSOR_POWER_STATUS_ON: &str = "ON";

/// Source type set on every device summary update
pub const SUMMARY_SOURCE_TYPE: &str = "MQTT";

/// Input for appending a row to the reading history
#[derive(Debug, Clone, PartialEq)]
pub struct InsertSensorReadingInput {
    pub device_id: String,
    pub status: String,
    pub sensors: SensorValues,
    pub power_status: String,
    pub gsm_signal: i32,
    pub observed_at: NaiveDateTime,
    pub unbox_code: char,
}

/// Sparse update of a device summary row. Only `Some` fields become SET clauses;
/// the source type is always written.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceSummaryUpdate {
    pub device_id: String,
    /// Set the last-contact column to the store's current time
    pub touch_last_contact: bool,
    pub latest_data: Option<NaiveDateTime>,
    pub current_sensors: Option<SensorValues>,
    pub main_power: Option<f64>,
    pub gsm_signal: Option<i32>,
    pub sample_time: Option<i32>,
    pub sending_rate: Option<i32>,
    pub unbox_code: Option<char>,
}

/// Append-only reading history
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SensorReadingRepository: Send + Sync {
    async fn insert_reading(&self, input: InsertSensorReadingInput) -> DomainResult<()>;
}

/// Per-device latest-state rows
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceSummaryRepository: Send + Sync {
    /// Apply the update and return the number of rows touched.
    /// Zero rows is not an error: unknown devices are simply not updated.
    async fn update_summary(&self, update: DeviceSummaryUpdate) -> DomainResult<u64>;
}
