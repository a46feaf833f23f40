use common::domain::{
    AttributeSet, CanonicalReading, DeviceSummaryRepository, DeviceSummaryUpdate,
    InsertSensorReadingInput, ReadingKind, SensorReadingRepository, WriteOperation, WriteOutcome,
    READING_STATUS_ACTIVE, SENSOR_POWER_STATUS_ON,
};
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// GSM signal is only known from attribute messages; readings always carry zero
const READING_GSM_SIGNAL: i32 = 0;

/// Maps canonical readings and attribute sets onto the two store operations.
///
/// Store failures never escape: every attempted operation becomes a
/// [`WriteOutcome`] and there is no rollback between the insert and the update.
pub struct PersistenceMapper {
    readings: Arc<dyn SensorReadingRepository>,
    summaries: Arc<dyn DeviceSummaryRepository>,
}

impl PersistenceMapper {
    pub fn new(
        readings: Arc<dyn SensorReadingRepository>,
        summaries: Arc<dyn DeviceSummaryRepository>,
    ) -> Self {
        Self {
            readings,
            summaries,
        }
    }

    /// Insert the reading row, then update the device summary. Both are always
    /// attempted; the outcomes come back in that order.
    #[instrument(skip(self, reading), fields(device_id = %reading.device_id, mode = ?reading.mode()))]
    pub async fn persist_reading(&self, reading: &CanonicalReading) -> Vec<WriteOutcome> {
        let insert = match self.readings.insert_reading(reading_insert(reading)).await {
            Ok(()) => WriteOutcome::success(WriteOperation::InsertReading),
            Err(e) => {
                error!(device_id = %reading.device_id, error = %e, "failed to insert sensor reading");
                WriteOutcome::failed(WriteOperation::InsertReading, e.to_string())
            }
        };

        let update = self.update_summary(reading_summary_update(reading)).await;

        vec![insert, update]
    }

    #[instrument(skip(self, attributes), fields(device_id = %device_id))]
    pub async fn persist_attributes(&self, device_id: &str, attributes: &AttributeSet) -> WriteOutcome {
        self.update_summary(attribute_summary_update(device_id, attributes))
            .await
    }

    async fn update_summary(&self, update: DeviceSummaryUpdate) -> WriteOutcome {
        let device_id = update.device_id.clone();
        match self.summaries.update_summary(update).await {
            Ok(rows) => {
                debug!(device_id = %device_id, rows_affected = rows, "updated device summary");
                WriteOutcome::success(WriteOperation::UpdateSummary)
            }
            Err(e) => {
                error!(device_id = %device_id, error = %e, "failed to update device summary");
                WriteOutcome::failed(WriteOperation::UpdateSummary, e.to_string())
            }
        }
    }
}

pub fn reading_insert(reading: &CanonicalReading) -> InsertSensorReadingInput {
    InsertSensorReadingInput {
        device_id: reading.device_id.clone(),
        status: READING_STATUS_ACTIVE.to_string(),
        sensors: reading.sensors(),
        power_status: SENSOR_POWER_STATUS_ON.to_string(),
        gsm_signal: READING_GSM_SIGNAL,
        observed_at: reading.observed_at,
        unbox_code: reading.unbox_code(),
    }
}

/// Summary update for a reading. Identifier-only readings leave the current
/// sensor mirrors alone, and the default unbox code is never written.
pub fn reading_summary_update(reading: &CanonicalReading) -> DeviceSummaryUpdate {
    let current_sensors = match reading.kind {
        ReadingKind::Full { sensors, .. } => Some(sensors),
        ReadingKind::IdentifierOnly { .. } => None,
    };

    DeviceSummaryUpdate {
        device_id: reading.device_id.clone(),
        touch_last_contact: true,
        latest_data: Some(reading.observed_at),
        current_sensors,
        unbox_code: reading.payload_unbox_code(),
        ..Default::default()
    }
}

/// Summary update touching only the attributes that resolved
pub fn attribute_summary_update(device_id: &str, attributes: &AttributeSet) -> DeviceSummaryUpdate {
    DeviceSummaryUpdate {
        device_id: device_id.to_string(),
        main_power: attributes.main_power,
        gsm_signal: attributes.gsm_signal,
        sample_time: attributes.sample_time,
        sending_rate: attributes.sending_rate,
        unbox_code: attributes.unbox_code,
        ..Default::default()
    }
}
