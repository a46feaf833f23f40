use crate::domain::{DomainError, DomainResult, InsertSensorReadingInput, SensorReadingRepository};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tracing::{debug, instrument};

// sensor5..sensor8 are unused by current firmware and always written as zero
const INSERT_READING_SQL: &str = r#"INSERT INTO sensor_data ("deviceID", status, sensor1, sensor2, sensor3, sensor4, sensor5, sensor6, sensor7, sensor8, "SensorPowerStatus", "GSMSignal", "Current_timestamp", date_time, "UnBox")
 VALUES ($1, $2, $3, $4, $5, $6, 0, 0, 0, 0, $7, $8, NOW(), $9, $10)"#;

/// PostgreSQL implementation of SensorReadingRepository over the `sensor_data` table
#[derive(Clone)]
pub struct PostgresSensorReadingRepository {
    client: PostgresClient,
}

impl PostgresSensorReadingRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SensorReadingRepository for PostgresSensorReadingRepository {
    #[instrument(skip(self, input), fields(device_id = %input.device_id, observed_at = %input.observed_at))]
    async fn insert_reading(&self, input: InsertSensorReadingInput) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let unbox = input.unbox_code.to_string();

        conn.execute(
            INSERT_READING_SQL,
            &[
                &input.device_id,
                &input.status,
                &input.sensors.sensor1,
                &input.sensors.sensor2,
                &input.sensors.sensor3,
                &input.sensors.sensor4,
                &input.power_status,
                &input.gsm_signal,
                &input.observed_at,
                &unbox,
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(device_id = %input.device_id, "inserted sensor reading");
        Ok(())
    }
}
