use crate::domain::{
    DeviceSummaryRepository, DeviceSummaryUpdate, DomainError, DomainResult, SUMMARY_SOURCE_TYPE,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tracing::{debug, instrument, warn};

/// Parameterised `UPDATE rdas_dev` built from a sparse [`DeviceSummaryUpdate`].
///
/// Only the columns whose source field is set appear in the SET list.
/// `"Type"` is always written and the row is selected by `"devID"`.
#[derive(Debug)]
pub struct SummaryUpdateStatement {
    pub sql: String,
    /// Columns in SET order
    pub columns: Vec<&'static str>,
    params: Vec<Box<dyn ToSql + Sync + Send>>,
}

impl SummaryUpdateStatement {
    pub fn build(update: &DeviceSummaryUpdate) -> Self {
        let mut statement = Self {
            sql: String::new(),
            columns: Vec::new(),
            params: Vec::new(),
        };
        let mut assignments: Vec<String> = Vec::new();

        if update.touch_last_contact {
            // status holds the last-contact time on the dashboard schema
            assignments.push("status = NOW()".to_string());
            statement.columns.push("status");
        }

        if let Some(latest_data) = update.latest_data {
            assignments.push(statement.bind("LatestData", Box::new(latest_data)));
        }

        if let Some(sensors) = update.current_sensors {
            assignments.push(statement.bind("Current_ss1", Box::new(sensors.sensor1)));
            assignments.push(statement.bind("Current_ss2", Box::new(sensors.sensor2)));
            assignments.push(statement.bind("Current_ss3", Box::new(sensors.sensor3)));
            assignments.push(statement.bind("Current_ss4", Box::new(sensors.sensor4)));
        }

        if let Some(main_power) = update.main_power {
            assignments.push(statement.bind("MainPower", Box::new(main_power)));
        }

        if let Some(gsm_signal) = update.gsm_signal {
            assignments.push(statement.bind("GSMSignal", Box::new(gsm_signal)));
        }

        if let Some(sample_time) = update.sample_time {
            assignments.push(statement.bind("sample_time", Box::new(sample_time)));
        }

        if let Some(sending_rate) = update.sending_rate {
            assignments.push(statement.bind("SendingRate", Box::new(sending_rate)));
        }

        if let Some(unbox) = update.unbox_code {
            assignments.push(statement.bind("UnBox", Box::new(unbox.to_string())));
        }

        assignments.push(statement.bind("Type", Box::new(SUMMARY_SOURCE_TYPE.to_string())));

        statement.params.push(Box::new(update.device_id.clone()));
        statement.sql = format!(
            "UPDATE rdas_dev SET {} WHERE \"devID\" = ${}",
            assignments.join(", "),
            statement.params.len()
        );

        statement
    }

    /// Parameters in placeholder order, ready for `execute`
    pub fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| &**p as &(dyn ToSql + Sync))
            .collect()
    }

    fn bind(&mut self, column: &'static str, value: Box<dyn ToSql + Sync + Send>) -> String {
        self.params.push(value);
        self.columns.push(column);
        format!("\"{}\" = ${}", column, self.params.len())
    }
}

/// PostgreSQL implementation of DeviceSummaryRepository over the `rdas_dev` table
#[derive(Clone)]
pub struct PostgresDeviceSummaryRepository {
    client: PostgresClient,
}

impl PostgresDeviceSummaryRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceSummaryRepository for PostgresDeviceSummaryRepository {
    #[instrument(skip(self, update), fields(device_id = %update.device_id))]
    async fn update_summary(&self, update: DeviceSummaryUpdate) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let statement = SummaryUpdateStatement::build(&update);
        debug!(columns = ?statement.columns, "updating device summary");

        let rows_affected = conn
            .execute(statement.sql.as_str(), &statement.params())
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if rows_affected == 0 {
            warn!(device_id = %update.device_id, "no device summary row matched");
        } else {
            debug!(device_id = %update.device_id, rows_affected, "updated device summary");
        }

        Ok(rows_affected)
    }
}
