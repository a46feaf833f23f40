mod config;

use common::postgres::{
    PostgresClient, PostgresDeviceSummaryRepository, PostgresSensorReadingRepository,
};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use crate::config::ServiceConfig;
use ingestion_worker::{IngestionWorker, IngestionWorkerConfig};
use rdas_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        mqtt_host = %config.mqtt_host,
        mqtt_topic = %config.mqtt_topic,
        "Starting rdas-bridge service"
    );
    debug!(
        postgres_host = %config.postgres_host,
        postgres_database = %config.postgres_database,
        audit_log_dir = %config.audit_log_dir,
        reading_utc_offset = %config.reading_utc_offset,
        "Configuration loaded"
    );

    let reading_utc_offset = match config.reading_offset() {
        Ok(offset) => offset,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    info!("Initializing PostgreSQL...");
    let postgres_client = match PostgresClient::connect_with_retry(
        &config.postgres_config(),
        &config.postgres_retry_policy(),
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to PostgreSQL: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let ingestion_worker = IngestionWorker::new(
        Arc::new(PostgresSensorReadingRepository::new(postgres_client.clone())),
        Arc::new(PostgresDeviceSummaryRepository::new(postgres_client.clone())),
        IngestionWorkerConfig {
            mqtt: config.mqtt_subscriber_config(),
            audit_log_dir: config.audit_log_dir(),
            reading_utc_offset,
        },
    );

    let runner = Runner::new()
        .with_named_process("ingestion_worker", ingestion_worker.into_runner_process())
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            postgres_client.close();
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    if runner.run().await.is_err() {
        std::process::exit(1);
    }
}
