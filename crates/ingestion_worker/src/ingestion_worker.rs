use crate::audit::HtmlAuditSink;
use crate::domain::{IngestionService, MessageHandler, PersistenceMapper};
use crate::mqtt::{run_mqtt_subscriber, MqttSubscriberConfig};
use chrono::FixedOffset;
use common::domain::{DeviceSummaryRepository, SensorReadingRepository};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct IngestionWorkerConfig {
    pub mqtt: MqttSubscriberConfig,
    pub audit_log_dir: PathBuf,
    /// Zone of the reporting system; readings and audit rows use its wall-clock time
    pub reading_utc_offset: FixedOffset,
}

/// MQTT ingestion wired to the store and the HTML audit trail
pub struct IngestionWorker {
    mqtt_config: MqttSubscriberConfig,
    handler: Arc<dyn MessageHandler>,
}

impl IngestionWorker {
    pub fn new(
        reading_repository: Arc<dyn SensorReadingRepository>,
        summary_repository: Arc<dyn DeviceSummaryRepository>,
        config: IngestionWorkerConfig,
    ) -> Self {
        debug!(
            audit_log_dir = %config.audit_log_dir.display(),
            reading_utc_offset = %config.reading_utc_offset,
            "initializing ingestion worker"
        );

        let audit_sink = Arc::new(HtmlAuditSink::new(
            config.audit_log_dir,
            config.reading_utc_offset,
        ));
        let mapper = PersistenceMapper::new(reading_repository, summary_repository);
        let service = IngestionService::new(config.reading_utc_offset, mapper, audit_sink);

        Self {
            mqtt_config: config.mqtt,
            handler: Arc::new(service),
        }
    }

    #[allow(clippy::type_complexity)]
    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
            > + Send,
    > {
        Box::new({
            let mqtt_config = self.mqtt_config;
            let handler = self.handler;
            move |ctx| Box::pin(async move { run_mqtt_subscriber(mqtt_config, handler, ctx).await })
        })
    }
}
