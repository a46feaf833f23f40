use crate::domain::{
    decode_attribute_payload, decode_telemetry_payload, parse_device_topic, resolve_attributes,
    route_topic, MessageRoute, PersistenceMapper, ReadingResolution, ReadingResolver,
};
use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDateTime};
use common::domain::{
    AuditDetail, AuditMode, AuditRecord, AuditSink, CanonicalReading, RawMessage, ReadingMode,
    WriteOutcome, UNKNOWN_DEVICE_ID,
};
use std::sync::Arc;
use tracing::{debug, error, field, instrument, warn, Span};

/// Receives every message delivered by the bus
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, message: RawMessage);
}

/// Routes messages through normalization, resolution and persistence, and
/// writes the audit trail.
///
/// Nothing here fails the caller. Parse and topic errors end processing of
/// the message with an audit row; bad records inside a telemetry payload are
/// skipped without one.
pub struct IngestionService {
    resolver: ReadingResolver,
    mapper: PersistenceMapper,
    audit_sink: Arc<dyn AuditSink>,
    timezone: FixedOffset,
}

impl IngestionService {
    pub fn new(
        timezone: FixedOffset,
        mapper: PersistenceMapper,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            resolver: ReadingResolver::new(timezone),
            mapper,
            audit_sink,
            timezone,
        }
    }

    #[instrument(
        skip(self, message),
        fields(topic = %message.topic, payload_size = message.payload.len(), device_id = field::Empty)
    )]
    pub async fn process_message(&self, message: RawMessage) {
        match route_topic(&message.topic) {
            Some(MessageRoute::Telemetry) => self.process_telemetry(&message).await,
            Some(MessageRoute::Attributes) => self.process_attributes(&message).await,
            None => debug!(topic = %message.topic, "ignoring message on unrelated topic"),
        }
    }

    async fn process_telemetry(&self, message: &RawMessage) {
        let normalized = match decode_telemetry_payload(&message.payload) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "failed to decode telemetry payload");
                self.audit_failure(message, UNKNOWN_DEVICE_ID, AuditMode::ParseError)
                    .await;
                return;
            }
        };

        let Some(device_id) = self.device_id(message).await else {
            return;
        };

        debug!(
            device_id = %device_id,
            dialect = ?normalized.dialect,
            record_count = normalized.records.len(),
            "decoded telemetry payload"
        );

        let mut persisted = 0usize;
        for record in &normalized.records {
            match self.resolver.resolve(device_id, record) {
                ReadingResolution::Resolved(reading) => {
                    let outcomes = self.mapper.persist_reading(&reading).await;
                    self.audit(reading_audit_record(message, &reading, outcomes))
                        .await;
                    persisted += 1;
                }
                ReadingResolution::Discarded(reason) => {
                    debug!(
                        device_id = %device_id,
                        timestamp_ms = record.timestamp_ms,
                        reason = ?reason,
                        "discarding reading record"
                    );
                }
            }
        }

        if persisted == 0 {
            debug!(device_id = %device_id, "telemetry payload had no usable readings");
        }
    }

    async fn process_attributes(&self, message: &RawMessage) {
        let values = match decode_attribute_payload(&message.payload) {
            Ok(values) => values,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "failed to decode attributes payload");
                self.audit_failure(message, UNKNOWN_DEVICE_ID, AuditMode::ParseError)
                    .await;
                return;
            }
        };

        let Some(device_id) = self.device_id(message).await else {
            return;
        };

        let attributes = resolve_attributes(device_id, &values);
        if attributes.is_empty() {
            warn!(device_id = %device_id, "attributes payload had no valid attributes");
            self.audit_failure(message, device_id, AuditMode::NoValidAttributes)
                .await;
            return;
        }

        let outcome = self.mapper.persist_attributes(device_id, &attributes).await;

        self.audit(AuditRecord {
            topic: message.topic.clone(),
            raw_payload: message.payload_text().into_owned(),
            device_id: device_id.to_string(),
            detail: AuditDetail::Attributes(attributes),
            timestamp: self.local_received_at(message),
            outcomes: vec![outcome],
            mode: AuditMode::Attributes,
        })
        .await;
    }

    /// Device id from the topic; an invalid topic is audited and yields `None`
    async fn device_id<'a>(&self, message: &'a RawMessage) -> Option<&'a str> {
        match parse_device_topic(&message.topic) {
            Ok(device_id) => {
                Span::current().record("device_id", device_id);
                Some(device_id)
            }
            Err(e) => {
                warn!(error = %e, "rejecting message with invalid topic");
                self.audit_failure(message, UNKNOWN_DEVICE_ID, AuditMode::InvalidTopic)
                    .await;
                None
            }
        }
    }

    async fn audit_failure(&self, message: &RawMessage, device_id: &str, mode: AuditMode) {
        self.audit(AuditRecord {
            topic: message.topic.clone(),
            raw_payload: message.payload_text().into_owned(),
            device_id: device_id.to_string(),
            detail: AuditDetail::Empty,
            timestamp: self.local_received_at(message),
            outcomes: Vec::new(),
            mode,
        })
        .await;
    }

    async fn audit(&self, record: AuditRecord) {
        let device_id = record.device_id.clone();
        let mode = record.mode;
        if let Err(e) = self.audit_sink.record(record).await {
            error!(device_id = %device_id, mode = %mode, error = %e, "failed to write audit record");
        }
    }

    fn local_received_at(&self, message: &RawMessage) -> NaiveDateTime {
        message.received_at.with_timezone(&self.timezone).naive_local()
    }
}

#[async_trait]
impl MessageHandler for IngestionService {
    async fn handle_message(&self, message: RawMessage) {
        self.process_message(message).await;
    }
}

fn reading_audit_record(
    message: &RawMessage,
    reading: &CanonicalReading,
    outcomes: Vec<WriteOutcome>,
) -> AuditRecord {
    let mode = match reading.mode() {
        ReadingMode::FullReading => AuditMode::FullReading,
        ReadingMode::IdentifierOnly => AuditMode::IdentifierOnly,
    };

    AuditRecord {
        topic: message.topic.clone(),
        raw_payload: message.payload_text().into_owned(),
        device_id: reading.device_id.clone(),
        detail: AuditDetail::Reading {
            sensors: reading.sensors(),
            unbox_code: reading.unbox_code(),
        },
        timestamp: reading.observed_at,
        outcomes,
        mode,
    }
}
