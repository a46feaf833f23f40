use crate::domain::{AttributeSet, DomainResult, SensorValues, WriteOutcome};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::fmt;

/// Device id recorded when the topic could not be resolved
pub const UNKNOWN_DEVICE_ID: &str = "unknown";

/// How a message (or one record of it) was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditMode {
    FullReading,
    IdentifierOnly,
    Attributes,
    ParseError,
    InvalidTopic,
    NoValidAttributes,
}

impl AuditMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditMode::FullReading => "FULL READING",
            AuditMode::IdentifierOnly => "IDENTIFIER ONLY",
            AuditMode::Attributes => "ATTRIBUTES",
            AuditMode::ParseError => "PARSE ERROR",
            AuditMode::InvalidTopic => "INVALID TOPIC",
            AuditMode::NoValidAttributes => "NO VALID ATTRIBUTES",
        }
    }

    /// Modes where processing stopped before any write was attempted
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AuditMode::ParseError | AuditMode::InvalidTopic | AuditMode::NoValidAttributes
        )
    }
}

impl fmt::Display for AuditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived fields carried by an audit record
#[derive(Debug, Clone, PartialEq)]
pub enum AuditDetail {
    Reading {
        sensors: SensorValues,
        unbox_code: char,
    },
    Attributes(AttributeSet),
    /// Placeholder for messages rejected before resolution
    Empty,
}

/// One audit row, built once per processed message and handed to the sink
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub topic: String,
    pub raw_payload: String,
    pub device_id: String,
    pub detail: AuditDetail,
    /// Civil timestamp of the reading, or processing time when there is none
    pub timestamp: NaiveDateTime,
    pub outcomes: Vec<WriteOutcome>,
    pub mode: AuditMode,
}

/// Durable audit trail
///
/// Implementations should:
/// - Persist the record in a human-readable form
/// - Tolerate concurrent calls for the same device
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> DomainResult<()>;
}
