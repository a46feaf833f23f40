use chrono::{DateTime, Utc};
use std::borrow::Cow;

/// A single message handed over by the bus, consumed exactly once
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }

    /// Payload as text; invalid UTF-8 sequences are replaced rather than rejected
    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// One element of a decoded telemetry sequence
#[derive(Debug, Clone, PartialEq)]
pub struct RawReadingRecord {
    /// Epoch milliseconds as sent by the device
    pub timestamp_ms: i64,
    pub values: serde_json::Map<String, serde_json::Value>,
}
