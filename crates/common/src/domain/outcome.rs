use std::fmt;

/// The two write operations a processed message can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    InsertReading,
    UpdateSummary,
}

impl WriteOperation {
    pub fn label(&self) -> &'static str {
        match self {
            WriteOperation::InsertReading => "INSERT sensor_data",
            WriteOperation::UpdateSummary => "UPDATE rdas_dev",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Success,
    Failed,
}

/// Result of one store operation as recorded in the audit trail
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub operation: WriteOperation,
    pub status: WriteStatus,
    /// Error text on failure, empty on success
    pub detail: String,
}

impl WriteOutcome {
    pub fn success(operation: WriteOperation) -> Self {
        Self {
            operation,
            status: WriteStatus::Success,
            detail: String::new(),
        }
    }

    pub fn failed(operation: WriteOperation, detail: impl Into<String>) -> Self {
        Self {
            operation,
            status: WriteStatus::Failed,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == WriteStatus::Success
    }
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            WriteStatus::Success => write!(f, "{}: SUCCESS", self.operation.label()),
            WriteStatus::Failed => write!(f, "{}: FAILED - {}", self.operation.label(), self.detail),
        }
    }
}
