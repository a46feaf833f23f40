use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    /// Payload could not be decoded in either dialect. Carries the original payload text.
    #[error("Payload parse error: {reason}")]
    PayloadParse { payload: String, reason: String },

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),

    #[error("Audit sink error: {0}")]
    AuditSinkError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
