use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid id: {0}")]
    InvalidId(String),
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("invalid alert: {0}")]
    InvalidAlert(String),
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    #[error("invalid condition on field '{field}': {reason}")]
    InvalidCondition { field: String, reason: String },
    #[error("unknown operator: {0}")]
    UnknownOperator(String),
    #[error("unknown severity: {0}")]
    UnknownSeverity(String),
    #[error("unknown incident status: {0}")]
    UnknownStatus(String),
    #[error("invalid time of day: {0}")]
    InvalidTimeOfDay(String),
    #[error("invalid day of week: {0}")]
    InvalidDay(u8),
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    #[error("incident is already closed")]
    IncidentClosed,
}
