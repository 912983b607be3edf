use ember_core::error::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("not found")]
    NotFound,
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("timed out: {0}")]
    Timeout(String),
}

impl PortError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
            || matches!(self, Self::Persistence(msg) if msg.contains("locked") || msg.contains("busy"))
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("publisher unavailable")]
    Unavailable,
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Error surfaced by inbound use cases.
#[derive(Debug, Error)]
pub enum UseCaseError {
    #[error("rejected: {0}")]
    Rejected(#[from] DomainError),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Port(#[from] PortError),
}
