use ember_core::error::DomainError;
use ember_ports::error::{NotifyError, PortError, UseCaseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("port error: {0}")]
    Port(#[from] PortError),
    #[error("notify error: {0}")]
    Notify(#[from] NotifyError),
    #[error("{0} not found")]
    NotFound(String),
}

impl From<AppError> for UseCaseError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Domain(e) => UseCaseError::Rejected(e),
            AppError::Port(e) => UseCaseError::Port(e),
            AppError::Notify(e) => UseCaseError::Port(PortError::Connection(e.to_string())),
            AppError::NotFound(what) => UseCaseError::NotFound(what),
        }
    }
}
