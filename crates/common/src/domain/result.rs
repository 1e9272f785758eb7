use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Device not eligible for commands: {0}")]
    DeviceNotEligible(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Command log not found: {0}")]
    CommandLogNotFound(String),

    #[error("Location not available: {0}")]
    LocationNotAvailable(String),

    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
