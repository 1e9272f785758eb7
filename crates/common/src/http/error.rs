use crate::domain::DomainError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

/// JSON error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: &'static str,
    pub error: String,
}

/// Status code and stable error code for a domain error
pub fn domain_error_status(error: &DomainError) -> (StatusCode, &'static str) {
    match error {
        DomainError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "account_not_found"),
        DomainError::DeviceNotFound(_) => (StatusCode::NOT_FOUND, "device_not_found"),
        DomainError::CommandLogNotFound(_) => (StatusCode::NOT_FOUND, "command_log_not_found"),
        DomainError::LocationNotAvailable(_) => (StatusCode::NOT_FOUND, "location_not_available"),
        DomainError::DeviceNotEligible(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "device_not_eligible")
        }
        DomainError::UnknownCommand(_) => (StatusCode::BAD_REQUEST, "unknown_command"),
        DomainError::ValidationError(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        DomainError::InvalidToken(_) => (StatusCode::UNAUTHORIZED, "invalid_token"),
        DomainError::PermissionDenied(_) => (StatusCode::FORBIDDEN, "permission_denied"),
        DomainError::RepositoryError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

/// Response wrapper letting handlers return `Result<_, ApiError>` and use `?`
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = domain_error_status(&self.0);

        let message = match &self.0 {
            DomainError::RepositoryError(err) => {
                error!(error = %err, "request failed with internal error");
                "Internal error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorBody {
                success: false,
                code,
                error: message,
            }),
        )
            .into_response()
    }
}
