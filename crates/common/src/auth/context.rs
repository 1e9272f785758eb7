use crate::auth::AuthTokenProvider;
use crate::domain::{DomainError, DomainResult};
use http::header::AUTHORIZATION;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role carried in an operator access token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorRole {
    SuperAdmin,
    Admin,
    Operator,
}

impl OperatorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorRole::SuperAdmin => "super_admin",
            OperatorRole::Admin => "admin",
            OperatorRole::Operator => "operator",
        }
    }

    /// Roles allowed to act on accounts they do not manage
    pub fn has_global_access(&self) -> bool {
        matches!(self, OperatorRole::SuperAdmin | OperatorRole::Admin)
    }
}

impl fmt::Display for OperatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated operator making a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorContext {
    pub operator_id: String,
    pub role: OperatorRole,
}

/// Extract the operator from a `Bearer` authorization header
pub fn extract_operator_context(
    headers: &HeaderMap,
    auth_token_provider: &dyn AuthTokenProvider,
) -> DomainResult<OperatorContext> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| DomainError::InvalidToken("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| DomainError::InvalidToken("Invalid authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .ok_or_else(|| {
            DomainError::InvalidToken(
                "Invalid authorization format, expected 'Bearer <token>'".to_string(),
            )
        })?;

    auth_token_provider.validate_token(token)
}
