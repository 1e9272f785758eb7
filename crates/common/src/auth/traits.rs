use crate::auth::{OperatorContext, OperatorRole};
use crate::domain::DomainResult;

/// Trait for operator access token operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait AuthTokenProvider: Send + Sync {
    /// Issue an access token for an operator
    fn generate_token(&self, operator_id: &str, role: OperatorRole) -> DomainResult<String>;

    /// Validate an access token and return the operator it was issued to
    fn validate_token(&self, token: &str) -> DomainResult<OperatorContext>;
}
