use async_trait::async_trait;
use tracing::debug;

use crate::auth::OperatorContext;
use crate::domain::{Account, DomainError, DomainResult};

/// Decides whether an operator may command or read an account
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait AuthorizationProvider: Send + Sync {
    /// Return PermissionDenied unless the operator may act on the account
    async fn require_account_access(
        &self,
        operator: &OperatorContext,
        account: &Account,
    ) -> DomainResult<()>;
}

/// Admins reach every account; other operators only the accounts they manage
#[derive(Debug, Default, Clone)]
pub struct AccountOwnershipAuthorizer;

impl AccountOwnershipAuthorizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuthorizationProvider for AccountOwnershipAuthorizer {
    async fn require_account_access(
        &self,
        operator: &OperatorContext,
        account: &Account,
    ) -> DomainResult<()> {
        if operator.role.has_global_access() || operator.operator_id == account.operator_id {
            return Ok(());
        }

        debug!(
            operator_id = %operator.operator_id,
            account_id = %account.account_id,
            "operator denied access to account"
        );
        Err(DomainError::PermissionDenied(format!(
            "operator {} may not act on account {}",
            operator.operator_id, account.account_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::OperatorRole;
    use crate::domain::AccountStatus;

    fn account() -> Account {
        Account {
            account_id: "acc-1".to_string(),
            operator_id: "op-owner".to_string(),
            name: "Customer".to_string(),
            serial_number: Some("SN1".to_string()),
            imei_1: None,
            imei_2: None,
            push_token: Some("fcm-token".to_string()),
            status: AccountStatus::Active,
            is_device_locked: false,
            is_camera_disabled: false,
            is_bluetooth_disabled: false,
            is_app_hidden: false,
            has_password: false,
            custom_wallpaper_url: None,
            last_command_sent_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn operator(id: &str, role: OperatorRole) -> OperatorContext {
        OperatorContext {
            operator_id: id.to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_managing_operator_allowed() {
        let authorizer = AccountOwnershipAuthorizer::new();
        let result = authorizer
            .require_account_access(&operator("op-owner", OperatorRole::Operator), &account())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_admins_allowed_on_any_account() {
        let authorizer = AccountOwnershipAuthorizer::new();
        for role in [OperatorRole::Admin, OperatorRole::SuperAdmin] {
            let result = authorizer
                .require_account_access(&operator("op-other", role), &account())
                .await;
            assert!(result.is_ok());
        }
    }

    #[tokio::test]
    async fn test_other_operator_denied() {
        let authorizer = AccountOwnershipAuthorizer::new();
        let result = authorizer
            .require_account_access(&operator("op-other", OperatorRole::Operator), &account())
            .await;
        assert!(matches!(result, Err(DomainError::PermissionDenied(_))));
    }
}
