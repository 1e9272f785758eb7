use chrono::{DateTime, Utc};
use common::auth::{AuthorizationProvider, OperatorContext};
use common::domain::{
    Account, AccountRepository, CommandLog, CommandLogRepository, CommandStatus,
    CreateCommandLogInput, DeviceCommand, DispatchOutcome, DispatchUnitOfWork, DomainError,
    DomainResult, JsonMap, PushOutcome, PushSender, RecordDispatchOutcomeInput,
    UpdateAccountAfterDispatchInput,
};
use garde::Validate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Service request for sending a command to a device
#[derive(Debug, Clone, Validate)]
pub struct DispatchCommandRequest {
    #[garde(skip)] // operator validated by auth layer
    pub operator: OperatorContext,
    #[garde(length(min = 1))]
    pub account_id: String,
    /// Action name (`lock`) or wire command name (`LOCK_DEVICE`)
    #[garde(length(min = 1))]
    pub command: String,
    #[garde(skip)]
    pub params: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchDetails {
    pub status: CommandStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// Outcome of a dispatch, returned to the operator.
///
/// A push transport failure still yields `Ok(DispatchResult)` with
/// `success == false` and a `failed` log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResult {
    pub success: bool,
    pub command: String,
    pub log_id: i64,
    pub message: String,
    pub details: DispatchDetails,
}

/// Sends commands to financed devices and records each attempt
pub struct CommandDispatchService {
    account_repository: Arc<dyn AccountRepository>,
    command_log_repository: Arc<dyn CommandLogRepository>,
    push_sender: Arc<dyn PushSender>,
    authorization_provider: Arc<dyn AuthorizationProvider>,
}

impl CommandDispatchService {
    pub fn new(
        account_repository: Arc<dyn AccountRepository>,
        command_log_repository: Arc<dyn CommandLogRepository>,
        push_sender: Arc<dyn PushSender>,
        authorization_provider: Arc<dyn AuthorizationProvider>,
    ) -> Self {
        Self {
            account_repository,
            command_log_repository,
            push_sender,
            authorization_provider,
        }
    }

    /// Validate, authorize and check eligibility, then run the dispatch unit
    /// of work. Nothing is written unless every precondition holds.
    #[instrument(skip(self, request), fields(operator_id = %request.operator.operator_id, account_id = %request.account_id, command = %request.command))]
    pub async fn dispatch(&self, request: DispatchCommandRequest) -> DomainResult<DispatchResult> {
        common::garde::validate_struct(&request)?;

        let command = DeviceCommand::parse(&request.command, &request.params)?;

        let account = self
            .account_repository
            .get_account(&request.account_id)
            .await?
            .ok_or_else(|| DomainError::AccountNotFound(request.account_id.clone()))?;

        self.authorization_provider
            .require_account_access(&request.operator, &account)
            .await?;

        let push_token = match account.registered_push_token() {
            Some(token) if account.is_eligible_for_commands() => token.to_string(),
            _ => {
                debug!(status = %account.status, "account not eligible for commands");
                return Err(DomainError::DeviceNotEligible(format!(
                    "account {} has no registered device or is not active",
                    account.account_id
                )));
            }
        };

        let mut unit_of_work = self.command_log_repository.begin_dispatch().await?;

        let result = self
            .run_dispatch(
                unit_of_work.as_mut(),
                &account,
                &command,
                &push_token,
                &request.operator.operator_id,
            )
            .await;

        match result {
            Ok(log_and_outcome) => {
                unit_of_work.commit().await?;
                let result = Self::build_result(&command, log_and_outcome);
                info!(
                    log_id = result.log_id,
                    status = %result.details.status,
                    "command dispatched"
                );
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_error) = unit_of_work.rollback().await {
                    warn!(error = %rollback_error, "failed to roll back dispatch");
                }
                Err(e)
            }
        }
    }

    async fn run_dispatch(
        &self,
        unit_of_work: &mut dyn DispatchUnitOfWork,
        account: &Account,
        command: &DeviceCommand,
        push_token: &str,
        operator_id: &str,
    ) -> DomainResult<(CommandLog, PushOutcome)> {
        let pending = unit_of_work
            .create_pending_log(CreateCommandLogInput {
                account_id: account.account_id.clone(),
                command: command.name().to_string(),
                params: command.log_params(),
                initiated_by: operator_id.to_string(),
            })
            .await?;

        debug!(log_id = pending.id, "sending push message");
        let outcome = self.push_sender.send(push_token, &command.payload()).await;
        let now = Utc::now();

        let dispatch_outcome = match &outcome {
            PushOutcome::Accepted { raw_response, .. } => DispatchOutcome::Sent {
                sent_at: now,
                response: raw_response.clone(),
            },
            PushOutcome::Failed {
                error,
                raw_response,
            } => {
                warn!(log_id = pending.id, error = %error, "push send failed");
                DispatchOutcome::Failed {
                    error_message: error.clone(),
                    response: raw_response.clone(),
                }
            }
        };

        let log = unit_of_work
            .record_outcome(RecordDispatchOutcomeInput {
                log_id: pending.id,
                outcome: dispatch_outcome,
            })
            .await?;

        // Mirrored device state only follows a send the provider accepted
        let state_change = if outcome.is_accepted() {
            command.state_change()
        } else {
            None
        };

        unit_of_work
            .update_account(UpdateAccountAfterDispatchInput {
                account_id: account.account_id.clone(),
                last_command_sent_at: now,
                state_change,
            })
            .await?;

        Ok((log, outcome))
    }

    fn build_result(command: &DeviceCommand, (log, outcome): (CommandLog, PushOutcome)) -> DispatchResult {
        let (success, message, message_id, error) = match outcome {
            PushOutcome::Accepted { message_id, .. } => (
                true,
                format!("{} command sent", command.label()),
                message_id,
                None,
            ),
            PushOutcome::Failed { error, .. } => (
                false,
                format!("{} command failed: {}", command.label(), error),
                None,
                Some(error),
            ),
        };

        DispatchResult {
            success,
            command: log.command,
            log_id: log.id,
            message,
            details: DispatchDetails {
                status: log.status,
                sent_at: log.sent_at,
                message_id,
                error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::{eligible_account, owner, stranger};
    use common::auth::{AccountOwnershipAuthorizer, MockAuthorizationProvider};
    use common::domain::{
        AccountStatus, CommandPayload, InMemoryCommandStore, MockAccountRepository,
        MockCommandLogRepository, MockPushSender,
    };
    use serde_json::json;

    fn accepted() -> PushOutcome {
        PushOutcome::Accepted {
            message_id: Some("projects/emi/messages/0:1".to_string()),
            raw_response: Some(json!({"name": "projects/emi/messages/0:1"})),
        }
    }

    fn service(store: &InMemoryCommandStore, push_sender: MockPushSender) -> CommandDispatchService {
        CommandDispatchService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(push_sender),
            Arc::new(AccountOwnershipAuthorizer::new()),
        )
    }

    fn request(account_id: &str, command: &str, params: JsonMap) -> DispatchCommandRequest {
        DispatchCommandRequest {
            operator: owner(),
            account_id: account_id.to_string(),
            command: command.to_string(),
            params,
        }
    }

    fn no_push() -> MockPushSender {
        let mut push = MockPushSender::new();
        push.expect_send().never();
        push
    }

    #[tokio::test]
    async fn test_lock_success_marks_sent_and_locks_account() {
        let store = InMemoryCommandStore::new();
        store.insert_account(eligible_account("acc-1")).await;

        let mut push = MockPushSender::new();
        push.expect_send()
            .withf(|token: &str, payload: &CommandPayload| {
                token == "fcm-token-1"
                    && payload.command == "LOCK_DEVICE"
                    && payload.data.get("state").map(String::as_str) == Some("true")
            })
            .times(1)
            .returning(|_, _| accepted());

        let result = service(&store, push)
            .dispatch(request("acc-1", "lock", JsonMap::new()))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.command, "LOCK_DEVICE");
        assert_eq!(result.details.status, CommandStatus::Sent);
        assert_eq!(
            result.details.message_id.as_deref(),
            Some("projects/emi/messages/0:1")
        );

        let logs = store.command_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, result.log_id);
        assert_eq!(logs[0].status, CommandStatus::Sent);
        assert!(logs[0].sent_at.is_some());
        assert_eq!(logs[0].initiated_by, "op-owner");
        assert!(logs[0].response.is_some());

        let account = store.account("acc-1").await.unwrap();
        assert!(account.is_device_locked);
        assert!(account.last_command_sent_at.is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_marks_failed_without_mirroring() {
        let store = InMemoryCommandStore::new();
        store.insert_account(eligible_account("acc-1")).await;

        let mut push = MockPushSender::new();
        push.expect_send()
            .times(1)
            .returning(|_, _| PushOutcome::failed("FCM send timed out", None));

        let result = service(&store, push)
            .dispatch(request("acc-1", "lock", JsonMap::new()))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.details.status, CommandStatus::Failed);
        assert_eq!(result.details.error.as_deref(), Some("FCM send timed out"));

        let logs = store.command_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, CommandStatus::Failed);
        assert_eq!(logs[0].error_message.as_deref(), Some("FCM send timed out"));
        assert!(logs[0].sent_at.is_none());

        let account = store.account("acc-1").await.unwrap();
        assert!(!account.is_device_locked);
        assert!(account.last_command_sent_at.is_some());
    }

    #[tokio::test]
    async fn test_ineligible_account_writes_no_log() {
        let store = InMemoryCommandStore::new();
        let mut suspended = eligible_account("acc-1");
        suspended.status = AccountStatus::Suspended;
        store.insert_account(suspended).await;

        let mut no_token = eligible_account("acc-2");
        no_token.push_token = Some("   ".to_string());
        store.insert_account(no_token).await;

        let service = service(&store, no_push());

        let mut params = JsonMap::new();
        params.insert("title".to_string(), json!("Payment due"));
        params.insert("message".to_string(), json!("Your installment is due tomorrow"));

        for account_id in ["acc-1", "acc-2"] {
            let result = service
                .dispatch(request(account_id, "show-message", params.clone()))
                .await;
            assert!(matches!(result, Err(DomainError::DeviceNotEligible(_))));
        }

        assert!(store.command_logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_writes_no_log() {
        let store = InMemoryCommandStore::new();
        store.insert_account(eligible_account("acc-1")).await;

        let result = service(&store, no_push())
            .dispatch(request("acc-1", "self-destruct", JsonMap::new()))
            .await;

        assert!(matches!(result, Err(DomainError::UnknownCommand(_))));
        assert!(store.command_logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_params_rejected_before_send() {
        let store = InMemoryCommandStore::new();
        store.insert_account(eligible_account("acc-1")).await;

        let result = service(&store, no_push())
            .dispatch(request("acc-1", "reset-password", JsonMap::new()))
            .await;

        assert!(matches!(result, Err(DomainError::ValidationError(_))));
        assert!(store.command_logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_reset_password_redacts_logged_params() {
        let store = InMemoryCommandStore::new();
        store.insert_account(eligible_account("acc-1")).await;

        let mut push = MockPushSender::new();
        push.expect_send()
            .withf(|_, payload: &CommandPayload| {
                payload.data.get("password").map(String::as_str) == Some("4821")
            })
            .times(1)
            .returning(|_, _| accepted());

        let mut params = JsonMap::new();
        params.insert("password".to_string(), json!("4821"));

        service(&store, push)
            .dispatch(request("acc-1", "reset-password", params))
            .await
            .unwrap();

        let logs = store.command_logs().await;
        assert_ne!(logs[0].params.get("password"), Some(&json!("4821")));
        assert!(store.account("acc-1").await.unwrap().has_password);
    }

    #[tokio::test]
    async fn test_set_wallpaper_mirrors_url() {
        let store = InMemoryCommandStore::new();
        store.insert_account(eligible_account("acc-1")).await;

        let mut push = MockPushSender::new();
        push.expect_send().times(1).returning(|_, _| accepted());

        let mut params = JsonMap::new();
        params.insert("image_url".to_string(), json!("https://cdn.example.com/overdue.png"));

        service(&store, push)
            .dispatch(request("acc-1", "set-wallpaper", params))
            .await
            .unwrap();

        let account = store.account("acc-1").await.unwrap();
        assert_eq!(
            account.custom_wallpaper_url.as_deref(),
            Some("https://cdn.example.com/overdue.png")
        );
    }

    #[tokio::test]
    async fn test_account_update_failure_rolls_back_log() {
        let store = InMemoryCommandStore::new();
        store.insert_account(eligible_account("acc-1")).await;
        store.fail_account_updates(true);

        let mut push = MockPushSender::new();
        push.expect_send().times(1).returning(|_, _| accepted());

        let result = service(&store, push)
            .dispatch(request("acc-1", "lock", JsonMap::new()))
            .await;

        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
        assert!(store.command_logs().await.is_empty());
        let account = store.account("acc-1").await.unwrap();
        assert!(!account.is_device_locked);
        assert!(account.last_command_sent_at.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_each_get_a_log() {
        let store = InMemoryCommandStore::new();
        store.insert_account(eligible_account("acc-1")).await;

        let mut push = MockPushSender::new();
        push.expect_send().times(2).returning(|_, _| accepted());
        let service = service(&store, push);

        let (first, second) = tokio::join!(
            service.dispatch(request("acc-1", "lock", JsonMap::new())),
            service.dispatch(request("acc-1", "unlock", JsonMap::new())),
        );

        assert_ne!(first.unwrap().log_id, second.unwrap().log_id);
        assert_eq!(store.command_logs().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let store = InMemoryCommandStore::new();

        let result = service(&store, no_push())
            .dispatch(request("missing", "lock", JsonMap::new()))
            .await;

        assert!(matches!(result, Err(DomainError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_operator_without_access_denied() {
        let store = InMemoryCommandStore::new();
        store.insert_account(eligible_account("acc-1")).await;

        let mut req = request("acc-1", "lock", JsonMap::new());
        req.operator = stranger();

        let result = service(&store, no_push()).dispatch(req).await;

        assert!(matches!(result, Err(DomainError::PermissionDenied(_))));
        assert!(store.command_logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_validation_rejects_empty_account_id() {
        let mut mock_account_repo = MockAccountRepository::new();
        mock_account_repo.expect_get_account().never();
        let mut mock_log_repo = MockCommandLogRepository::new();
        mock_log_repo.expect_begin_dispatch().never();

        let service = CommandDispatchService::new(
            Arc::new(mock_account_repo),
            Arc::new(mock_log_repo),
            Arc::new(no_push()),
            Arc::new(MockAuthorizationProvider::new()),
        );

        let result = service.dispatch(request("", "lock", JsonMap::new())).await;

        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_begin_dispatch_failure_propagates() {
        let mut mock_account_repo = MockAccountRepository::new();
        mock_account_repo
            .expect_get_account()
            .times(1)
            .returning(|id| Ok(Some(eligible_account(id))));

        let mut mock_log_repo = MockCommandLogRepository::new();
        mock_log_repo
            .expect_begin_dispatch()
            .times(1)
            .returning(|| Err(DomainError::RepositoryError(anyhow::anyhow!("pool exhausted"))));

        let mut mock_auth = MockAuthorizationProvider::new();
        mock_auth
            .expect_require_account_access()
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let service = CommandDispatchService::new(
            Arc::new(mock_account_repo),
            Arc::new(mock_log_repo),
            Arc::new(no_push()),
            Arc::new(mock_auth),
        );

        let result = service.dispatch(request("acc-1", "lock", JsonMap::new())).await;

        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
    }
}
