use chrono::{DateTime, Utc};
use common::auth::{AuthorizationProvider, OperatorContext};
use common::domain::{
    Account, AccountRepository, CommandLog, CommandLogRepository, DomainError, DomainResult,
    JsonMap, ListCommandLogsInput, REQUEST_LOCATION,
};
use garde::Validate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

#[derive(Debug, Clone, Validate)]
pub struct ListCommandLogsRequest {
    #[garde(skip)]
    pub operator: OperatorContext,
    #[garde(length(min = 1))]
    pub account_id: String,
    #[garde(length(min = 1))]
    pub command: Option<String>,
    #[garde(range(min = 1))]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Validate)]
pub struct GetCommandLogRequest {
    #[garde(skip)]
    pub operator: OperatorContext,
    #[garde(range(min = 1))]
    pub log_id: i64,
}

#[derive(Debug, Clone, Validate)]
pub struct LatestLocationRequest {
    #[garde(skip)]
    pub operator: OperatorContext,
    #[garde(length(min = 1))]
    pub account_id: String,
}

/// Last location reported by a device in answer to `REQUEST_LOCATION`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceLocation {
    pub account_id: String,
    pub command_log_id: i64,
    pub location: JsonMap,
    pub reported_at: DateTime<Utc>,
}

/// Read side of the command log for operators
pub struct CommandLogService {
    account_repository: Arc<dyn AccountRepository>,
    command_log_repository: Arc<dyn CommandLogRepository>,
    authorization_provider: Arc<dyn AuthorizationProvider>,
}

impl CommandLogService {
    pub fn new(
        account_repository: Arc<dyn AccountRepository>,
        command_log_repository: Arc<dyn CommandLogRepository>,
        authorization_provider: Arc<dyn AuthorizationProvider>,
    ) -> Self {
        Self {
            account_repository,
            command_log_repository,
            authorization_provider,
        }
    }

    async fn authorized_account(
        &self,
        operator: &OperatorContext,
        account_id: &str,
    ) -> DomainResult<Account> {
        let account = self
            .account_repository
            .get_account(account_id)
            .await?
            .ok_or_else(|| DomainError::AccountNotFound(account_id.to_string()))?;

        self.authorization_provider
            .require_account_access(operator, &account)
            .await?;

        Ok(account)
    }

    /// Newest first; `limit` defaults to 50 and is capped at 200
    #[instrument(skip(self, request), fields(operator_id = %request.operator.operator_id, account_id = %request.account_id))]
    pub async fn list_command_logs(
        &self,
        request: ListCommandLogsRequest,
    ) -> DomainResult<Vec<CommandLog>> {
        common::garde::validate_struct(&request)?;

        self.authorized_account(&request.operator, &request.account_id)
            .await?;

        let limit = request
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .min(MAX_LIST_LIMIT);

        debug!(limit, command = ?request.command, "listing command logs");

        self.command_log_repository
            .list_command_logs(ListCommandLogsInput {
                account_id: request.account_id,
                command: request.command,
                limit,
            })
            .await
    }

    #[instrument(skip(self, request), fields(operator_id = %request.operator.operator_id, log_id = request.log_id))]
    pub async fn get_command_log(&self, request: GetCommandLogRequest) -> DomainResult<CommandLog> {
        common::garde::validate_struct(&request)?;

        let log = self
            .command_log_repository
            .get_command_log(request.log_id)
            .await?
            .ok_or_else(|| DomainError::CommandLogNotFound(request.log_id.to_string()))?;

        self.authorized_account(&request.operator, &log.account_id)
            .await?;

        Ok(log)
    }

    /// Location data of the newest delivered `REQUEST_LOCATION` that carries one
    #[instrument(skip(self, request), fields(operator_id = %request.operator.operator_id, account_id = %request.account_id))]
    pub async fn latest_location(
        &self,
        request: LatestLocationRequest,
    ) -> DomainResult<DeviceLocation> {
        common::garde::validate_struct(&request)?;

        self.authorized_account(&request.operator, &request.account_id)
            .await?;

        let log = self
            .command_log_repository
            .latest_delivered_with_metadata(&request.account_id, REQUEST_LOCATION)
            .await?
            .filter(CommandLog::has_location_response)
            .ok_or_else(|| DomainError::LocationNotAvailable(request.account_id.clone()))?;

        Ok(DeviceLocation {
            account_id: log.account_id,
            command_log_id: log.id,
            location: log.metadata.unwrap_or_default(),
            reported_at: log.updated_at,
        })
    }
}
