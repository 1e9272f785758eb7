use crate::domain::account::UpdateAccountAfterDispatchInput;
use crate::domain::command::{JsonMap, REQUEST_LOCATION};
use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a command log.
///
/// `Pending` moves to `Sent` or `Failed` when the push outcome is known;
/// only `Sent` may later move to `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Sent,
    Failed,
    Delivered,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Sent => "sent",
            CommandStatus::Failed => "failed",
            CommandStatus::Delivered => "delivered",
        }
    }

    pub fn can_transition_to(&self, next: CommandStatus) -> bool {
        matches!(
            (self, next),
            (CommandStatus::Pending, CommandStatus::Sent)
                | (CommandStatus::Pending, CommandStatus::Failed)
                | (CommandStatus::Sent, CommandStatus::Delivered)
        )
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommandStatus::Pending),
            "sent" => Ok(CommandStatus::Sent),
            "failed" => Ok(CommandStatus::Failed),
            "delivered" => Ok(CommandStatus::Delivered),
            other => Err(DomainError::ValidationError(format!(
                "unknown command status: {}",
                other
            ))),
        }
    }
}

/// One dispatch attempt and its lifecycle
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLog {
    pub id: i64,
    pub account_id: String,
    /// Wire command name, e.g. `LOCK_DEVICE`
    pub command: String,
    pub params: JsonMap,
    pub status: CommandStatus,
    /// Raw push provider response
    pub response: Option<serde_json::Value>,
    /// Device acknowledgement data, set on delivery
    pub metadata: Option<JsonMap>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Operator who initiated the dispatch
    pub initiated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommandLog {
    /// True for a delivered `REQUEST_LOCATION` log carrying device data
    pub fn has_location_response(&self) -> bool {
        self.command == REQUEST_LOCATION
            && self.status == CommandStatus::Delivered
            && self.metadata.as_ref().is_some_and(|m| !m.is_empty())
    }
}

/// Outcome written over a `pending` log once the push send returns
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Sent {
        sent_at: DateTime<Utc>,
        response: Option<serde_json::Value>,
    },
    Failed {
        error_message: String,
        response: Option<serde_json::Value>,
    },
}

impl DispatchOutcome {
    pub fn status(&self) -> CommandStatus {
        match self {
            DispatchOutcome::Sent { .. } => CommandStatus::Sent,
            DispatchOutcome::Failed { .. } => CommandStatus::Failed,
        }
    }
}

/// Input for creating a `pending` command log
#[derive(Debug, Clone, PartialEq)]
pub struct CreateCommandLogInput {
    pub account_id: String,
    pub command: String,
    pub params: JsonMap,
    pub initiated_by: String,
}

/// Input for finalizing a `pending` command log
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDispatchOutcomeInput {
    pub log_id: i64,
    pub outcome: DispatchOutcome,
}

/// Input for resolving the newest `sent` log of an account and command
#[derive(Debug, Clone, PartialEq)]
pub struct DeliverCommandLogInput {
    pub account_id: String,
    pub command: String,
    pub metadata: JsonMap,
}

/// Input for listing command logs of an account, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCommandLogsInput {
    pub account_id: String,
    pub command: Option<String>,
    pub limit: i64,
}

/// Transactional scope of one dispatch attempt.
///
/// Nothing written through a unit of work is visible to other readers until
/// [`DispatchUnitOfWork::commit`]. Dropping it without committing discards
/// every write, including the log row.
#[async_trait]
pub trait DispatchUnitOfWork: Send {
    /// Insert a new log in `pending`
    async fn create_pending_log(&mut self, input: CreateCommandLogInput)
        -> DomainResult<CommandLog>;

    /// Move a `pending` log to `sent` or `failed`
    async fn record_outcome(&mut self, input: RecordDispatchOutcomeInput)
        -> DomainResult<CommandLog>;

    /// Stamp `last_command_sent_at` and apply any mirrored device state
    async fn update_account(&mut self, input: UpdateAccountAfterDispatchInput)
        -> DomainResult<()>;

    async fn commit(self: Box<Self>) -> DomainResult<()>;

    async fn rollback(self: Box<Self>) -> DomainResult<()>;
}

/// Repository trait for command log persistence
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommandLogRepository: Send + Sync {
    /// Open a transactional unit of work for one dispatch attempt
    async fn begin_dispatch(&self) -> DomainResult<Box<dyn DispatchUnitOfWork>>;

    /// Atomically move the newest `sent` log for the account and command to
    /// `delivered`, storing `metadata`. Returns `None` when no `sent` log exists.
    async fn deliver_latest_sent(
        &self,
        input: DeliverCommandLogInput,
    ) -> DomainResult<Option<CommandLog>>;

    /// Get a command log by id
    async fn get_command_log(&self, log_id: i64) -> DomainResult<Option<CommandLog>>;

    /// List command logs for an account, newest first
    async fn list_command_logs(&self, input: ListCommandLogsInput)
        -> DomainResult<Vec<CommandLog>>;

    /// Newest delivered log for the account and command with non-empty metadata
    async fn latest_delivered_with_metadata(
        &self,
        account_id: &str,
        command: &str,
    ) -> DomainResult<Option<CommandLog>>;
}
